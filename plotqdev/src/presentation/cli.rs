use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use plotq_core::{Capability, DetailLevel};

#[derive(Parser)]
#[command(author, version, about = "plotqdev CLI (alpha)", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Plotter behind a counted serial buffer
    Counted,
    /// Spooler listing individually named jobs
    Spooler,
}

impl From<Mode> for Capability {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Counted => Capability::CountedBuffer,
            Mode::Spooler => Capability::NamedSpooler,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Detail {
    #[default]
    None,
    Detail,
    Payload,
}

impl From<Detail> for DetailLevel {
    fn from(d: Detail) -> Self {
        match d {
            Detail::None => DetailLevel::None,
            Detail::Detail => DetailLevel::Detail,
            Detail::Payload => DetailLevel::DetailWithPayload,
        }
    }
}

/// `NAME=COUNT`: submit a batch called NAME with COUNT generated commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchSpec {
    pub name: String,
    pub count: usize,
}

pub fn parse_batch_spec(s: &str) -> Result<BatchSpec, String> {
    let (name, count) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=COUNT, got {s:?}"))?;
    if name.is_empty() {
        return Err("batch name is empty".into());
    }
    let count = count
        .parse::<usize>()
        .map_err(|e| format!("bad count in {s:?}: {e}"))?;
    if count == 0 {
        return Err(format!("batch {name:?} needs at least one command"));
    }
    Ok(BatchSpec {
        name: name.to_string(),
        count,
    })
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the canonical batch name of raw device entry names
    Name {
        #[arg(required = true)]
        raws: Vec<String>,
        /// Reserved name delimiter
        #[arg(long)]
        delimiter: Option<char>,
        /// Zero-based field holding the canonical name
        #[arg(long)]
        field: Option<usize>,
    },

    /// Print the effective session settings as JSON
    Settings {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run a scripted session against a simulated device
    Simulate {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Device personality (overrides the config file)
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Batch to submit, in order; repeatable
        #[arg(long = "batch", value_parser = parse_batch_spec, default_value = "Tri=3")]
        batches: Vec<BatchSpec>,

        /// Entries the device completes per step
        #[arg(long, default_value_t = 1)]
        drain: usize,

        /// Drain steps after all submissions
        #[arg(long, default_value_t = 3)]
        steps: usize,

        /// Pause between drain steps, in milliseconds
        #[arg(long = "step-ms", default_value_t = 0)]
        step_ms: u64,

        #[arg(long, value_enum, default_value_t = Detail::None)]
        detail: Detail,

        /// Print plot progress lines while the session runs
        #[arg(long)]
        track: bool,

        /// Clear the device and local batches after this drain step
        #[arg(long = "clear-at")]
        clear_at: Option<usize>,

        /// Finish by waiting for the plotter buffer to empty (Esc cancels)
        #[arg(long)]
        wait: bool,
    },
}
