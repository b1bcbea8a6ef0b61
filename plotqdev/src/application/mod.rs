pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use plotq_core::error::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Name {
            raws,
            delimiter,
            field,
        } => handlers::handle_name(raws, delimiter, field),
        Commands::Settings { config } => handlers::handle_settings(config),
        Commands::Simulate {
            config,
            mode,
            batches,
            drain,
            steps,
            step_ms,
            detail,
            track,
            clear_at,
            wait,
        } => handlers::handle_simulate(handlers::SimulateArgs {
            config,
            mode,
            batches,
            drain,
            steps,
            step_ms,
            detail: detail.into(),
            track,
            clear_at,
            wait,
        }),
    }
}
