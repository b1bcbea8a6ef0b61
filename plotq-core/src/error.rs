use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt::Write as _;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlotqError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config decode: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Tracker error: {0}")]
    Tracker(String),
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, PlotqError>;

/// Render a failure as an operator diagnostic: the message, each `source()`
/// cause on its own line, then a captured backtrace when one is available.
pub fn diagnostic(context: &str, err: &(dyn StdError + 'static)) -> String {
    let mut out = format!("** Failure in {context}: {err}");
    let mut cause = err.source();
    while let Some(c) = cause {
        let _ = write!(out, "\n  caused by: {c}");
        cause = c.source();
    }
    let bt = Backtrace::capture();
    if let std::backtrace::BacktraceStatus::Captured = bt.status() {
        let _ = write!(out, "\n{bt}");
    }
    out
}

/// Log and print a diagnostic without propagating; interactive loops keep going.
pub fn report_failure(context: &str, err: &(dyn StdError + 'static)) {
    tracing::error!(context, error = %err, "operation failed");
    eprintln!("{}", diagnostic(context, err));
}
