#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod drain;
pub mod error;
pub mod naming;
pub mod queue;
pub mod queue_sim;
pub mod reconcile;
pub mod report;
pub mod stats;
pub mod tracker;

// Re-exports: stable API surface
pub use config::SessionConfig;
pub use domain::{Batch, BatchHandle, Capability, DetailLevel, DeviceFragment, Remainder};
pub use drain::{DrainOutcome, wait_for_drain};
pub use queue::{DeviceGuard, QueueProvider};
pub use reconcile::Reconciler;
pub use report::QueueReport;
pub use tracker::{ProgressTracker, TrackerSettings};
