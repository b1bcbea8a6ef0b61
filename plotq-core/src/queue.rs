// plotq_core/src/queue.rs
use std::sync::Arc;

use crate::domain::DeviceFragment;
use crate::error::Result;

/// Read side of an output device's backlog.
///
/// Each call is individually atomic; nothing is promised across calls, so a
/// caller combining several counters may see them momentarily disagree.
pub trait QueueProvider: Send + Sync {
    /// Number of entries still queued.
    fn queue_length(&self) -> Result<u64>;

    /// Total length of the queued entries.
    fn queue_size(&self) -> Result<u64>;

    /// Bytes sitting in the device's own buffer.
    fn buffer_occupancy(&self) -> Result<u64>;

    /// Queued entries in device order, oldest first.
    fn fragments(&self) -> Result<Vec<DeviceFragment>>;

    /// Device-command text behind one queued entry, if still known.
    fn payload(&self, raw_name: &str) -> Result<Option<String>>;

    fn is_open(&self) -> bool;

    fn close(&self);
}

/// Closes the device when dropped, on every exit path.
pub struct DeviceGuard {
    provider: Arc<dyn QueueProvider>,
}

impl DeviceGuard {
    pub fn new(provider: Arc<dyn QueueProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn QueueProvider> {
        &self.provider
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        if self.provider.is_open() {
            tracing::debug!("closing output device");
            self.provider.close();
        }
    }
}
