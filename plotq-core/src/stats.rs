use crate::domain::DeviceFragment;
use crate::error::Result;
use crate::queue::QueueProvider;

/// One best-effort read of every provider counter.
///
/// The reads are separate calls, so `length` and `fragments.len()` (or `size`
/// and the fragment sum) may disagree briefly while the device drains.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub length: u64,
    pub size: u64,
    pub buffer_bytes: u64,
    pub fragments: Vec<DeviceFragment>,
}

impl QueueSnapshot {
    pub fn capture(provider: &dyn QueueProvider) -> Result<Self> {
        Ok(Self {
            fragments: provider.fragments()?,
            length: provider.queue_length()?,
            size: provider.queue_size()?,
            buffer_bytes: provider.buffer_occupancy()?,
        })
    }

    /// Snapshot whose counters are derived from the fragment list itself.
    pub fn from_fragments(fragments: Vec<DeviceFragment>) -> Self {
        Self {
            length: fragments.len() as u64,
            size: fragments.iter().map(|f| f.length).sum(),
            buffer_bytes: 0,
            fragments,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0 && self.fragments.is_empty()
    }
}

/// The pair the progress tracker compares between cycles.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProgressSample {
    pub queue_size: u64,
    pub buffer_bytes: u64,
}
