use std::collections::VecDeque;

use crate::domain::{Batch, Capability, DeviceFragment};
use crate::naming::NameConvention;
use crate::reconcile::{PendingSubmission, ReconcileStrategy, ShadowState};
use crate::stats::QueueSnapshot;

/// Named-entry mode: throw the list away and regroup the spooler's entries by
/// canonical name on every pass, so drift never outlives one pass.
#[derive(Clone, Debug, Default)]
pub struct NamedRebuild {
    convention: NameConvention,
}

impl NamedRebuild {
    pub fn new(convention: NameConvention) -> Self {
        Self { convention }
    }
}

impl ReconcileStrategy for NamedRebuild {
    fn capability(&self) -> Capability {
        Capability::NamedSpooler
    }

    fn apply(&mut self, state: &mut ShadowState, _pending: &[PendingSubmission], snapshot: &QueueSnapshot) {
        state.batches = rebuild(&snapshot.fragments, &self.convention);
        state.remainder = None;
    }
}

/// Group contiguous fragments sharing a canonical name into batches.
pub fn rebuild(fragments: &[DeviceFragment], convention: &NameConvention) -> VecDeque<Batch> {
    let mut out: VecDeque<Batch> = VecDeque::new();
    for frag in fragments {
        let name = convention.canonical(&frag.raw_name);
        let start_new = out.back().is_none_or(|b| b.name != name);
        if start_new {
            out.push_back(Batch::new(name));
        }
        if let Some(batch) = out.back_mut() {
            if !batch.add_fragment(&frag.raw_name, frag.length) {
                tracing::warn!(entry = %frag.raw_name, length = frag.length, "duplicate document entry");
            }
        }
    }
    out
}
