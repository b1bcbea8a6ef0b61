use std::collections::VecDeque;

use thiserror::Error;

use crate::domain::{Batch, Capability, Remainder};
use crate::naming::NameConvention;
use crate::reconcile::rebuild::rebuild;
use crate::reconcile::{PendingSubmission, ReconcileStrategy, ShadowState};
use crate::stats::QueueSnapshot;

/// Count-only mode: the device reports how much is left, not what. Work drains
/// from the front, so walking the list newest-first and subtracting each
/// batch's share from the device totals shows which old batches are gone and
/// how much of the oldest survivor is left.
#[derive(Clone, Debug, Default)]
pub struct CountedDepletion {
    convention: NameConvention,
    // The device has started on the current head batch.
    head_draining: bool,
}

/// Arithmetic that cannot come from front-only drainage of the tracked list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepletionFault {
    #[error("size of batch {0:?} exceeds the remaining device size")]
    NegativeSize(String),

    #[error("remaining size {remaining} exceeds batch {batch:?} size {declared}")]
    OversizedRemainder {
        batch: String,
        remaining: u64,
        declared: u64,
    },
}

/// Outcome of one walk: how many batches to drop from the front, and the
/// partially drained survivor, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Depletion {
    pub evict: usize,
    pub partial: Option<Remainder>,
    /// Device entries not claimed by any tracked batch.
    pub unclaimed: u64,
}

impl CountedDepletion {
    pub fn new(convention: NameConvention) -> Self {
        Self {
            convention,
            head_draining: false,
        }
    }
}

impl ReconcileStrategy for CountedDepletion {
    fn capability(&self) -> Capability {
        Capability::CountedBuffer
    }

    fn apply(&mut self, state: &mut ShadowState, pending: &[PendingSubmission], snapshot: &QueueSnapshot) {
        populate(&mut state.batches, pending, snapshot);

        let depletion = match walk(&state.batches, snapshot) {
            Ok(d) => d,
            Err(fault) => {
                tracing::warn!(%fault, "count arithmetic inconsistent; rebuilding from device entries");
                state.batches = rebuild(&snapshot.fragments, &self.convention);
                state.remainder = None;
                self.head_draining = false;
                return;
            }
        };

        for gone in state.batches.drain(..depletion.evict) {
            tracing::debug!(batch = %gone.name, "batch drained");
        }
        if depletion.unclaimed > 0 {
            tracing::debug!(unclaimed = depletion.unclaimed, "device holds untracked entries");
        }

        if depletion.evict > 0 || depletion.partial.is_some() {
            self.head_draining = true;
        }
        if state.batches.is_empty() {
            self.head_draining = false;
        }

        state.remainder = match depletion.partial {
            Some(r) => Some(r),
            None if self.head_draining => state.batches.front().map(|head| Remainder {
                batch_name: head.name.clone(),
                remaining_count: head.fragment_count(),
                remaining_size: head.declared_size,
            }),
            None => None,
        };
    }

    fn reset(&mut self) {
        self.head_draining = false;
    }
}

/// Fill freshly submitted batches from the growth the device shows since
/// their before-counters. The newest entries sit at the tail of the listing.
pub fn populate(batches: &mut VecDeque<Batch>, pending: &[PendingSubmission], snapshot: &QueueSnapshot) {
    let Some(first) = pending.first() else {
        return;
    };
    let Some(base) = batches.len().checked_sub(pending.len()) else {
        tracing::warn!(pending = pending.len(), batches = batches.len(), "pending submissions without batches");
        return;
    };

    let grown = snapshot.length.saturating_sub(first.before_length) as usize;
    let listed = &snapshot.fragments;
    let use_listing = listed.len() >= grown;
    if !use_listing {
        tracing::warn!(grown, listed = listed.len(), "device listing shorter than growth; using placeholders");
    }
    let mut cursor = listed.len().saturating_sub(grown);

    for (i, p) in pending.iter().enumerate() {
        let (end_length, end_size) = pending
            .get(i + 1)
            .map(|next| (next.before_length, next.before_size))
            .unwrap_or((snapshot.length, snapshot.size));
        let k = end_length.saturating_sub(p.before_length);
        let m = end_size.saturating_sub(p.before_size);

        let batch = &mut batches[base + i];
        let mut placeholders = false;
        for n in 0..k {
            match listed.get(cursor).filter(|_| use_listing) {
                Some(frag) => {
                    batch.add_fragment(&frag.raw_name, frag.length);
                }
                None => {
                    let key = format!("{}#{:03}", batch.name, n);
                    batch.fragments.insert(key, 0);
                    placeholders = true;
                }
            }
            cursor += 1;
        }
        // Placeholder lengths are unknown; fall back to the asserted total.
        if placeholders {
            batch.declared_size = m;
        }
    }
}

/// Newest-first depletion walk over the device totals.
///
/// The walk stops at the first partially drained batch and evicts everything
/// older, so a single pass yields at most one remainder.
pub fn walk(batches: &VecDeque<Batch>, snapshot: &QueueSnapshot) -> Result<Depletion, DepletionFault> {
    let mut remaining_length = snapshot.length;
    let mut remaining_size = snapshot.size;

    for (idx, batch) in batches.iter().enumerate().rev() {
        if remaining_length == 0 {
            return Ok(Depletion {
                evict: idx + 1,
                partial: None,
                unclaimed: 0,
            });
        }

        let count = batch.fragment_count();
        if remaining_length >= count {
            remaining_length -= count;
            remaining_size = remaining_size
                .checked_sub(batch.declared_size)
                .ok_or_else(|| DepletionFault::NegativeSize(batch.name.clone()))?;
            continue;
        }

        if remaining_size > batch.declared_size {
            return Err(DepletionFault::OversizedRemainder {
                batch: batch.name.clone(),
                remaining: remaining_size,
                declared: batch.declared_size,
            });
        }
        return Ok(Depletion {
            evict: idx,
            partial: Some(Remainder {
                batch_name: batch.name.clone(),
                remaining_count: remaining_length,
                remaining_size,
            }),
            unclaimed: 0,
        });
    }

    Ok(Depletion {
        evict: 0,
        partial: None,
        unclaimed: remaining_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(name: &str, count: u64, size_each: u64) -> Batch {
        let mut b = Batch::new(name);
        for i in 0..count {
            b.add_fragment(&format!("{name}_1_t_{i:03}_{size_each:05}"), size_each);
        }
        b
    }

    fn totals(length: u64, size: u64) -> QueueSnapshot {
        QueueSnapshot {
            length,
            size,
            ..Default::default()
        }
    }

    #[test]
    fn drained_front_batch_is_evicted() {
        let list: VecDeque<_> = [batch("A", 3, 10), batch("B", 2, 10)].into();
        let d = walk(&list, &totals(2, 20)).unwrap();
        assert_eq!(d.evict, 1);
        assert_eq!(d.partial, None);
    }

    #[test]
    fn partial_batch_yields_remainder() {
        let list: VecDeque<_> = [batch("A", 3, 10), batch("B", 2, 10)].into();
        let d = walk(&list, &totals(3, 30)).unwrap();
        assert_eq!(d.evict, 0);
        assert_eq!(
            d.partial,
            Some(Remainder {
                batch_name: "A".into(),
                remaining_count: 1,
                remaining_size: 10,
            })
        );
    }

    #[test]
    fn partial_in_middle_evicts_everything_older() {
        let list: VecDeque<_> = [batch("A", 2, 5), batch("B", 4, 5), batch("C", 1, 5)].into();
        let d = walk(&list, &totals(3, 15)).unwrap();
        assert_eq!(d.evict, 1);
        assert_eq!(d.partial.unwrap().batch_name, "B");
    }

    #[test]
    fn empty_device_evicts_all() {
        let list: VecDeque<_> = [batch("A", 2, 5), batch("B", 1, 5)].into();
        let d = walk(&list, &totals(0, 0)).unwrap();
        assert_eq!(d.evict, 2);
    }

    #[test]
    fn untracked_entries_are_reported() {
        let list: VecDeque<_> = [batch("A", 2, 5)].into();
        let d = walk(&list, &totals(5, 25)).unwrap();
        assert_eq!(d.evict, 0);
        assert_eq!(d.unclaimed, 3);
    }

    #[test]
    fn size_underflow_is_a_fault() {
        let list: VecDeque<_> = [batch("A", 2, 50)].into();
        let err = walk(&list, &totals(2, 10)).unwrap_err();
        assert_eq!(err, DepletionFault::NegativeSize("A".into()));
    }

    #[test]
    fn oversized_remainder_is_a_fault() {
        let list: VecDeque<_> = [batch("A", 3, 1)].into();
        let err = walk(&list, &totals(1, 100)).unwrap_err();
        assert!(matches!(err, DepletionFault::OversizedRemainder { .. }));
    }

    #[test]
    fn populate_splits_growth_between_pending_batches() {
        let mut list: VecDeque<_> = [Batch::new("A"), Batch::new("B")].into();
        let pending = [
            PendingSubmission {
                before_length: 0,
                before_size: 0,
            },
            PendingSubmission {
                before_length: 2,
                before_size: 7,
            },
        ];
        let snap = QueueSnapshot::from_fragments(vec![
            crate::domain::DeviceFragment::new("A_1_t_1_003", 3),
            crate::domain::DeviceFragment::new("A_1_t_2_004", 4),
            crate::domain::DeviceFragment::new("B_2_t_1_006", 6),
        ]);
        populate(&mut list, &pending, &snap);
        assert_eq!(list[0].fragment_count(), 2);
        assert_eq!(list[0].declared_size, 7);
        assert_eq!(list[1].fragment_count(), 1);
        assert_eq!(list[1].declared_size, 6);
        assert!(list[1].fragments.contains_key("B_2_t_1_006"));
    }

    #[test]
    fn populate_without_listing_uses_placeholders() {
        let mut list: VecDeque<_> = [Batch::new("Sq")].into();
        let pending = [PendingSubmission {
            before_length: 0,
            before_size: 0,
        }];
        populate(&mut list, &pending, &totals(3, 40));
        assert_eq!(list[0].fragment_count(), 3);
        assert_eq!(list[0].declared_size, 40);
        assert!(list[0].fragments.contains_key("Sq#000"));
    }

    #[test]
    fn populate_counts_a_listed_duplicate_once() {
        let mut list: VecDeque<_> = [Batch::new("A")].into();
        let pending = [PendingSubmission {
            before_length: 0,
            before_size: 0,
        }];
        let snap = QueueSnapshot::from_fragments(vec![
            crate::domain::DeviceFragment::new("A_1_t_1_010", 10),
            crate::domain::DeviceFragment::new("A_1_t_1_010", 10),
            crate::domain::DeviceFragment::new("A_1_t_2_012", 12),
        ]);
        populate(&mut list, &pending, &snap);
        assert_eq!(list[0].fragment_count(), 2);
        assert_eq!(list[0].declared_size, 22);
        assert_eq!(list[0].duplicates, vec!["A_1_t_1_010".to_string()]);
    }
}
