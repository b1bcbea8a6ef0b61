//! Shadow state for the device queue.
//!
//! The device never tells us which job belongs to which submission. The
//! [`Reconciler`] keeps its own list of named batches and re-derives it from a
//! fresh [`QueueSnapshot`] on every submission and query. How it re-derives
//! depends on the device's declared [`Capability`] and is delegated to one of
//! two [`ReconcileStrategy`] implementations picked at construction.

pub mod depletion;
pub mod rebuild;

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::domain::{Batch, BatchHandle, Capability, DetailLevel, Remainder};
use crate::error::Result;
use crate::queue::QueueProvider;
use crate::report::QueueReport;
use crate::stats::QueueSnapshot;

pub use depletion::CountedDepletion;
pub use rebuild::NamedRebuild;

/// Batch list plus the transient remainder marker of the current pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShadowState {
    pub batches: VecDeque<Batch>,
    pub remainder: Option<Remainder>,
}

/// Provider counters recorded by `submit`, oldest first. Each entry belongs to
/// one of the trailing batches of the list and is consumed by the next pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PendingSubmission {
    pub before_length: u64,
    pub before_size: u64,
}

pub trait ReconcileStrategy: Send {
    fn capability(&self) -> Capability;

    /// Bring `state` in line with `snapshot`. Never fails: inconsistent input
    /// is handled inside the pass and corrected by a later one.
    fn apply(&mut self, state: &mut ShadowState, pending: &[PendingSubmission], snapshot: &QueueSnapshot);

    /// Forget anything carried between passes.
    fn reset(&mut self) {}
}

pub fn strategy_for(config: &SessionConfig) -> Box<dyn ReconcileStrategy> {
    match config.capability {
        Capability::CountedBuffer => Box::new(CountedDepletion::new(config.naming)),
        Capability::NamedSpooler => Box::new(NamedRebuild::new(config.naming)),
    }
}

pub struct Reconciler {
    provider: Arc<dyn QueueProvider>,
    strategy: Box<dyn ReconcileStrategy>,
    state: ShadowState,
    pending: Vec<PendingSubmission>,
    emptied: bool,
    next_id: u64,
    preview_width: usize,
    plot_clock: watch::Sender<Instant>,
}

impl Reconciler {
    pub fn new(provider: Arc<dyn QueueProvider>, config: &SessionConfig) -> Self {
        let (plot_clock, _) = watch::channel(Instant::now());
        Self {
            provider,
            strategy: strategy_for(config),
            state: ShadowState::default(),
            pending: Vec::new(),
            emptied: false,
            next_id: 1,
            preview_width: config.preview_width,
            plot_clock,
        }
    }

    pub fn capability(&self) -> Capability {
        self.strategy.capability()
    }

    /// Start time of the latest submission, for the progress tracker.
    pub fn plot_clock(&self) -> watch::Receiver<Instant> {
        self.plot_clock.subscribe()
    }

    /// Record a new batch ahead of the generator's write.
    pub fn submit(&mut self, name: &str) -> Result<BatchHandle> {
        let snapshot = self.reconcile_snapshot()?;
        let handle = BatchHandle {
            id: self.next_id,
            name: name.to_string(),
            before_length: snapshot.length,
            before_size: snapshot.size,
        };
        self.next_id += 1;
        self.pending.push(PendingSubmission {
            before_length: handle.before_length,
            before_size: handle.before_size,
        });
        self.state.batches.push_back(Batch::new(name));
        self.emptied = false;
        self.plot_clock.send_replace(Instant::now());
        tracing::debug!(
            batch = name,
            before_length = handle.before_length,
            before_size = handle.before_size,
            "batch submitted"
        );
        Ok(handle)
    }

    /// Take back the latest submission when its write never reached the
    /// device. Only an unreconciled, still-empty tail batch can be withdrawn.
    pub fn withdraw(&mut self, handle: &BatchHandle) -> bool {
        let unwritten = self.pending.last().is_some_and(|p| {
            p.before_length == handle.before_length && p.before_size == handle.before_size
        }) && self
            .state
            .batches
            .back()
            .is_some_and(|b| b.name == handle.name && b.fragments.is_empty());
        if !unwritten {
            return false;
        }
        self.pending.pop();
        self.state.batches.pop_back();
        tracing::debug!(batch = %handle.name, id = handle.id, "submission withdrawn");
        true
    }

    pub fn reconcile(&mut self) -> Result<()> {
        self.reconcile_snapshot().map(|_| ())
    }

    fn reconcile_snapshot(&mut self) -> Result<QueueSnapshot> {
        let snapshot = QueueSnapshot::capture(self.provider.as_ref())?;
        self.strategy.apply(&mut self.state, &self.pending, &snapshot);
        self.pending.clear();
        tracing::debug!(
            length = snapshot.length,
            size = snapshot.size,
            batches = self.state.batches.len(),
            remainder = self.state.remainder.is_some(),
            "reconciled"
        );
        Ok(snapshot)
    }

    pub fn query(&mut self, level: DetailLevel) -> Result<QueueReport> {
        self.reconcile()?;
        if self.emptied || self.state.batches.is_empty() {
            return Ok(QueueReport::empty(level));
        }
        QueueReport::build(
            &self.state,
            level,
            self.provider.as_ref(),
            self.preview_width,
        )
    }

    /// Drop every locally held batch, e.g. after the device queue was cleared.
    pub fn clear(&mut self) {
        self.state = ShadowState::default();
        self.pending.clear();
        self.strategy.reset();
        self.emptied = true;
    }

    pub fn batches(&self) -> &VecDeque<Batch> {
        &self.state.batches
    }

    pub fn remainder(&self) -> Option<&Remainder> {
        self.state.remainder.as_ref()
    }

    pub fn duplicate_count(&self) -> usize {
        self.state.batches.iter().map(|b| b.duplicates.len()).sum()
    }
}
