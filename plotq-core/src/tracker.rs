//! Background plot progress tracking.
//!
//! The tracker only reads device counters; it never sees the batch list, so
//! the interactive side stays the single writer of shadow state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::domain::Capability;
use crate::error::{PlotqError, Result};
use crate::queue::QueueProvider;
use crate::stats::ProgressSample;

#[derive(Clone, Debug)]
pub struct TrackerSettings {
    pub name: String,
    pub interval: Duration,
    pub capability: Capability,
}

impl TrackerSettings {
    pub fn new(capability: Capability, interval: Duration) -> Self {
        Self {
            name: "progress-tracker".to_string(),
            interval,
            capability,
        }
    }
}

/// Remembers the last sample; reports whether a new one differs.
#[derive(Clone, Debug, Default)]
pub struct ChangeDetector {
    last: Option<ProgressSample>,
}

impl ChangeDetector {
    pub fn observe(&mut self, sample: ProgressSample) -> bool {
        let changed = self.last != Some(sample);
        self.last = Some(sample);
        changed
    }
}

pub fn format_status(elapsed: Duration, queue_length: u64, sample: ProgressSample, show_buffer: bool) -> String {
    let secs = elapsed.as_secs();
    let mut line = format!(
        "  Plot tracking: {:02}:{:02}  [{:>3}]  [{:>5}]",
        secs / 60,
        secs % 60,
        queue_length,
        sample.queue_size
    );
    if show_buffer {
        line.push_str(&format!("  bytes in plotter buffer: [{:>4}]", sample.buffer_bytes));
    }
    line
}

pub struct ProgressTracker {
    enabled: Arc<AtomicBool>,
    stop: watch::Sender<bool>,
    handle: JoinHandle<String>,
}

impl ProgressTracker {
    /// Spawn the polling task on the current tokio runtime. Status lines go to
    /// `lines`; the task also ends if that receiver is dropped.
    pub fn spawn(
        provider: Arc<dyn QueueProvider>,
        settings: TrackerSettings,
        plot_clock: watch::Receiver<Instant>,
        enabled: bool,
        lines: mpsc::UnboundedSender<String>,
    ) -> Self {
        let enabled = Arc::new(AtomicBool::new(enabled));
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(
            provider,
            settings,
            plot_clock,
            enabled.clone(),
            stop_rx,
            lines,
        ));
        Self {
            enabled,
            stop,
            handle,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Relaxed);
    }

    /// Flip tracking and return the new state.
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::Relaxed)
    }

    /// Ask the task to stop without waiting for it.
    pub fn signal_stop(&self) {
        self.stop.send_replace(true);
    }

    /// Stop the task and wait for its completion token.
    pub async fn shutdown(self) -> Result<String> {
        self.signal_stop();
        self.handle
            .await
            .map_err(|e| PlotqError::Tracker(format!("tracker task failed: {e}")))
    }
}

async fn run(
    provider: Arc<dyn QueueProvider>,
    settings: TrackerSettings,
    plot_clock: watch::Receiver<Instant>,
    enabled: Arc<AtomicBool>,
    mut stop: watch::Receiver<bool>,
    lines: mpsc::UnboundedSender<String>,
) -> String {
    let mut detector = ChangeDetector::default();
    loop {
        if *stop.borrow() {
            break;
        }
        if enabled.load(Ordering::Relaxed) {
            let started = *plot_clock.borrow();
            match poll_once(provider.as_ref(), &settings, &mut detector, started.elapsed()) {
                Ok(Some(line)) => {
                    if lines.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "progress sample failed"),
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(settings.interval) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    format!("Closing {}", settings.name)
}

fn poll_once(
    provider: &dyn QueueProvider,
    settings: &TrackerSettings,
    detector: &mut ChangeDetector,
    elapsed: Duration,
) -> Result<Option<String>> {
    let active = match settings.capability {
        Capability::CountedBuffer => provider.is_open(),
        Capability::NamedSpooler => provider.queue_length()? > 0,
    };
    if !active {
        return Ok(None);
    }
    let sample = ProgressSample {
        queue_size: provider.queue_size()?,
        buffer_bytes: provider.buffer_occupancy()?,
    };
    if !detector.observe(sample) {
        return Ok(None);
    }
    let show_buffer = settings.capability == Capability::CountedBuffer;
    Ok(Some(format_status(
        elapsed,
        provider.queue_length()?,
        sample,
        show_buffer,
    )))
}
