use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use time::OffsetDateTime;
use time::macros::format_description;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::{Capability, DeviceFragment};
use crate::error::{PlotqError, Result};
use crate::naming::NameConvention;
use crate::queue::QueueProvider;

#[derive(Clone, Debug)]
struct SimEntry {
    raw_name: String,
    length: u64,
    payload: Option<String>,
}

#[derive(Debug)]
struct SimState {
    queue: VecDeque<SimEntry>,
    buffer_bytes: u64,
    open: bool,
    batch_seq: u64,
}

/// In-memory output device. Behaves as a counted-buffer plotter or a named
/// spooler depending on its capability; both list their entries.
#[derive(Debug)]
pub struct SimulatedQueue {
    capability: Capability,
    naming: NameConvention,
    state: Mutex<SimState>,
}

impl SimulatedQueue {
    pub fn new(capability: Capability, naming: NameConvention) -> Self {
        Self {
            capability,
            naming,
            state: Mutex::new(SimState {
                queue: VecDeque::new(),
                buffer_bytes: 0,
                open: true,
                batch_seq: 0,
            }),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|e| PlotqError::Device(format!("simulated queue poisoned: {e}")))
    }

    /// Queue one batch of device commands, one entry per payload, named
    /// after the fragment convention.
    pub fn write_batch(&self, name: &str, payloads: &[String]) -> Result<Vec<DeviceFragment>> {
        let stamp = OffsetDateTime::now_utc()
            .format(format_description!("[year][month][day]T[hour][minute][second]"))
            .map_err(|e| PlotqError::Device(format!("timestamp: {e}")))?;
        let d = self.naming.delimiter;

        let mut st = self.lock()?;
        if !st.open {
            return Err(PlotqError::Device("output port is closed".into()));
        }
        st.batch_seq += 1;
        let seq = st.batch_seq;
        let mut written = Vec::with_capacity(payloads.len());
        for (part, payload) in payloads.iter().enumerate() {
            let length = payload.len() as u64;
            let raw_name = format!("{name}{d}{seq:03}{d}{stamp}{d}{:03}{d}{length:05}", part + 1);
            written.push(DeviceFragment::new(raw_name.clone(), length));
            st.queue.push_back(SimEntry {
                raw_name,
                length,
                payload: Some(payload.clone()),
            });
        }
        Ok(written)
    }

    /// Queue an entry under an exact name, with no payload.
    pub fn push_fragment(&self, raw_name: &str, length: u64) -> Result<()> {
        let mut st = self.lock()?;
        st.queue.push_back(SimEntry {
            raw_name: raw_name.to_string(),
            length,
            payload: None,
        });
        Ok(())
    }

    /// Complete up to `n` entries from the front. A counted-buffer device
    /// moves their bytes into its plotter buffer.
    pub fn drain(&self, n: usize) -> Result<usize> {
        let mut st = self.lock()?;
        let take = n.min(st.queue.len());
        let moved: u64 = st.queue.drain(..take).map(|e| e.length).sum();
        if self.capability == Capability::CountedBuffer {
            st.buffer_bytes += moved;
        }
        Ok(take)
    }

    /// Let the plotter consume up to `n` buffered bytes.
    pub fn plot_bytes(&self, n: u64) -> Result<u64> {
        let mut st = self.lock()?;
        let used = n.min(st.buffer_bytes);
        st.buffer_bytes -= used;
        Ok(used)
    }

    pub fn clear(&self) -> Result<()> {
        let mut st = self.lock()?;
        st.queue.clear();
        st.buffer_bytes = 0;
        Ok(())
    }
}

impl QueueProvider for SimulatedQueue {
    fn queue_length(&self) -> Result<u64> {
        Ok(self.lock()?.queue.len() as u64)
    }

    fn queue_size(&self) -> Result<u64> {
        Ok(self.lock()?.queue.iter().map(|e| e.length).sum())
    }

    fn buffer_occupancy(&self) -> Result<u64> {
        Ok(self.lock()?.buffer_bytes)
    }

    fn fragments(&self) -> Result<Vec<DeviceFragment>> {
        let st = self.lock()?;
        Ok(st
            .queue
            .iter()
            .map(|e| DeviceFragment::new(e.raw_name.clone(), e.length))
            .collect())
    }

    fn payload(&self, raw_name: &str) -> Result<Option<String>> {
        let st = self.lock()?;
        Ok(st
            .queue
            .iter()
            .find(|e| e.raw_name == raw_name)
            .and_then(|e| e.payload.clone()))
    }

    fn is_open(&self) -> bool {
        self.lock().map(|st| st.open).unwrap_or(false)
    }

    fn close(&self) {
        if let Ok(mut st) = self.lock() {
            st.open = false;
        }
    }
}

/// Device-side progress: every `interval`, complete `entries_per_tick`
/// entries and plot `bytes_per_tick` buffered bytes, until `stop` flips or
/// its sender goes away.
pub fn spawn_drainer(
    queue: Arc<SimulatedQueue>,
    entries_per_tick: usize,
    bytes_per_tick: u64,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if *stop.borrow() {
                break;
            }
            if let Err(e) = queue
                .drain(entries_per_tick)
                .and_then(|_| queue.plot_bytes(bytes_per_tick))
            {
                tracing::warn!(error = %e, "simulated drain failed");
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Synthetic pen-plotter commands for demo batches; the geometry is not
/// meaningful, only the sizes and text are.
pub fn demo_payloads(count: usize, seed: u64) -> Vec<String> {
    (0..count as u64)
        .map(|i| {
            let x = (seed * 37 + i * 113) % 10_000;
            let y = (seed * 53 + i * 71) % 7_500;
            let pen = (seed + i) % 8 + 1;
            let mut cmd = format!("SP{pen};PU{x},{y};PD");
            for step in 0..=(i % 4) {
                cmd.push_str(&format!("{},{},", x + step * 40, y + step * 25));
            }
            cmd.pop();
            cmd.push(';');
            cmd
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_names_follow_the_convention() {
        let q = SimulatedQueue::new(Capability::NamedSpooler, NameConvention::default());
        let frags = q.write_batch("Star", &demo_payloads(3, 1)).unwrap();
        assert_eq!(frags.len(), 3);
        let conv = NameConvention::default();
        for f in &frags {
            assert_eq!(conv.canonical(&f.raw_name), "Star");
            assert_eq!(conv.length_suffix(&f.raw_name), Some(f.length));
        }
        assert_eq!(q.queue_length().unwrap(), 3);
        assert_eq!(q.queue_size().unwrap(), frags.iter().map(|f| f.length).sum::<u64>());
    }

    #[test]
    fn counted_buffer_drain_fills_the_buffer() {
        let q = SimulatedQueue::new(Capability::CountedBuffer, NameConvention::default());
        q.push_fragment("A_1_t_1_010", 10).unwrap();
        q.push_fragment("A_1_t_2_012", 12).unwrap();
        assert_eq!(q.drain(1).unwrap(), 1);
        assert_eq!(q.buffer_occupancy().unwrap(), 10);
        assert_eq!(q.queue_size().unwrap(), 12);
        assert_eq!(q.plot_bytes(4).unwrap(), 4);
        assert_eq!(q.buffer_occupancy().unwrap(), 6);
    }

    #[test]
    fn spooler_drain_has_no_buffer() {
        let q = SimulatedQueue::new(Capability::NamedSpooler, NameConvention::default());
        q.push_fragment("A_1_t_1_010", 10).unwrap();
        q.drain(5).unwrap();
        assert_eq!(q.buffer_occupancy().unwrap(), 0);
        assert_eq!(q.queue_length().unwrap(), 0);
    }

    #[test]
    fn closed_port_rejects_writes() {
        let q = SimulatedQueue::new(Capability::CountedBuffer, NameConvention::default());
        q.close();
        assert!(!q.is_open());
        assert!(matches!(
            q.write_batch("A", &demo_payloads(1, 0)),
            Err(PlotqError::Device(_))
        ));
    }

    #[test]
    fn payload_lookup_by_name() {
        let q = SimulatedQueue::new(Capability::NamedSpooler, NameConvention::default());
        let frags = q.write_batch("Sq", &["SP1;PU0,0;".to_string()]).unwrap();
        assert_eq!(q.payload(&frags[0].raw_name).unwrap().as_deref(), Some("SP1;PU0,0;"));
        assert_eq!(q.payload("missing").unwrap(), None);
    }
}
