use std::time::Duration;

use crate::error::Result;
use crate::queue::QueueProvider;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained,
    Cancelled,
}

/// Block until the device buffer is empty or the operator gives up.
///
/// `cancel_requested` is checked once per cycle, before sleeping;
/// `on_poll` sees the occupancy of every cycle that keeps waiting.
pub fn wait_for_drain<C, F>(
    provider: &dyn QueueProvider,
    interval: Duration,
    mut cancel_requested: C,
    mut on_poll: F,
) -> Result<DrainOutcome>
where
    C: FnMut() -> bool,
    F: FnMut(u64),
{
    loop {
        let bytes = provider.buffer_occupancy()?;
        if bytes == 0 {
            return Ok(DrainOutcome::Drained);
        }
        if cancel_requested() {
            tracing::debug!(bytes, "drain wait cancelled");
            return Ok(DrainOutcome::Cancelled);
        }
        on_poll(bytes);
        std::thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Capability;
    use crate::naming::NameConvention;
    use crate::queue_sim::SimulatedQueue;

    fn loaded_plotter() -> SimulatedQueue {
        let q = SimulatedQueue::new(Capability::CountedBuffer, NameConvention::default());
        q.push_fragment("A_1_t_1_030", 30).unwrap();
        q.drain(1).unwrap();
        q
    }

    #[test]
    fn returns_once_buffer_empties() {
        let q = loaded_plotter();
        let mut seen = Vec::new();
        let outcome = wait_for_drain(
            &q,
            Duration::from_millis(1),
            || {
                // the plotter makes progress between polls
                q.plot_bytes(10).unwrap();
                false
            },
            |b| seen.push(b),
        )
        .unwrap();
        assert_eq!(outcome, DrainOutcome::Drained);
        assert_eq!(seen, vec![30, 20, 10]);
    }

    #[test]
    fn key_press_cancels() {
        let q = loaded_plotter();
        let outcome = wait_for_drain(&q, Duration::from_millis(1), || true, |_| {}).unwrap();
        assert_eq!(outcome, DrainOutcome::Cancelled);
        assert_eq!(q.buffer_occupancy().unwrap(), 30);
    }

    #[test]
    fn empty_buffer_returns_immediately() {
        let q = SimulatedQueue::new(Capability::CountedBuffer, NameConvention::default());
        let outcome = wait_for_drain(&q, Duration::from_secs(60), || true, |_| {}).unwrap();
        assert_eq!(outcome, DrainOutcome::Drained);
    }
}
