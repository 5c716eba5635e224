//! Progress event stream.
//!
//! The pipeline is the single producer; the presentation side (CLI progress
//! bars, or anything else) is the single consumer. Events travel over a
//! bounded channel: intermediate progress is sent with `try_send` and may
//! be dropped under backpressure, while terminal events (the final
//! `current == total` tick of a hashing stage, `Complete`, `Error`) are
//! always delivered.
//!
//! Counter events are emitted at most every [`MIN_EVENT_INTERVAL`] (about
//! 20 per second) and are guaranteed monotonic: a stale counter observed
//! after a newer one has been emitted is discarded.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;

/// Minimum spacing between non-terminal progress events.
pub const MIN_EVENT_INTERVAL: Duration = Duration::from_millis(50);

/// Capacity of the event channel before backpressure drops progress ticks.
const CHANNEL_CAPACITY: usize = 256;

/// A progress or lifecycle event emitted during a scan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ScanEvent {
    /// Traversal has indexed `count` files so far.
    Scanned { count: u64 },
    /// Stage-1 partial hashing progress.
    HashingPartial { current: usize, total: usize },
    /// Stage-2 full hashing progress.
    HashingFull { current: usize, total: usize },
    /// The run finished and results are available.
    Complete,
    /// The run aborted; no further events follow.
    Error { message: String },
}

/// Which hashing stage a counter event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStage {
    Partial,
    Full,
}

#[derive(Debug)]
struct ThrottleState {
    last_emit: Option<Instant>,
    last_scanned: u64,
    last_partial: usize,
    last_full: usize,
}

/// Producer half of the event stream.
///
/// Shared by reference across worker threads; all throttling state lives
/// behind an internal mutex so emitted counters stay monotonic.
pub struct EventSender {
    tx: Sender<ScanEvent>,
    state: Mutex<ThrottleState>,
}

/// Create a connected event stream.
#[must_use]
pub fn channel() -> (EventSender, Receiver<ScanEvent>) {
    let (tx, rx) = bounded(CHANNEL_CAPACITY);
    (EventSender::new(tx), rx)
}

impl EventSender {
    fn new(tx: Sender<ScanEvent>) -> Self {
        Self {
            tx,
            state: Mutex::new(ThrottleState {
                last_emit: None,
                last_scanned: 0,
                last_partial: 0,
                last_full: 0,
            }),
        }
    }

    /// Report the running count of files indexed by traversal.
    pub fn scanned(&self, count: u64) {
        let mut state = self.state.lock().unwrap();
        if count <= state.last_scanned && state.last_scanned != 0 {
            return;
        }
        if !Self::due(&state) {
            return;
        }
        if self.tx.try_send(ScanEvent::Scanned { count }).is_ok() {
            state.last_scanned = count;
            state.last_emit = Some(Instant::now());
        }
    }

    /// Report hashing progress for a stage.
    ///
    /// The `current == total` tick is never throttled and never dropped;
    /// everything else is best-effort.
    pub fn hashing(&self, stage: HashStage, current: usize, total: usize) {
        let mut state = self.state.lock().unwrap();
        let stale = match stage {
            HashStage::Partial => current <= state.last_partial,
            HashStage::Full => current <= state.last_full,
        };
        if stale {
            return;
        }

        let event = match stage {
            HashStage::Partial => ScanEvent::HashingPartial { current, total },
            HashStage::Full => ScanEvent::HashingFull { current, total },
        };

        if current == total {
            Self::mark(&mut state, stage, current);
            // Terminal tick for the stage: deliver even under backpressure
            drop(state);
            let _ = self.tx.send(event);
            return;
        }

        if !Self::due(&state) {
            return;
        }
        if self.tx.try_send(event).is_ok() {
            Self::mark(&mut state, stage, current);
        }
    }

    fn mark(state: &mut ThrottleState, stage: HashStage, current: usize) {
        match stage {
            HashStage::Partial => state.last_partial = current,
            HashStage::Full => state.last_full = current,
        }
        state.last_emit = Some(Instant::now());
    }

    /// Signal successful completion of the run.
    pub fn complete(&self) {
        let _ = self.tx.send(ScanEvent::Complete);
    }

    /// Signal a fatal abort. Callers must not emit anything afterwards.
    pub fn error(&self, message: impl Into<String>) {
        let _ = self.tx.send(ScanEvent::Error {
            message: message.into(),
        });
    }

    fn due(state: &ThrottleState) -> bool {
        state
            .last_emit
            .is_none_or(|at| at.elapsed() >= MIN_EVENT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_hashing_event_always_sent() {
        let (tx, rx) = channel();
        tx.hashing(HashStage::Partial, 5, 10);
        tx.hashing(HashStage::Partial, 10, 10);

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.contains(&ScanEvent::HashingPartial {
            current: 10,
            total: 10
        }));
    }

    #[test]
    fn test_throttle_drops_rapid_ticks() {
        let (tx, rx) = channel();
        for count in 1..=100 {
            tx.scanned(count);
        }
        // First tick lands, the rest arrive inside the 50ms window
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], ScanEvent::Scanned { count: 1 });
    }

    #[test]
    fn test_counters_monotonic() {
        let (tx, rx) = channel();
        tx.hashing(HashStage::Full, 3, 3);
        // Stale update after the terminal tick must be discarded
        tx.hashing(HashStage::Full, 2, 3);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![ScanEvent::HashingFull {
                current: 3,
                total: 3
            }]
        );
    }

    #[test]
    fn test_stages_throttle_independently_of_counters() {
        let (tx, rx) = channel();
        tx.hashing(HashStage::Partial, 7, 7);
        tx.hashing(HashStage::Full, 7, 7);
        tx.complete();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ScanEvent::HashingPartial {
                    current: 7,
                    total: 7
                },
                ScanEvent::HashingFull {
                    current: 7,
                    total: 7
                },
                ScanEvent::Complete,
            ]
        );
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(ScanEvent::Scanned { count: 42 }).unwrap();
        assert_eq!(json["stage"], "scanned");
        assert_eq!(json["count"], 42);

        let json = serde_json::to_value(ScanEvent::HashingFull {
            current: 1,
            total: 2,
        })
        .unwrap();
        assert_eq!(json["stage"], "hashing_full");

        let json = serde_json::to_value(ScanEvent::Complete).unwrap();
        assert_eq!(json["stage"], "complete");
    }

    #[test]
    fn test_send_without_receiver_does_not_panic() {
        let (tx, rx) = channel();
        drop(rx);
        tx.scanned(1);
        tx.complete();
        tx.error("boom");
    }
}
