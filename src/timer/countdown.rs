//! Deadline-based countdown ticker.
//!
//! The engine never decrements a counter. Each run arms a deadline and a
//! once-per-second ticker recomputes the remaining time from that deadline,
//! so a delayed or missed tick still reports the truth. Events carry the
//! epoch of the run that produced them; consumers drop anything tagged with
//! an epoch they no longer recognize.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = false;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub epoch: u64,
    pub pulse: EnginePulse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePulse {
    Tick { remaining_secs: u64 },
    Completed,
}

struct EngineRun {
    cancel: CancellationToken,
    deadline: Instant,
    epoch: u64,
    _handle: JoinHandle<()>,
}

/// One countdown run at a time, reporting through an event channel.
///
/// The engine is mechanism only. Whether a start or stop is legal in the
/// current timer status is the caller's business; the engine just arms,
/// reads, and cancels deadlines.
pub struct CountdownEngine {
    events: mpsc::UnboundedSender<EngineEvent>,
    run: Option<EngineRun>,
}

impl CountdownEngine {
    pub fn new(events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { events, run: None }
    }

    /// Arms a deadline `secs` from now and starts the ticker for it. A run
    /// armed with zero seconds reports completion straight away.
    ///
    /// Any previous run is cancelled first. The caller's transition checks
    /// make that unreachable in normal operation, so it is logged.
    pub fn start(&mut self, secs: u64, epoch: u64) {
        if let Some(run) = self.run.take() {
            log_warn!("countdown start superseding active run (epoch {})", run.epoch);
            run.cancel.cancel();
        }

        let armed_at = Instant::now();
        let deadline = armed_at + Duration::from_secs(secs);
        let cancel = CancellationToken::new();
        let events = self.events.clone();

        let handle = tokio::spawn(run_ticker(armed_at, deadline, epoch, events, cancel.clone()));

        log_info!("countdown armed: {}s, epoch {}", secs, epoch);
        self.run = Some(EngineRun {
            cancel,
            deadline,
            epoch,
            _handle: handle,
        });
    }

    /// Cancels the current run and returns its remaining seconds, rounded up
    /// from the deadline. `None` when no run is armed.
    pub fn pause(&mut self) -> Option<u64> {
        let run = self.run.take()?;
        run.cancel.cancel();
        let remaining = remaining_at(run.deadline, Instant::now());
        log_info!("countdown paused with {}s remaining", remaining);
        Some(remaining)
    }

    /// Cancels the current run, if any. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.cancel.cancel();
            log_info!("countdown stopped (epoch {})", run.epoch);
        }
    }

    /// Re-emits the current remaining as an extra tick, for consumers that
    /// wake up mid-run and want a fresh reading without waiting a second.
    pub fn resync(&self) {
        if let Some(run) = &self.run {
            let remaining_secs = remaining_at(run.deadline, Instant::now());
            let _ = self.events.send(EngineEvent {
                epoch: run.epoch,
                pulse: EnginePulse::Tick { remaining_secs },
            });
        }
    }
}

async fn run_ticker(
    armed_at: Instant,
    deadline: Instant,
    epoch: u64,
    events: mpsc::UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
) {
    // A run armed with no time on it is already over; report it without
    // waiting for a tick.
    if armed_at >= deadline {
        let _ = events.send(EngineEvent {
            epoch,
            pulse: EnginePulse::Tick { remaining_secs: 0 },
        });
        let _ = events.send(EngineEvent {
            epoch,
            pulse: EnginePulse::Completed,
        });
        return;
    }

    let period = Duration::from_secs(1);
    let mut ticker = time::interval_at(armed_at + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let remaining_secs = remaining_at(deadline, Instant::now());
                let tick = EngineEvent {
                    epoch,
                    pulse: EnginePulse::Tick { remaining_secs },
                };
                if events.send(tick).is_err() {
                    break;
                }
                if remaining_secs == 0 {
                    let _ = events.send(EngineEvent {
                        epoch,
                        pulse: EnginePulse::Completed,
                    });
                    break;
                }
            }
            _ = cancel.cancelled() => {
                break;
            }
        }
    }
}

/// Whole seconds left until `deadline`, rounded up, clamped at zero.
fn remaining_at(deadline: Instant, now: Instant) -> u64 {
    let left = deadline.saturating_duration_since(now);
    let secs = left.as_secs();
    if left.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
