use thiserror::Error;

use super::state::TimerStatus;

/// Errors surfaced by the timer facade and the cycle sequencer.
///
/// Persistence and notification failures never appear here; those are logged
/// and swallowed so the countdown keeps its own pace (see the recorder).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("cannot {op} while {status:?}")]
    InvalidTransition {
        op: &'static str,
        status: TimerStatus,
    },
    #[error("invalid timer config: {0}")]
    InvalidConfig(String),
    #[error("timer controller has shut down")]
    Closed,
}
