use serde::{Deserialize, Serialize};

use crate::models::SessionKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

impl Default for TimerStatus {
    fn default() -> Self {
        TimerStatus::Idle
    }
}

/// Snapshot of the timer exposed to the UI collaborator. The controller is
/// the single writer; everyone else sees clones of this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub status: TimerStatus,
    pub kind: SessionKind,
    /// Seconds left on the current attempt, or the planned seconds while Idle.
    pub remaining_secs: u64,
    /// Planned seconds of the current attempt; the basis for `progress`.
    pub total_secs: u64,
    /// Work sessions counted toward the long-break cadence this cycle.
    pub completed_work_sessions: u32,
    /// Task the running/paused attempt is attributed to, if any.
    pub task_id: Option<String>,
    /// Persisted record backing the running/paused attempt. Attached
    /// asynchronously once the create call resolves; None while Idle or
    /// Completed, and possibly briefly None right after `start`.
    pub active_record_id: Option<String>,
}

impl TimerState {
    pub fn idle(kind: SessionKind, duration_secs: u64) -> Self {
        Self {
            status: TimerStatus::Idle,
            kind,
            remaining_secs: duration_secs,
            total_secs: duration_secs,
            completed_work_sessions: 0,
            task_id: None,
            active_record_id: None,
        }
    }

    /// Re-enter Idle for `kind`, keeping the cycle counter.
    pub fn enter_idle(&mut self, kind: SessionKind, duration_secs: u64) {
        self.status = TimerStatus::Idle;
        self.kind = kind;
        self.remaining_secs = duration_secs;
        self.total_secs = duration_secs;
        self.task_id = None;
        self.active_record_id = None;
    }

    /// Transition into Running for the current `remaining_secs`.
    pub fn begin_attempt(&mut self, task_id: Option<String>) {
        self.status = TimerStatus::Running;
        self.total_secs = self.remaining_secs;
        self.task_id = task_id;
        self.active_record_id = None;
    }

    pub fn mark_completed(&mut self) {
        self.status = TimerStatus::Completed;
        self.remaining_secs = 0;
        self.active_record_id = None;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TimerStatus::Running | TimerStatus::Paused)
    }

    /// `MM:SS` display string. Minutes are not capped at 59; a 100-minute
    /// countdown renders as `100:00` just like the original timer face.
    pub fn formatted_remaining(&self) -> String {
        format!(
            "{:02}:{:02}",
            self.remaining_secs / 60,
            self.remaining_secs % 60
        )
    }

    /// Fraction of the current attempt already elapsed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total_secs == 0 {
            return 0.0;
        }
        let done = 1.0 - self.remaining_secs as f64 / self.total_secs as f64;
        done.clamp(0.0, 1.0)
    }
}
