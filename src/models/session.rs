use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three session kinds of the pomodoro cycle. The kind decides the
/// default duration and what the cycle sequencer advances to next.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    Work,
    ShortBreak,
    LongBreak,
}

impl Default for SessionKind {
    fn default() -> Self {
        SessionKind::Work
    }
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Work => "Work",
            SessionKind::ShortBreak => "ShortBreak",
            SessionKind::LongBreak => "LongBreak",
        }
    }

    pub fn is_work(&self) -> bool {
        matches!(self, SessionKind::Work)
    }
}

/// One attempted session in the persisted history. Created open when a
/// countdown starts; closed exactly once when the attempt ends, whether it
/// ran to zero (`was_completed`) or was abandoned by a reset/skip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub kind: SessionKind,
    pub task_id: Option<String>,
    pub planned_duration_secs: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub was_completed: bool,
}

impl SessionRecord {
    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }
}
