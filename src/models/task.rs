use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A task that pomodoro work sessions can be attributed to.
/// `completed_pomodoros` is bumped by the session recorder whenever a work
/// session attached to this task runs to natural completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub estimated_pomodoros: Option<u32>,
    pub completed_pomodoros: u32,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
}
