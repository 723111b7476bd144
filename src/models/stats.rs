use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Work-session aggregates for one calendar day (UTC). Minutes count the
/// planned duration of sessions that ran to completion, matching what the
/// stats views in the app report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: NaiveDate,
    pub total_sessions: u32,
    pub completed_sessions: u32,
    pub total_minutes: u64,
}

impl DailyStats {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_sessions: 0,
            completed_sessions: 0,
            total_minutes: 0,
        }
    }
}

/// A Sunday-to-Saturday week of work-session aggregates with the per-day
/// breakdown the productivity calendar renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStats {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_sessions: u32,
    pub completed_sessions: u32,
    pub total_minutes: u64,
    pub daily_breakdown: Vec<DailyStats>,
}
