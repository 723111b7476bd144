//! Pomodoro timer core: a cycle-aware countdown with session history,
//! task tracking, and aggregate stats persisted to SQLite.

pub mod db;
pub mod models;
pub mod notify;
pub mod settings;
pub mod timer;
pub mod utils;

pub use db::Database;
pub use models::{DailyStats, SessionKind, SessionRecord, Task, WeeklyStats};
pub use notify::{LogNotifier, Notifier};
pub use settings::{SettingsProvider, SettingsStore, TimerSettings};
pub use timer::{
    SessionStore, TimerController, TimerError, TimerEvent, TimerState, TimerStatus,
};
