use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

pub const DEFAULT_WORK_SECS: u64 = 25 * 60;
pub const DEFAULT_SHORT_BREAK_SECS: u64 = 5 * 60;
pub const DEFAULT_LONG_BREAK_SECS: u64 = 15 * 60;
pub const DEFAULT_SESSIONS_BEFORE_LONG_BREAK: u32 = 4;

/// Ceiling for configured session durations (24 hours). A hand-edited
/// settings file must not be able to arm a deadline outside the clock's
/// representable range.
pub const MAX_DURATION_SECS: u64 = 24 * 60 * 60;

/// Durations (seconds) and the long-break threshold for the pomodoro cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    pub work_secs: u64,
    pub short_break_secs: u64,
    pub long_break_secs: u64,
    pub sessions_before_long_break: u32,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            work_secs: DEFAULT_WORK_SECS,
            short_break_secs: DEFAULT_SHORT_BREAK_SECS,
            long_break_secs: DEFAULT_LONG_BREAK_SECS,
            sessions_before_long_break: DEFAULT_SESSIONS_BEFORE_LONG_BREAK,
        }
    }
}

impl TimerSettings {
    /// Replaces zero durations with the defaults and caps runaway ones at
    /// [`MAX_DURATION_SECS`], logging each substitution.
    ///
    /// The long-break threshold is passed through untouched: an out-of-range
    /// value there must surface as a config error when the sequencer runs,
    /// not disappear here.
    pub fn sanitized(mut self) -> Self {
        self.work_secs = sanitize_duration("workSecs", self.work_secs, DEFAULT_WORK_SECS);
        self.short_break_secs = sanitize_duration(
            "shortBreakSecs",
            self.short_break_secs,
            DEFAULT_SHORT_BREAK_SECS,
        );
        self.long_break_secs = sanitize_duration(
            "longBreakSecs",
            self.long_break_secs,
            DEFAULT_LONG_BREAK_SECS,
        );
        self
    }
}

fn sanitize_duration(field: &str, value: u64, default: u64) -> u64 {
    if value == 0 {
        warn!("{field} is 0, falling back to {default}");
        return default;
    }
    if value > MAX_DURATION_SECS {
        warn!("{field} is {value}, capping at {MAX_DURATION_SECS}");
        return MAX_DURATION_SECS;
    }
    value
}

/// Source of the timer settings snapshot taken when a session is armed.
pub trait SettingsProvider: Send + Sync {
    fn timer_settings(&self) -> TimerSettings;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    timer: TimerSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn timer(&self) -> TimerSettings {
        self.data.read().unwrap().timer.sanitized()
    }

    pub fn update_timer(&self, settings: TimerSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            guard.timer = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

impl SettingsStore {
    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        let mut guard = self.data.write().unwrap();
        *guard = data;
        Ok(())
    }
}

impl SettingsProvider for SettingsStore {
    fn timer_settings(&self) -> TimerSettings {
        self.timer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_the_classic_cycle() {
        let settings = TimerSettings::default();
        assert_eq!(settings.work_secs, 1500);
        assert_eq!(settings.short_break_secs, 300);
        assert_eq!(settings.long_break_secs, 900);
        assert_eq!(settings.sessions_before_long_break, 4);
    }

    #[test]
    fn sanitize_fills_zero_durations_but_keeps_threshold() {
        let settings = TimerSettings {
            work_secs: 0,
            short_break_secs: 0,
            long_break_secs: 0,
            sessions_before_long_break: 0,
        }
        .sanitized();

        assert_eq!(settings.work_secs, DEFAULT_WORK_SECS);
        assert_eq!(settings.short_break_secs, DEFAULT_SHORT_BREAK_SECS);
        assert_eq!(settings.long_break_secs, DEFAULT_LONG_BREAK_SECS);
        assert_eq!(settings.sessions_before_long_break, 0);
    }

    #[test]
    fn sanitize_caps_runaway_durations() {
        let settings = TimerSettings {
            work_secs: u64::MAX,
            short_break_secs: MAX_DURATION_SECS + 1,
            long_break_secs: 900,
            sessions_before_long_break: 4,
        }
        .sanitized();

        assert_eq!(settings.work_secs, MAX_DURATION_SECS);
        assert_eq!(settings.short_break_secs, MAX_DURATION_SECS);
        assert_eq!(settings.long_break_secs, 900);
    }

    #[test]
    fn update_survives_reopening() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        let mut custom = TimerSettings::default();
        custom.work_secs = 50 * 60;
        custom.sessions_before_long_break = 2;
        store.update_timer(custom).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.timer(), custom);
    }

    #[test]
    fn reload_picks_up_external_edits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.timer(), TimerSettings::default());

        let mut custom = TimerSettings::default();
        custom.short_break_secs = 10 * 60;
        SettingsStore::new(path)
            .unwrap()
            .update_timer(custom)
            .unwrap();

        // The first handle keeps serving its cached copy until told to re-read.
        assert_eq!(store.timer(), TimerSettings::default());
        store.reload().unwrap();
        assert_eq!(store.timer(), custom);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json at all").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.timer(), TimerSettings::default());
    }
}
