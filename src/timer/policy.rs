use crate::models::SessionKind;
use crate::settings::TimerSettings;

use super::error::TimerError;

/// Configured duration in seconds for a session of `kind`.
pub fn session_duration(kind: SessionKind, settings: &TimerSettings) -> u64 {
    match kind {
        SessionKind::Work => settings.work_secs,
        SessionKind::ShortBreak => settings.short_break_secs,
        SessionKind::LongBreak => settings.long_break_secs,
    }
}

/// Rejects settings the sequencer cannot honor. Durations are the store's
/// problem; only the threshold can make `next_kind` fail.
pub fn validate(settings: &TimerSettings) -> Result<(), TimerError> {
    ensure_threshold(settings.sessions_before_long_break)
}

/// Kind of the session that follows a just-finished session of `kind`.
///
/// `completed_work_sessions` must already count the work session that
/// finished. Every break leads back to work; work leads to a long break on
/// exact positive multiples of the threshold and a short break otherwise.
pub fn next_kind(
    kind: SessionKind,
    completed_work_sessions: u32,
    sessions_before_long_break: u32,
) -> Result<SessionKind, TimerError> {
    ensure_threshold(sessions_before_long_break)?;

    if !kind.is_work() {
        return Ok(SessionKind::Work);
    }

    if completed_work_sessions > 0 && completed_work_sessions % sessions_before_long_break == 0 {
        Ok(SessionKind::LongBreak)
    } else {
        Ok(SessionKind::ShortBreak)
    }
}

fn ensure_threshold(sessions_before_long_break: u32) -> Result<(), TimerError> {
    if sessions_before_long_break < 1 {
        return Err(TimerError::InvalidConfig(
            "sessionsBeforeLongBreak must be at least 1".into(),
        ));
    }
    Ok(())
}
