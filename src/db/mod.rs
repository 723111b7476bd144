use std::{
    collections::HashMap,
    convert::TryFrom,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;
use uuid::Uuid;

mod migrations;

use crate::models::{DailyStats, SessionKind, SessionRecord, Task, WeeklyStats};
use crate::timer::SessionStore;
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("value {value} is negative"))
}

fn to_u32(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("value {value} does not fit in a counter"))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|err| anyhow!("invalid date '{value}': {err}"))
}

fn kind_from_str(value: &str) -> Result<SessionKind> {
    match value {
        "Work" => Ok(SessionKind::Work),
        "ShortBreak" => Ok(SessionKind::ShortBreak),
        "LongBreak" => Ok(SessionKind::LongBreak),
        _ => Err(anyhow!("unknown session kind '{value}'")),
    }
}

fn session_from_row(row: &rusqlite::Row<'_>) -> Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        kind: kind_from_str(&row.get::<_, String>(1)?)?,
        task_id: row.get(2)?,
        planned_duration_secs: to_u64(row.get::<_, i64>(3)?)?,
        started_at: parse_datetime(&row.get::<_, String>(4)?)?,
        completed_at: row
            .get::<_, Option<String>>(5)?
            .map(|value| parse_datetime(&value))
            .transpose()?,
        was_completed: row.get(6)?,
    })
}

fn task_from_row(row: &rusqlite::Row<'_>) -> Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        estimated_pomodoros: row
            .get::<_, Option<i64>>(2)?
            .map(to_u32)
            .transpose()?,
        completed_pomodoros: to_u32(row.get::<_, i64>(3)?)?,
        is_completed: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?)?,
    })
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Per-day aggregate over work sessions started in `[range_start, range_end)`.
/// Minutes count only the naturally completed ones.
fn work_stats_by_day(
    conn: &Connection,
    range_start: &str,
    range_end: &str,
) -> Result<HashMap<NaiveDate, DailyStats>> {
    let mut stmt = conn.prepare(
        "SELECT date(started_at),
                COUNT(*),
                COALESCE(SUM(was_completed), 0),
                COALESCE(SUM(CASE WHEN was_completed = 1 THEN planned_duration_secs ELSE 0 END), 0)
         FROM sessions
         WHERE kind = 'Work' AND started_at >= ?1 AND started_at < ?2
         GROUP BY date(started_at)",
    )?;

    let mut per_day = HashMap::new();
    let mut rows = stmt.query(params![range_start, range_end])?;
    while let Some(row) = rows.next()? {
        let date = parse_date(&row.get::<_, String>(0)?)?;
        let stats = DailyStats {
            date,
            total_sessions: to_u32(row.get::<_, i64>(1)?)?,
            completed_sessions: to_u32(row.get::<_, i64>(2)?)?,
            total_minutes: to_u64(row.get::<_, i64>(3)?)? / 60,
        };
        per_day.insert(date, stats);
    }

    Ok(per_day)
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("caffe-pomodoro-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(
                            Err(anyhow::Error::new(err).context("failed to open SQLite database")),
                        );
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn insert_session(&self, record: &SessionRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, kind, task_id, planned_duration_secs, started_at, completed_at, was_completed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.kind.as_str(),
                    record.task_id,
                    to_i64(record.planned_duration_secs)?,
                    record.started_at.to_rfc3339(),
                    record.completed_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.was_completed,
                ],
            )
            .with_context(|| "failed to insert session")?;
            Ok(())
        })
        .await
    }

    pub async fn close_session_record(
        &self,
        record_id: &str,
        was_completed: bool,
        closed_at: DateTime<Utc>,
    ) -> Result<()> {
        let record_id = record_id.to_string();
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE sessions
                     SET completed_at = ?1,
                         was_completed = ?2
                     WHERE id = ?3",
                    params![closed_at.to_rfc3339(), was_completed, record_id],
                )
                .with_context(|| "failed to close session")?;
            if updated == 0 {
                bail!("no session with id {record_id}");
            }
            Ok(())
        })
        .await
    }

    pub async fn get_session(&self, record_id: &str) -> Result<Option<SessionRecord>> {
        let record_id = record_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, task_id, planned_duration_secs, started_at, completed_at, was_completed
                 FROM sessions
                 WHERE id = ?1",
            )?;

            let mut rows = stmt.query(params![record_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(session_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Records with no terminal transition yet, newest first.
    pub async fn get_open_sessions(&self) -> Result<Vec<SessionRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, task_id, planned_duration_secs, started_at, completed_at, was_completed
                 FROM sessions
                 WHERE completed_at IS NULL
                 ORDER BY started_at DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(session_from_row(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Closes every record left open by a crash as abandoned. Returns how
    /// many were closed.
    pub async fn close_dangling_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let closed = conn
                .execute(
                    "UPDATE sessions
                     SET completed_at = ?1,
                         was_completed = 0
                     WHERE completed_at IS NULL",
                    params![now.to_rfc3339()],
                )
                .with_context(|| "failed to close dangling sessions")?;
            Ok(closed)
        })
        .await
    }

    /// Sessions of every kind started in the last `days` days, newest first.
    pub async fn session_history(&self, days: u32) -> Result<Vec<SessionRecord>> {
        let since = (Utc::now() - Duration::days(i64::from(days))).to_rfc3339();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, task_id, planned_duration_secs, started_at, completed_at, was_completed
                 FROM sessions
                 WHERE started_at >= ?1
                 ORDER BY started_at DESC",
            )?;

            let mut rows = stmt.query(params![since])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(session_from_row(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Work-session aggregate for today (UTC).
    pub async fn today_stats(&self) -> Result<DailyStats> {
        let today = Utc::now().date_naive();
        let range_start = midnight_utc(today).to_rfc3339();
        let range_end = midnight_utc(today + Duration::days(1)).to_rfc3339();

        self.execute(move |conn| {
            let per_day = work_stats_by_day(conn, &range_start, &range_end)?;
            Ok(per_day
                .get(&today)
                .cloned()
                .unwrap_or_else(|| DailyStats::empty(today)))
        })
        .await
    }

    /// Work-session aggregate for the current week (Sunday-based, UTC), with
    /// a breakdown entry for each of the seven days.
    pub async fn weekly_stats(&self) -> Result<WeeklyStats> {
        let today = Utc::now().date_naive();
        let start = today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
        let range_start = midnight_utc(start).to_rfc3339();
        let range_end = midnight_utc(start + Duration::days(7)).to_rfc3339();

        self.execute(move |conn| {
            let mut per_day = work_stats_by_day(conn, &range_start, &range_end)?;

            let mut weekly = WeeklyStats {
                start_date: start,
                end_date: start + Duration::days(6),
                total_sessions: 0,
                completed_sessions: 0,
                total_minutes: 0,
                daily_breakdown: Vec::with_capacity(7),
            };

            for offset in 0..7 {
                let date = start + Duration::days(offset);
                let day = per_day
                    .remove(&date)
                    .unwrap_or_else(|| DailyStats::empty(date));
                weekly.total_sessions += day.total_sessions;
                weekly.completed_sessions += day.completed_sessions;
                weekly.total_minutes += day.total_minutes;
                weekly.daily_breakdown.push(day);
            }

            Ok(weekly)
        })
        .await
    }

    pub async fn create_task(
        &self,
        title: String,
        estimated_pomodoros: Option<u32>,
    ) -> Result<Task> {
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title,
            estimated_pomodoros,
            completed_pomodoros: 0,
            is_completed: false,
            created_at: Utc::now(),
        };

        let record = task.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, title, estimated_pomodoros, completed_pomodoros, is_completed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.title,
                    record.estimated_pomodoros.map(i64::from),
                    i64::from(record.completed_pomodoros),
                    record.is_completed,
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert task")?;
            Ok(())
        })
        .await?;

        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let task_id = task_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, estimated_pomodoros, completed_pomodoros, is_completed, created_at
                 FROM tasks
                 WHERE id = ?1",
            )?;

            let mut rows = stmt.query(params![task_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(task_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, estimated_pomodoros, completed_pomodoros, is_completed, created_at
                 FROM tasks
                 ORDER BY created_at ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut tasks = Vec::new();
            while let Some(row) = rows.next()? {
                tasks.push(task_from_row(row)?);
            }
            Ok(tasks)
        })
        .await
    }

    pub async fn set_task_completed(&self, task_id: &str, is_completed: bool) -> Result<()> {
        let task_id = task_id.to_string();
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE tasks SET is_completed = ?1 WHERE id = ?2",
                    params![is_completed, task_id],
                )
                .with_context(|| "failed to update task")?;
            if updated == 0 {
                bail!("no task with id {task_id}");
            }
            Ok(())
        })
        .await
    }

    pub async fn increment_task_pomodoro(&self, task_id: &str) -> Result<()> {
        let task_id = task_id.to_string();
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE tasks
                     SET completed_pomodoros = completed_pomodoros + 1
                     WHERE id = ?1",
                    params![task_id],
                )
                .with_context(|| "failed to increment task pomodoros")?;
            if updated == 0 {
                bail!("no task with id {task_id}");
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn create_session(&self, record: &SessionRecord) -> Result<()> {
        self.insert_session(record).await
    }

    async fn close_session(
        &self,
        record_id: &str,
        was_completed: bool,
        closed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.close_session_record(record_id, was_completed, closed_at)
            .await
    }

    async fn increment_task_pomodoro(&self, task_id: &str) -> Result<()> {
        Database::increment_task_pomodoro(self, task_id).await
    }
}
