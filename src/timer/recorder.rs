//! Session lifecycle recorder.
//!
//! Persistence runs on its own worker so the countdown never waits on the
//! store. Commands are processed strictly in the order they were sent, which
//! is what keeps a fast start/reset pair from closing a record before it was
//! created. Store failures are logged and swallowed; the timer does not care.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{SessionKind, SessionRecord};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Durable home for session records and per-task pomodoro tallies.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, record: &SessionRecord) -> anyhow::Result<()>;
    async fn close_session(
        &self,
        record_id: &str,
        was_completed: bool,
        closed_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
    async fn increment_task_pomodoro(&self, task_id: &str) -> anyhow::Result<()>;
}

/// Sent back once a record has actually landed in the store. The attempt tag
/// lets the consumer ignore confirmations for attempts it already tore down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOpened {
    pub attempt: u64,
    pub record_id: String,
}

enum RecorderCmd {
    Open {
        attempt: u64,
        record: SessionRecord,
    },
    Close {
        was_completed: bool,
        closed_at: DateTime<Utc>,
    },
}

#[derive(Clone)]
pub struct SessionRecorder {
    tx: mpsc::UnboundedSender<RecorderCmd>,
}

impl SessionRecorder {
    pub fn spawn(
        store: Arc<dyn SessionStore>,
        opened: mpsc::UnboundedSender<RecordOpened>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(store, rx, opened));
        Self { tx }
    }

    /// Queues the creation of a session record for a newly started attempt.
    pub fn open(
        &self,
        attempt: u64,
        kind: SessionKind,
        task_id: Option<String>,
        planned_duration_secs: u64,
        started_at: DateTime<Utc>,
    ) {
        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            kind,
            task_id,
            planned_duration_secs,
            started_at,
            completed_at: None,
            was_completed: false,
        };
        let _ = self.tx.send(RecorderCmd::Open { attempt, record });
    }

    /// Queues the close of the currently open record, if any.
    pub fn close(&self, was_completed: bool) {
        let _ = self.tx.send(RecorderCmd::Close {
            was_completed,
            closed_at: Utc::now(),
        });
    }
}

async fn run_worker(
    store: Arc<dyn SessionStore>,
    mut rx: mpsc::UnboundedReceiver<RecorderCmd>,
    opened: mpsc::UnboundedSender<RecordOpened>,
) {
    let mut current: Option<SessionRecord> = None;

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RecorderCmd::Open { attempt, record } => {
                if let Some(stale) = current.take() {
                    log_warn!(
                        "session record {} still open at next start, closing as abandoned",
                        stale.id
                    );
                    close_record(store.as_ref(), &stale, false, Utc::now()).await;
                }

                match store.create_session(&record).await {
                    Ok(()) => {
                        let _ = opened.send(RecordOpened {
                            attempt,
                            record_id: record.id.clone(),
                        });
                        current = Some(record);
                    }
                    Err(err) => {
                        log_error!("failed to create session record {}: {err:?}", record.id);
                    }
                }
            }
            RecorderCmd::Close {
                was_completed,
                closed_at,
            } => match current.take() {
                Some(record) => {
                    close_record(store.as_ref(), &record, was_completed, closed_at).await
                }
                None => log_info!("close with no open session record, ignoring"),
            },
        }
    }
}

async fn close_record(
    store: &dyn SessionStore,
    record: &SessionRecord,
    was_completed: bool,
    closed_at: DateTime<Utc>,
) {
    if let Err(err) = store.close_session(&record.id, was_completed, closed_at).await {
        log_error!("failed to close session record {}: {err:?}", record.id);
        return;
    }

    // Only a naturally finished work session earns the task a pomodoro.
    if was_completed && record.kind.is_work() {
        if let Some(task_id) = &record.task_id {
            if let Err(err) = store.increment_task_pomodoro(task_id).await {
                log_error!("failed to bump pomodoro count for task {task_id}: {err:?}");
            }
        }
    }
}
