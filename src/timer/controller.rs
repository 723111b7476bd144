//! Timer facade and single owner of [`TimerState`].
//!
//! Handles send commands into one channel; engine ticks, record
//! confirmations and grace alarms arrive on the same channel. A single
//! worker task consumes it all in order, so transitions never race and the
//! state needs no lock. Consumers watch a broadcast stream of
//! [`TimerEvent`]s.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep, Duration};

use crate::models::SessionKind;
use crate::notify::Notifier;
use crate::settings::{SettingsProvider, TimerSettings};

use super::countdown::{CountdownEngine, EngineEvent, EnginePulse};
use super::error::TimerError;
use super::policy;
use super::recorder::{RecordOpened, SessionRecorder, SessionStore};
use super::state::{TimerState, TimerStatus};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Seconds between natural completion and the automatic advance to the next
/// armed session.
const GRACE_SECS: u64 = 3;
const EVENT_CHANNEL_CAPACITY: usize = 64;
const NOTIFY_TITLE: &str = "Coffee Pomodoro";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TimerEvent {
    StateChanged {
        state: TimerState,
    },
    Tick {
        remaining_secs: u64,
    },
    SessionCompleted {
        kind: SessionKind,
        record_id: Option<String>,
    },
}

type Reply = oneshot::Sender<Result<TimerState, TimerError>>;

enum TimerCommand {
    Start { task_id: Option<String>, reply: Reply },
    Pause { reply: Reply },
    Resume { reply: Reply },
    Reset { reply: Reply },
    Skip { reply: Reply },
    SetKind { kind: SessionKind, reply: Reply },
    AddTime { reply: Reply },
    SubtractTime { reply: Reply },
    Resync { reply: Reply },
    Query { reply: oneshot::Sender<TimerState> },
}

enum WorkerMsg {
    Command(TimerCommand),
    Engine(EngineEvent),
    Opened(RecordOpened),
    AdvanceGrace { token: u64 },
}

/// Cloneable handle to the timer worker.
#[derive(Clone)]
pub struct TimerController {
    tx: mpsc::UnboundedSender<WorkerMsg>,
    events: broadcast::Sender<TimerEvent>,
}

impl TimerController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn SettingsProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(forward(engine_rx, msg_tx.downgrade(), WorkerMsg::Engine));
        tokio::spawn(forward(opened_rx, msg_tx.downgrade(), WorkerMsg::Opened));

        let settings = provider.timer_settings();
        let kind = SessionKind::default();
        let state = TimerState::idle(kind, policy::session_duration(kind, &settings));

        let worker = Worker {
            state,
            settings,
            provider,
            engine: CountdownEngine::new(engine_tx),
            recorder: SessionRecorder::spawn(store, opened_tx),
            notifier,
            events: events.clone(),
            msg_tx: msg_tx.downgrade(),
            engine_epoch: 0,
            attempt: 0,
            grace_token: 0,
        };
        tokio::spawn(worker.run(msg_rx));

        Self { tx: msg_tx, events }
    }

    /// New subscription to the event stream. Slow subscribers lag and drop
    /// old events rather than slowing the worker down.
    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    pub async fn start(&self, task_id: Option<String>) -> Result<TimerState, TimerError> {
        let (reply, rx) = oneshot::channel();
        self.send(TimerCommand::Start { task_id, reply })?;
        rx.await.map_err(|_| TimerError::Closed)?
    }

    pub async fn pause(&self) -> Result<TimerState, TimerError> {
        let (reply, rx) = oneshot::channel();
        self.send(TimerCommand::Pause { reply })?;
        rx.await.map_err(|_| TimerError::Closed)?
    }

    pub async fn resume(&self) -> Result<TimerState, TimerError> {
        let (reply, rx) = oneshot::channel();
        self.send(TimerCommand::Resume { reply })?;
        rx.await.map_err(|_| TimerError::Closed)?
    }

    pub async fn reset(&self) -> Result<TimerState, TimerError> {
        let (reply, rx) = oneshot::channel();
        self.send(TimerCommand::Reset { reply })?;
        rx.await.map_err(|_| TimerError::Closed)?
    }

    pub async fn skip(&self) -> Result<TimerState, TimerError> {
        let (reply, rx) = oneshot::channel();
        self.send(TimerCommand::Skip { reply })?;
        rx.await.map_err(|_| TimerError::Closed)?
    }

    pub async fn set_kind(&self, kind: SessionKind) -> Result<TimerState, TimerError> {
        let (reply, rx) = oneshot::channel();
        self.send(TimerCommand::SetKind { kind, reply })?;
        rx.await.map_err(|_| TimerError::Closed)?
    }

    pub async fn add_time(&self) -> Result<TimerState, TimerError> {
        let (reply, rx) = oneshot::channel();
        self.send(TimerCommand::AddTime { reply })?;
        rx.await.map_err(|_| TimerError::Closed)?
    }

    pub async fn subtract_time(&self) -> Result<TimerState, TimerError> {
        let (reply, rx) = oneshot::channel();
        self.send(TimerCommand::SubtractTime { reply })?;
        rx.await.map_err(|_| TimerError::Closed)?
    }

    /// Re-emits the freshest state, and while Running also asks the engine
    /// for an out-of-band tick. Meant for consumers waking from suspension.
    pub async fn resync(&self) -> Result<TimerState, TimerError> {
        let (reply, rx) = oneshot::channel();
        self.send(TimerCommand::Resync { reply })?;
        rx.await.map_err(|_| TimerError::Closed)?
    }

    pub async fn state(&self) -> Result<TimerState, TimerError> {
        let (reply, rx) = oneshot::channel();
        self.send(TimerCommand::Query { reply })?;
        rx.await.map_err(|_| TimerError::Closed)
    }

    fn send(&self, command: TimerCommand) -> Result<(), TimerError> {
        self.tx
            .send(WorkerMsg::Command(command))
            .map_err(|_| TimerError::Closed)
    }
}

/// Relays items into the worker channel. The sender is weak: only the
/// controller handles keep the worker alive, never its own satellites.
async fn forward<T>(
    mut rx: mpsc::UnboundedReceiver<T>,
    tx: mpsc::WeakUnboundedSender<WorkerMsg>,
    wrap: fn(T) -> WorkerMsg,
) {
    while let Some(item) = rx.recv().await {
        let Some(sender) = tx.upgrade() else {
            break;
        };
        if sender.send(wrap(item)).is_err() {
            break;
        }
    }
}

struct Worker {
    state: TimerState,
    /// Snapshot taken when the current cycle was armed. Never refreshed
    /// while an attempt is live, so one countdown sees one set of values.
    settings: TimerSettings,
    provider: Arc<dyn SettingsProvider>,
    engine: CountdownEngine,
    recorder: SessionRecorder,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<TimerEvent>,
    /// Self-sender for the grace alarms. Weak: the worker must not hold its
    /// own channel open once every controller handle is gone.
    msg_tx: mpsc::WeakUnboundedSender<WorkerMsg>,
    /// Identity of the current engine run; events from older runs are stale.
    engine_epoch: u64,
    /// Identity of the current started attempt; record confirmations from
    /// older attempts are stale.
    attempt: u64,
    /// Identity of the current completion grace window.
    grace_token: u64,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WorkerMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                WorkerMsg::Command(command) => self.handle_command(command),
                WorkerMsg::Engine(event) => self.handle_engine(event),
                WorkerMsg::Opened(note) => self.handle_opened(note),
                WorkerMsg::AdvanceGrace { token } => self.handle_grace(token),
            }
        }
        log_info!("timer worker shutting down");
    }

    fn handle_command(&mut self, command: TimerCommand) {
        match command {
            TimerCommand::Start { task_id, reply } => {
                let _ = reply.send(self.start(task_id));
            }
            TimerCommand::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            TimerCommand::Resume { reply } => {
                let _ = reply.send(self.resume());
            }
            TimerCommand::Reset { reply } => {
                let _ = reply.send(self.reset());
            }
            TimerCommand::Skip { reply } => {
                let _ = reply.send(self.skip());
            }
            TimerCommand::SetKind { kind, reply } => {
                let _ = reply.send(self.set_kind(kind));
            }
            TimerCommand::AddTime { reply } => {
                let _ = reply.send(self.adjust_time(60));
            }
            TimerCommand::SubtractTime { reply } => {
                let _ = reply.send(self.adjust_time(-60));
            }
            TimerCommand::Resync { reply } => {
                let _ = reply.send(self.resync());
            }
            TimerCommand::Query { reply } => {
                let _ = reply.send(self.state.clone());
            }
        }
    }

    fn start(&mut self, task_id: Option<String>) -> Result<TimerState, TimerError> {
        match self.state.status {
            TimerStatus::Idle => {}
            // The pending auto-advance runs now instead of after the grace.
            TimerStatus::Completed => {
                self.advance()?;
                self.broadcast_state();
            }
            status => {
                return Err(TimerError::InvalidTransition { op: "start", status });
            }
        }

        self.settings = self.provider.timer_settings();
        policy::validate(&self.settings)?;

        self.attempt += 1;
        self.engine_epoch += 1;
        self.state.begin_attempt(task_id);
        self.engine.start(self.state.remaining_secs, self.engine_epoch);
        self.recorder.open(
            self.attempt,
            self.state.kind,
            self.state.task_id.clone(),
            self.state.total_secs,
            Utc::now(),
        );

        log_info!(
            "attempt {} started: {:?} for {}s",
            self.attempt,
            self.state.kind,
            self.state.total_secs
        );
        self.broadcast_state();
        Ok(self.state.clone())
    }

    fn pause(&mut self) -> Result<TimerState, TimerError> {
        if self.state.status != TimerStatus::Running {
            return Err(TimerError::InvalidTransition {
                op: "pause",
                status: self.state.status,
            });
        }

        if let Some(remaining) = self.engine.pause() {
            self.state.remaining_secs = remaining;
        }
        self.engine_epoch += 1;
        self.state.status = TimerStatus::Paused;
        self.broadcast_state();
        Ok(self.state.clone())
    }

    fn resume(&mut self) -> Result<TimerState, TimerError> {
        if self.state.status != TimerStatus::Paused {
            return Err(TimerError::InvalidTransition {
                op: "resume",
                status: self.state.status,
            });
        }

        self.engine_epoch += 1;
        self.engine.start(self.state.remaining_secs, self.engine_epoch);
        self.state.status = TimerStatus::Running;
        self.broadcast_state();
        Ok(self.state.clone())
    }

    fn reset(&mut self) -> Result<TimerState, TimerError> {
        if !self.state.is_active() {
            return Err(TimerError::InvalidTransition {
                op: "reset",
                status: self.state.status,
            });
        }

        self.engine.stop();
        self.engine_epoch += 1;
        self.recorder.close(false);

        self.settings = self.provider.timer_settings();
        let kind = self.state.kind;
        self.state
            .enter_idle(kind, policy::session_duration(kind, &self.settings));
        self.broadcast_state();
        Ok(self.state.clone())
    }

    fn skip(&mut self) -> Result<TimerState, TimerError> {
        let (next, new_count) = self.plan_advance()?;

        if self.state.is_active() {
            self.engine.stop();
            self.engine_epoch += 1;
            self.recorder.close(false);
        }

        self.commit_advance(next, new_count);
        self.broadcast_state();
        Ok(self.state.clone())
    }

    fn set_kind(&mut self, kind: SessionKind) -> Result<TimerState, TimerError> {
        if self.state.is_active() {
            return Err(TimerError::InvalidTransition {
                op: "setKind",
                status: self.state.status,
            });
        }

        // Leaving Completed here drops the pending auto-advance, count
        // included; the user asked for a specific kind, not the next one.
        self.settings = self.provider.timer_settings();
        self.state
            .enter_idle(kind, policy::session_duration(kind, &self.settings));
        self.broadcast_state();
        Ok(self.state.clone())
    }

    fn adjust_time(&mut self, delta_secs: i64) -> Result<TimerState, TimerError> {
        if self.state.status != TimerStatus::Idle {
            let op = if delta_secs >= 0 { "addTime" } else { "subtractTime" };
            return Err(TimerError::InvalidTransition {
                op,
                status: self.state.status,
            });
        }

        let remaining = if delta_secs >= 0 {
            self.state.remaining_secs + delta_secs as u64
        } else {
            self.state
                .remaining_secs
                .saturating_sub(delta_secs.unsigned_abs())
                .max(60)
        };
        self.state.remaining_secs = remaining;
        self.state.total_secs = remaining;
        self.broadcast_state();
        Ok(self.state.clone())
    }

    fn resync(&mut self) -> Result<TimerState, TimerError> {
        if self.state.status == TimerStatus::Running {
            self.engine.resync();
        }
        self.broadcast_state();
        Ok(self.state.clone())
    }

    fn handle_engine(&mut self, event: EngineEvent) {
        if event.epoch != self.engine_epoch {
            log_info!(
                "dropping stale engine event (epoch {} vs {})",
                event.epoch,
                self.engine_epoch
            );
            return;
        }

        match event.pulse {
            EnginePulse::Tick { remaining_secs } => {
                if self.state.status == TimerStatus::Running {
                    self.state.remaining_secs = remaining_secs;
                    let _ = self.events.send(TimerEvent::Tick { remaining_secs });
                }
            }
            EnginePulse::Completed => self.complete(),
        }
    }

    /// Natural completion: close the record as completed, notify, enter
    /// Completed, and arm the grace alarm for the auto-advance.
    fn complete(&mut self) {
        self.engine.stop();
        self.engine_epoch += 1;

        let finished_kind = self.state.kind;
        let record_id = self.state.active_record_id.clone();

        self.recorder.close(true);
        self.state.mark_completed();

        let body = if finished_kind.is_work() {
            "Time for a break!"
        } else {
            "Time to work!"
        };
        self.notifier.notify(NOTIFY_TITLE, body);

        self.grace_token += 1;
        let token = self.grace_token;
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(GRACE_SECS)).await;
            if let Some(sender) = tx.upgrade() {
                let _ = sender.send(WorkerMsg::AdvanceGrace { token });
            }
        });

        log_info!("session completed: {:?}", finished_kind);
        self.broadcast_state();
        let _ = self.events.send(TimerEvent::SessionCompleted {
            kind: finished_kind,
            record_id,
        });
    }

    fn handle_opened(&mut self, note: RecordOpened) {
        if note.attempt == self.attempt && self.state.is_active() {
            self.state.active_record_id = Some(note.record_id);
            self.broadcast_state();
        } else {
            log_info!(
                "dropping record confirmation {} for superseded attempt {}",
                note.record_id,
                note.attempt
            );
        }
    }

    fn handle_grace(&mut self, token: u64) {
        if token != self.grace_token || self.state.status != TimerStatus::Completed {
            return;
        }
        match self.advance() {
            Ok(()) => self.broadcast_state(),
            Err(err) => log_error!("auto-advance failed: {err}"),
        }
    }

    /// Move from the current kind to the next armed one. The work counter
    /// moves here and nowhere else. Fails without side effects when the
    /// threshold is out of range.
    fn advance(&mut self) -> Result<(), TimerError> {
        let (next, new_count) = self.plan_advance()?;
        self.commit_advance(next, new_count);
        Ok(())
    }

    fn plan_advance(&self) -> Result<(SessionKind, u32), TimerError> {
        let kind = self.state.kind;
        let new_count = if kind.is_work() {
            self.state.completed_work_sessions + 1
        } else {
            self.state.completed_work_sessions
        };
        let next = policy::next_kind(kind, new_count, self.settings.sessions_before_long_break)?;
        Ok((next, new_count))
    }

    fn commit_advance(&mut self, next: SessionKind, new_count: u32) {
        self.state.completed_work_sessions = new_count;
        self.settings = self.provider.timer_settings();
        self.state
            .enter_idle(next, policy::session_duration(next, &self.settings));
    }

    fn broadcast_state(&self) {
        let _ = self.events.send(TimerEvent::StateChanged {
            state: self.state.clone(),
        });
    }
}
