#![allow(dead_code)]

//! Shared fakes and event-stream drivers for the timer integration tests.
//!
//! Everything here runs under a paused tokio clock; waiting on the event
//! stream is what drives virtual time forward.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use caffe_pomodoro::{
    Notifier, SessionKind, SessionRecord, SessionStore, SettingsProvider, TimerController,
    TimerEvent, TimerSettings, TimerState,
};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Duration};

/// One store invocation, in the order the recorder issued them.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Create {
        kind: SessionKind,
        task_id: Option<String>,
    },
    Close {
        was_completed: bool,
    },
    Increment {
        task_id: String,
    },
}

/// In-memory store that logs calls and can delay creates, widening the
/// window between a start and its record confirmation.
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<StoreCall>>,
    create_delay: Mutex<Option<Duration>>,
}

impl RecordingStore {
    pub fn delay_creates(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Waits in virtual time until at least `expected` calls have landed.
    pub async fn settle(&self, expected: usize) {
        for _ in 0..1000 {
            if self.calls.lock().unwrap().len() >= expected {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("store never reached {expected} calls: {:?}", self.calls());
    }
}

#[async_trait]
impl SessionStore for RecordingStore {
    async fn create_session(&self, record: &SessionRecord) -> anyhow::Result<()> {
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.calls.lock().unwrap().push(StoreCall::Create {
            kind: record.kind,
            task_id: record.task_id.clone(),
        });
        Ok(())
    }

    async fn close_session(
        &self,
        _record_id: &str,
        was_completed: bool,
        _closed_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Close { was_completed });
        Ok(())
    }

    async fn increment_task_pomodoro(&self, task_id: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(StoreCall::Increment {
            task_id: task_id.to_string(),
        });
        Ok(())
    }
}

/// Settings provider the tests can repoint mid-run.
pub struct FixedSettings(Mutex<TimerSettings>);

impl FixedSettings {
    pub fn new(settings: TimerSettings) -> Self {
        Self(Mutex::new(settings))
    }

    pub fn set(&self, settings: TimerSettings) {
        *self.0.lock().unwrap() = settings;
    }
}

impl SettingsProvider for FixedSettings {
    fn timer_settings(&self) -> TimerSettings {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
pub struct CapturingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl CapturingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for CapturingNotifier {
    fn notify(&self, title: &str, body: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }
}

/// Short cycle so tests finish in a handful of virtual seconds. The
/// threshold of 2 means the second work session earns the long break.
pub fn quick_settings() -> TimerSettings {
    TimerSettings {
        work_secs: 3,
        short_break_secs: 2,
        long_break_secs: 4,
        sessions_before_long_break: 2,
    }
}

pub struct Harness {
    pub timer: TimerController,
    pub events: broadcast::Receiver<TimerEvent>,
    pub store: Arc<RecordingStore>,
    pub settings: Arc<FixedSettings>,
    pub notifier: Arc<CapturingNotifier>,
}

pub fn harness(settings: TimerSettings) -> Harness {
    let store = Arc::new(RecordingStore::default());
    let provider = Arc::new(FixedSettings::new(settings));
    let notifier = Arc::new(CapturingNotifier::default());
    let timer = TimerController::new(store.clone(), provider.clone(), notifier.clone());
    let events = timer.subscribe();
    Harness {
        timer,
        events,
        store,
        settings: provider,
        notifier,
    }
}

/// Next event off the stream. The generous timeout turns a would-be
/// deadlock into a clean panic, and under the paused clock it also lets
/// the runtime auto-advance to the next armed timer.
pub async fn next_event(events: &mut broadcast::Receiver<TimerEvent>) -> TimerEvent {
    timeout(Duration::from_secs(120), events.recv())
        .await
        .expect("timed out waiting for a timer event")
        .expect("event stream closed")
}

/// Reads events until a state change satisfies `pred`.
pub async fn wait_for_state<F>(events: &mut broadcast::Receiver<TimerEvent>, pred: F) -> TimerState
where
    F: Fn(&TimerState) -> bool,
{
    for _ in 0..200 {
        if let TimerEvent::StateChanged { state } = next_event(events).await {
            if pred(&state) {
                return state;
            }
        }
    }
    panic!("no state change matched the predicate");
}

/// Reads events until the next session completion.
pub async fn wait_for_completed(
    events: &mut broadcast::Receiver<TimerEvent>,
) -> (SessionKind, Option<String>) {
    for _ in 0..200 {
        if let TimerEvent::SessionCompleted { kind, record_id } = next_event(events).await {
            return (kind, record_id);
        }
    }
    panic!("no completion event arrived");
}

/// Reads events until a tick reports exactly `remaining_secs`.
pub async fn wait_for_tick(events: &mut broadcast::Receiver<TimerEvent>, remaining_secs: u64) {
    for _ in 0..200 {
        if let TimerEvent::Tick { remaining_secs: r } = next_event(events).await {
            if r == remaining_secs {
                return;
            }
        }
    }
    panic!("never observed a tick at {remaining_secs}s");
}
