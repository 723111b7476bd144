//! End-to-end flows through the timer facade: countdown, natural
//! completion, the grace auto-advance, and the long-break cadence.

mod common;

use caffe_pomodoro::{SessionKind, TimerEvent, TimerSettings, TimerStatus};
use common::*;
use tokio::time::{advance, Duration};

#[tokio::test(start_paused = true)]
async fn work_session_runs_to_completion_and_is_recorded() {
    let mut h = harness(quick_settings());

    let state = h.timer.start(Some("task-1".into())).await.unwrap();
    assert_eq!(state.status, TimerStatus::Running);
    assert_eq!(state.kind, SessionKind::Work);
    assert_eq!(state.remaining_secs, 3);
    assert_eq!(state.total_secs, 3);
    assert_eq!(state.task_id.as_deref(), Some("task-1"));

    // The record confirmation lands before the first tick.
    let state = wait_for_state(&mut h.events, |s| s.active_record_id.is_some()).await;
    assert_eq!(state.status, TimerStatus::Running);

    let (kind, record_id) = wait_for_completed(&mut h.events).await;
    assert_eq!(kind, SessionKind::Work);
    assert!(record_id.is_some());

    // Completed holds at zero; the counter moves on the advance, not here.
    let state = h.timer.state().await.unwrap();
    assert_eq!(state.status, TimerStatus::Completed);
    assert_eq!(state.remaining_secs, 0);
    assert_eq!(state.completed_work_sessions, 0);

    // After the grace window the short break arms itself.
    let state = wait_for_state(&mut h.events, |s| s.status == TimerStatus::Idle).await;
    assert_eq!(state.kind, SessionKind::ShortBreak);
    assert_eq!(state.remaining_secs, 2);
    assert_eq!(state.completed_work_sessions, 1);
    assert!(state.task_id.is_none());
    assert!(state.active_record_id.is_none());

    h.store.settle(3).await;
    assert_eq!(
        h.store.calls(),
        vec![
            StoreCall::Create {
                kind: SessionKind::Work,
                task_id: Some("task-1".into())
            },
            StoreCall::Close {
                was_completed: true
            },
            StoreCall::Increment {
                task_id: "task-1".into()
            },
        ]
    );

    assert_eq!(
        h.notifier.sent(),
        vec![(
            "Coffee Pomodoro".to_string(),
            "Time for a break!".to_string()
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn ticks_count_down_second_by_second() {
    let mut h = harness(quick_settings());

    h.timer.start(None).await.unwrap();
    wait_for_tick(&mut h.events, 2).await;
    wait_for_tick(&mut h.events, 1).await;
    wait_for_tick(&mut h.events, 0).await;

    let state = h.timer.state().await.unwrap();
    assert_eq!(state.formatted_remaining(), "00:00");
}

#[tokio::test(start_paused = true)]
async fn the_threshold_work_session_earns_the_long_break() {
    let mut h = harness(quick_settings());

    // Work #1 ends in a short break.
    h.timer.start(None).await.unwrap();
    let state = wait_for_state(&mut h.events, |s| s.status == TimerStatus::Idle).await;
    assert_eq!(state.kind, SessionKind::ShortBreak);
    assert_eq!(state.completed_work_sessions, 1);

    // The break returns to work without touching the counter.
    h.timer.start(None).await.unwrap();
    let state = wait_for_state(&mut h.events, |s| s.status == TimerStatus::Idle).await;
    assert_eq!(state.kind, SessionKind::Work);
    assert_eq!(state.completed_work_sessions, 1);

    // Work #2 hits the threshold of 2.
    h.timer.start(None).await.unwrap();
    let state = wait_for_state(&mut h.events, |s| s.status == TimerStatus::Idle).await;
    assert_eq!(state.kind, SessionKind::LongBreak);
    assert_eq!(state.remaining_secs, 4);
    assert_eq!(state.completed_work_sessions, 2);

    let bodies: Vec<String> = h.notifier.sent().into_iter().map(|(_, body)| body).collect();
    assert_eq!(
        bodies,
        vec!["Time for a break!", "Time to work!", "Time for a break!"]
    );
}

#[tokio::test(start_paused = true)]
async fn restarting_on_each_idle_landing_walks_the_full_cycle() {
    let mut h = harness(quick_settings());

    h.timer.start(None).await.unwrap();

    // Drive the timer the way the headless runner does: note each completion,
    // then start again when the grace advance lands the timer in Idle.
    let mut completed = Vec::new();
    let mut advance_pending = false;
    while completed.len() < 4 {
        match next_event(&mut h.events).await {
            TimerEvent::SessionCompleted { kind, .. } => {
                completed.push(kind);
                advance_pending = true;
            }
            TimerEvent::StateChanged { state }
                if advance_pending && state.status == TimerStatus::Idle =>
            {
                advance_pending = false;
                h.timer.start(None).await.unwrap();
            }
            _ => {}
        }
    }

    assert_eq!(
        completed,
        vec![
            SessionKind::Work,
            SessionKind::ShortBreak,
            SessionKind::Work,
            SessionKind::LongBreak,
        ]
    );

    let state = h.timer.state().await.unwrap();
    assert_eq!(state.completed_work_sessions, 2);
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_still_complete_the_session() {
    let mut h = harness(TimerSettings {
        work_secs: 5,
        ..quick_settings()
    });

    h.timer.start(None).await.unwrap();
    wait_for_tick(&mut h.events, 3).await;

    let paused = h.timer.pause().await.unwrap();
    assert_eq!(paused.status, TimerStatus::Paused);
    assert_eq!(paused.remaining_secs, 3);

    // A paused timer is deaf to the passage of time.
    advance(Duration::from_secs(30)).await;
    let state = h.timer.state().await.unwrap();
    assert_eq!(state.status, TimerStatus::Paused);
    assert_eq!(state.remaining_secs, 3);

    let resumed = h.timer.resume().await.unwrap();
    assert_eq!(resumed.status, TimerStatus::Running);
    assert_eq!(resumed.remaining_secs, 3);

    let (kind, _) = wait_for_completed(&mut h.events).await;
    assert_eq!(kind, SessionKind::Work);

    h.store.settle(2).await;
    assert_eq!(
        h.store.calls(),
        vec![
            StoreCall::Create {
                kind: SessionKind::Work,
                task_id: None
            },
            StoreCall::Close {
                was_completed: true
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn resync_reemits_state_and_a_fresh_tick_while_running() {
    let mut h = harness(quick_settings());

    // Idle resync is just the state again.
    let state = h.timer.resync().await.unwrap();
    assert_eq!(state.status, TimerStatus::Idle);

    h.timer.start(None).await.unwrap();
    wait_for_tick(&mut h.events, 2).await;

    // Mid-run resync repeats the current reading without waiting a second.
    h.timer.resync().await.unwrap();
    wait_for_tick(&mut h.events, 2).await;
}
