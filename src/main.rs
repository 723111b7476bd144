use std::{env, path::PathBuf, sync::Arc};

use anyhow::Result;
use caffe_pomodoro::{
    Database, LogNotifier, SettingsStore, TimerController, TimerEvent, TimerStatus,
};
use chrono::Utc;
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;

fn data_dir() -> PathBuf {
    env::var_os("CAFFE_POMODORO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".caffe-pomodoro"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Coffee Pomodoro starting up...");

    let dir = data_dir();
    std::fs::create_dir_all(&dir)?;

    let database = Database::new(dir.join("caffe-pomodoro.sqlite3"))?;

    // Finalize sessions that were running when the app last crashed.
    let recovered = database.close_dangling_sessions(Utc::now()).await?;
    if recovered > 0 {
        warn!("Closed {recovered} session(s) left open by a previous run");
    }

    let settings = SettingsStore::new(dir.join("settings.json"))?;
    let timer = TimerController::new(
        Arc::new(database.clone()),
        Arc::new(settings),
        Arc::new(LogNotifier),
    );

    let mut events = timer.subscribe();
    let state = timer.start(None).await?;
    info!(
        "Started a {:?} session ({})",
        state.kind,
        state.formatted_remaining()
    );

    // The grace advance parks the timer back in Idle; restarting there keeps
    // the cycle rolling until Ctrl-C.
    let mut advance_pending = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let state = timer.state().await?;
                if state.is_active() {
                    timer.reset().await?;
                }
                info!("Shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(TimerEvent::Tick { remaining_secs }) => {
                    println!("{:02}:{:02}", remaining_secs / 60, remaining_secs % 60);
                }
                Ok(TimerEvent::SessionCompleted { kind, .. }) => {
                    info!("{kind:?} session complete");
                    advance_pending = true;
                }
                Ok(TimerEvent::StateChanged { state }) => {
                    info!(
                        "{:?} {:?} {} ({} work sessions this cycle)",
                        state.status,
                        state.kind,
                        state.formatted_remaining(),
                        state.completed_work_sessions
                    );
                    if advance_pending && state.status == TimerStatus::Idle {
                        advance_pending = false;
                        timer.start(None).await?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Dropped {skipped} timer events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    let today = database.today_stats().await?;
    info!(
        "Today: {} work sessions, {} completed, {} focused minutes",
        today.total_sessions, today.completed_sessions, today.total_minutes
    );

    Ok(())
}
