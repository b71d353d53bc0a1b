//! Start command - runs the enforcement daemon

use focus_guardian::config::GuardianConfig;
use focus_guardian::enforcer::engine::{Engine, IntervalTicker};
use focus_guardian::enforcer::EngineEvent;
use focus_guardian::enumerator::{Enumerator, SystemEnumerator};
use focus_guardian::policy::watch::SettingsWatcher;
use focus_guardian::schedule::is_policy_active;
use std::fs;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{open_recorder, open_store, running_daemon};

pub async fn run(config: &GuardianConfig) -> anyhow::Result<()> {
    // Check if already running
    if let Some(pid) = running_daemon(config) {
        println!("⚠️  Focus Guardian is already running (PID {})", pid);
        return Ok(());
    }

    fs::create_dir_all(&config.data_dir)?;
    let pid_file = config.pid_file();
    fs::write(&pid_file, std::process::id().to_string())?;

    // Remove the PID file however we exit
    let _guard = scopeguard::guard(pid_file, |path| {
        let _ = fs::remove_file(path);
    });

    info!(
        "🛡️ Focus Guardian daemon starting (PID: {})...",
        std::process::id()
    );

    let store = Arc::new(open_store(config)?);
    let recorder = Arc::new(open_recorder(config)?);
    let enumerator: Arc<dyn Enumerator> = Arc::new(SystemEnumerator::new());

    let policy = store.snapshot();
    info!(
        "📋 Profile '{}' with {} blocked app(s), {} whitelist entr(ies)",
        policy.current_profile,
        policy.blocked_apps().len(),
        policy.whitelist.len()
    );
    if !is_policy_active(&policy, &chrono::Local::now().naive_local()) {
        info!("Outside active hours; enforcement resumes when the schedule opens");
    }

    // Keep the watcher alive for the lifetime of the daemon
    let _watcher = match SettingsWatcher::spawn(Arc::clone(&store)) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("⚠️ Settings hot reload disabled: {}", e);
            None
        }
    };

    let mut engine = Engine::new(store, enumerator, recorder, config.engine_settings());

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => present(&event),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} engine events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    println!("🛡️  Focus Guardian is watching. Press Ctrl+C to stop.");
    let mut ticker = IntervalTicker::new(config.poll_interval());
    engine.run(&mut ticker, cancel).await;

    println!("👋 Focus Guardian stopped");
    Ok(())
}

/// Countdown output for the foreground terminal
fn present(event: &EngineEvent) {
    match event {
        EngineEvent::Warning {
            app,
            remaining_secs,
            ..
        } => println!("⏳ {} will be closed in {}s", app, remaining_secs),
        EngineEvent::Cancelled { app, reason, .. } => {
            println!("✅ {} countdown cancelled ({})", app, reason)
        }
        EngineEvent::Terminated { app, .. } => println!("🛑 {} closed. Stay focused!", app),
        EngineEvent::TerminationFailed { app, error, .. } => {
            println!("❌ Could not close {}: {}", app, error)
        }
        EngineEvent::Advisory { .. } | EngineEvent::CycleSkipped { .. } => {}
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
