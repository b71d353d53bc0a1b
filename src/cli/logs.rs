//! Logs command - view recent block events

use chrono::Local;
use focus_guardian::config::GuardianConfig;

use super::open_recorder;

pub async fn run(config: &GuardianConfig, tail: usize, today: bool) -> anyhow::Result<()> {
    let recorder = open_recorder(config)?;

    if today {
        let summary = recorder.summary_for_day(Local::now().date_naive())?;
        println!("📊 Today: {} block(s)", summary.total);
        println!("─────────────────────────────────────");
        for (app, count) in &summary.per_app {
            println!("  {:<32} {}", app, count);
        }
        return Ok(());
    }

    println!("📋 Recent blocks (last {} entries)", tail);
    println!("─────────────────────────────────────");

    let events = recorder.recent(tail)?;
    if events.is_empty() {
        println!("\nNo blocks recorded yet. Start the daemon to begin monitoring.");
        return Ok(());
    }

    for event in events {
        println!(
            "  {}  {}",
            event
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            event.app
        );
    }

    Ok(())
}
