//! Status command - shows daemon and policy state

use chrono::Local;
use focus_guardian::config::GuardianConfig;
use focus_guardian::schedule::effective_range;

use super::{domain_blocker, open_recorder, open_store, running_daemon};

pub async fn run(config: &GuardianConfig) -> anyhow::Result<()> {
    println!("🛡️ Focus Guardian Status");
    println!("─────────────────");

    match running_daemon(config) {
        Some(pid) => println!("Status: 🟢 Running (PID {})", pid),
        None => println!("Status: 🔴 Stopped"),
    }

    let store = open_store(config)?;
    let policy = store.snapshot();
    let now = Local::now().naive_local();

    match policy.current() {
        Some(profile) => {
            println!("Profile: {} ({})", profile.name, policy.current_profile);
            let range = effective_range(&policy.current_profile, profile, &policy.schedules, &now);
            if range.contains_hour(chrono::Timelike::hour(&now)) {
                println!("Enforcement: ✅ active now ({})", range);
            } else {
                println!("Enforcement: 💤 inactive (active {})", range);
            }
            println!("Blocked apps: {}", profile.blocked_apps.len());
        }
        None => println!("Profile: ⚠️ '{}' not found", policy.current_profile),
    }
    println!("Whitelist entries: {}", policy.whitelist.len());

    match domain_blocker(config).list_blocked() {
        Ok(domains) => println!("Blocked domains: {}", domains.len()),
        Err(e) => println!("Blocked domains: unavailable ({})", e),
    }

    let summary = open_recorder(config)?.summary_for_day(now.date())?;
    match summary.most_blocked {
        Some(app) => println!("Blocks today: {} (most: {})", summary.total, app),
        None => println!("Blocks today: 0"),
    }

    if running_daemon(config).is_none() {
        println!("\nRun 'focus-guardian start' to start the daemon");
    }

    Ok(())
}
