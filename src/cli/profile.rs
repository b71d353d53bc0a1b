//! Profile and schedule commands

use focus_guardian::config::GuardianConfig;
use focus_guardian::policy::{Day, HourRange};

use super::open_store;

pub async fn list(config: &GuardianConfig) -> anyhow::Result<()> {
    let policy = open_store(config)?.snapshot();
    println!("👤 Profiles");
    println!("─────────────────────────────────────");
    for (id, profile) in &policy.profiles {
        let marker = if *id == policy.current_profile { "▶" } else { " " };
        println!(
            "{} {:<12} {:<20} {}  {} app(s)",
            marker,
            id,
            profile.name,
            profile.active_hours,
            profile.blocked_apps.len()
        );
    }
    Ok(())
}

pub async fn switch(config: &GuardianConfig, id: &str) -> anyhow::Result<()> {
    open_store(config)?.switch_profile(id)?;
    println!("✅ Current profile: {}", id);
    Ok(())
}

pub async fn create(
    config: &GuardianConfig,
    id: &str,
    name: Option<&str>,
    start: u8,
    end: u8,
) -> anyhow::Result<()> {
    let hours = HourRange::new(start, end)?;
    if open_store(config)?.create_profile(id, name.unwrap_or(id), hours)? {
        println!("✅ Created profile {} ({})", id, hours);
    } else {
        println!("Profile {} already exists", id);
    }
    Ok(())
}

pub async fn delete(config: &GuardianConfig, id: &str) -> anyhow::Result<()> {
    if open_store(config)?.delete_profile(id)? {
        println!("🗑️  Deleted profile {}", id);
    } else {
        println!("No profile named {}", id);
    }
    Ok(())
}

pub async fn hours(config: &GuardianConfig, id: &str, start: u8, end: u8) -> anyhow::Result<()> {
    open_store(config)?.set_active_hours(id, start, end)?;
    println!("✅ {} is active {:02}:00-{:02}:00", id, start, end);
    Ok(())
}

pub async fn schedule_show(config: &GuardianConfig, profile: Option<&str>) -> anyhow::Result<()> {
    let policy = open_store(config)?.snapshot();
    println!("📅 Schedule overrides");
    println!("─────────────────────────────────────");

    let mut shown = 0;
    for (id, days) in &policy.schedules {
        if profile.is_some_and(|p| p != id.as_str()) {
            continue;
        }
        for (day, schedule) in days {
            let hours = if schedule.enabled {
                schedule.hours().to_string()
            } else {
                format!("{} (disabled)", schedule.hours())
            };
            println!("  {:<12} {:<10} {}", id, day, hours);
            shown += 1;
        }
    }
    if shown == 0 {
        println!("  none; profile hours apply every day");
    }
    Ok(())
}

pub async fn schedule_set(
    config: &GuardianConfig,
    profile: &str,
    day: &str,
    start: u8,
    end: u8,
) -> anyhow::Result<()> {
    let day: Day = day.parse()?;
    open_store(config)?.set_schedule(profile, day, start, end)?;
    println!("✅ {} on {}: {:02}:00-{:02}:00", profile, day, start, end);
    Ok(())
}

pub async fn schedule_disable(config: &GuardianConfig, profile: &str, day: &str) -> anyhow::Result<()> {
    let day: Day = day.parse()?;
    open_store(config)?.disable_schedule(profile, day)?;
    println!("✅ {} on {} follows the profile hours (override kept, disabled)", profile, day);
    Ok(())
}

pub async fn schedule_clear(config: &GuardianConfig, profile: &str, day: &str) -> anyhow::Result<()> {
    let day: Day = day.parse()?;
    if open_store(config)?.clear_schedule(profile, day)? {
        println!("✅ {} on {} follows the profile hours again", profile, day);
    } else {
        println!("No override for {} on {}", profile, day);
    }
    Ok(())
}
