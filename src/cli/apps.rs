//! Apps and whitelist commands

use focus_guardian::config::GuardianConfig;

use super::open_store;

pub async fn list(config: &GuardianConfig) -> anyhow::Result<()> {
    let policy = open_store(config)?.snapshot();
    println!(
        "🚫 Blocked apps for profile '{}' ({})",
        policy.current_profile,
        policy.blocked_apps().len()
    );
    println!("─────────────────────────────────────");
    for app in policy.blocked_apps() {
        println!("  {}", app);
    }
    Ok(())
}

pub async fn add(config: &GuardianConfig, app: &str) -> anyhow::Result<()> {
    if open_store(config)?.add_blocked_app(app)? {
        println!("✅ Blocking {}", app.trim());
    } else {
        println!("{} is already blocked", app.trim());
    }
    Ok(())
}

pub async fn remove(config: &GuardianConfig, app: &str) -> anyhow::Result<()> {
    if open_store(config)?.remove_blocked_app(app)? {
        println!("✅ {} is no longer blocked", app.trim());
    } else {
        println!("{} was not in the blocked list", app.trim());
    }
    Ok(())
}

pub async fn whitelist_list(config: &GuardianConfig) -> anyhow::Result<()> {
    let policy = open_store(config)?.snapshot();
    println!("✅ Whitelist ({} entries)", policy.whitelist.len());
    println!("─────────────────────────────────────");
    for entry in &policy.whitelist {
        println!("  {}", entry);
    }
    Ok(())
}

pub async fn whitelist_add(config: &GuardianConfig, entry: &str) -> anyhow::Result<()> {
    if open_store(config)?.add_whitelist_entry(entry)? {
        println!("✅ Whitelisted {}", entry.trim());
    } else {
        println!("{} is already whitelisted", entry.trim());
    }
    Ok(())
}

pub async fn whitelist_remove(config: &GuardianConfig, entry: &str) -> anyhow::Result<()> {
    if open_store(config)?.remove_whitelist_entry(entry)? {
        println!("✅ Removed {} from the whitelist", entry.trim());
    } else {
        println!("{} was not whitelisted", entry.trim());
    }
    Ok(())
}
