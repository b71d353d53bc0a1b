//! Domain commands - hosts file blocking

use focus_guardian::config::GuardianConfig;

use super::domain_blocker;

pub async fn list(config: &GuardianConfig, json: bool) -> anyhow::Result<()> {
    let snapshot = domain_blocker(config).snapshot()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("🌐 Blocked domains ({})", snapshot.domains.len());
    println!("─────────────────────────────────────");
    for domain in &snapshot.domains {
        println!("  {}", domain);
    }
    Ok(())
}

pub async fn block(config: &GuardianConfig, domain: &str) -> anyhow::Result<()> {
    if domain_blocker(config).block(domain)? {
        println!("🚫 Blocked {}", domain.trim());
    } else {
        println!("{} is already blocked", domain.trim());
    }
    Ok(())
}

pub async fn unblock(config: &GuardianConfig, domain: &str) -> anyhow::Result<()> {
    if domain_blocker(config).unblock(domain)? {
        println!("✅ Unblocked {}", domain.trim());
    } else {
        println!("{} was not blocked", domain.trim());
    }
    Ok(())
}
