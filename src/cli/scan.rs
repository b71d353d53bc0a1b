//! Scan command - one-shot classification without enforcing

use chrono::Local;
use focus_guardian::config::GuardianConfig;
use focus_guardian::enumerator::{process_matches, Enumerator, SystemEnumerator};
use focus_guardian::matcher::{is_whitelisted, Matcher};
use focus_guardian::schedule::is_policy_active;
use focus_guardian::Verdict;

use super::open_store;

pub async fn run(config: &GuardianConfig) -> anyhow::Result<()> {
    let policy = open_store(config)?.snapshot();
    let matcher = Matcher::from_policy(&policy);
    let active = is_policy_active(&policy, &Local::now().naive_local());

    println!(
        "🔍 Scan with profile '{}' (enforcement {})",
        policy.current_profile,
        if active { "active" } else { "inactive" }
    );
    println!("─────────────────────────────────────");

    let enumerator = SystemEnumerator::new();
    let (windows, processes) = tokio::task::spawn_blocking(move || {
        (enumerator.list_windows(), enumerator.list_process_names())
    })
    .await?;

    match windows {
        Ok(windows) => {
            for window in windows.iter().filter(|w| w.is_candidate()) {
                let verdict = matcher.classify(&window.title);
                let marker = match (&verdict, window.is_focused) {
                    (Verdict::Blocked(_), true) => "🛑",
                    (Verdict::Blocked(_), false) => "⚠️ ",
                    (Verdict::Whitelisted, _) => "✅",
                    (Verdict::Clear, _) => "  ",
                };
                println!("{} {:<48} {}", marker, truncate(&window.title, 48), verdict);
            }
        }
        Err(e) => println!("Windows: unavailable ({})", e),
    }

    let processes = processes?;
    let mut flagged = 0;
    for name in &processes {
        if is_whitelisted(name, &policy.whitelist) {
            continue;
        }
        if let Some(app) = policy
            .blocked_apps()
            .iter()
            .find(|app| process_matches(name, app))
        {
            println!("⚙️  process {:<38} blocked ({})", name, app);
            flagged += 1;
        }
    }
    println!(
        "\n{} process(es) checked, {} match the blocked list",
        processes.len(),
        flagged
    );

    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
