//! CLI command handlers

pub mod apps;
pub mod domains;
pub mod logs;
pub mod profile;
pub mod scan;
pub mod start;
pub mod status;
pub mod stop;

use focus_guardian::blocker::DomainBlocker;
use focus_guardian::config::GuardianConfig;
use focus_guardian::policy::store::PolicyStore;
use focus_guardian::recorder::EventRecorder;
use std::path::Path;

pub fn open_store(config: &GuardianConfig) -> anyhow::Result<PolicyStore> {
    let store = PolicyStore::open(config.settings_path())?;
    if let Some(warning) = store.load_warning() {
        println!("⚠️  {}", warning);
        println!("   Using default settings until the next change is saved.");
    }
    Ok(store)
}

pub fn open_recorder(config: &GuardianConfig) -> anyhow::Result<EventRecorder> {
    Ok(EventRecorder::open(&config.events_db_path())?)
}

pub fn domain_blocker(config: &GuardianConfig) -> DomainBlocker {
    DomainBlocker::from_override(config.hosts_path.clone(), &config.loopback_address)
}

/// PID recorded by a running daemon, if any
pub fn read_pid(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path)
        .ok()?
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
}

#[cfg(unix)]
pub fn is_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
pub fn is_alive(pid: i32) -> bool {
    let pid = sysinfo::Pid::from_u32(pid as u32);
    let mut system = sysinfo::System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]));
    system.process(pid).is_some()
}

/// PID of the running daemon, if the PID file points at a live process
pub fn running_daemon(config: &GuardianConfig) -> Option<i32> {
    read_pid(&config.pid_file()).filter(|pid| is_alive(*pid))
}
