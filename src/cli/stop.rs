//! Stop command - signals the running daemon

use focus_guardian::config::GuardianConfig;
use std::time::Duration;
use tracing::{debug, info};

use super::{is_alive, running_daemon};

pub async fn run(config: &GuardianConfig) -> anyhow::Result<()> {
    let Some(pid) = running_daemon(config) else {
        println!("Focus Guardian is not running");
        return Ok(());
    };

    info!("Stopping Focus Guardian daemon (PID {})...", pid);
    terminate(pid)?;

    // Give pending countdowns a moment to be discarded
    for _ in 0..50 {
        if !is_alive(pid) {
            println!("🛑 Focus Guardian stopped");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    debug!("PID {} still alive after 5s", pid);
    anyhow::bail!("daemon (PID {}) did not exit within 5 seconds", pid)
}

#[cfg(unix)]
fn terminate(pid: i32) -> anyhow::Result<()> {
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        let err = std::io::Error::last_os_error();
        anyhow::bail!("failed to signal PID {}: {}", pid, err);
    }
    Ok(())
}

#[cfg(not(unix))]
fn terminate(pid: i32) -> anyhow::Result<()> {
    let pid = sysinfo::Pid::from_u32(pid as u32);
    let mut system = sysinfo::System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]));
    match system.process(pid) {
        Some(process) if process.kill() => Ok(()),
        Some(_) => anyhow::bail!("failed to stop PID {}", pid),
        None => Ok(()),
    }
}
