//! OS-backed enumerator: sysinfo for processes, X11/EWMH for windows

use std::collections::BTreeSet;
use std::sync::Mutex;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use super::{process_matches, Enumerator};
use crate::error::{GuardianError, Result};
use crate::persist::lock_recover;
use crate::WindowInfo;

struct ProcessEntry {
    pid: u32,
    /// Process name as the OS reports it; truncated on Linux
    name: String,
    /// File name of the executable, when readable
    exe_name: Option<String>,
}

impl ProcessEntry {
    fn matches(&self, identifier: &str) -> bool {
        process_matches(&self.name, identifier)
            || self
                .exe_name
                .as_deref()
                .is_some_and(|exe| process_matches(exe, identifier))
    }
}

pub struct SystemEnumerator {
    system: Mutex<System>,
    own_pid: u32,
}

impl SystemEnumerator {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            own_pid: std::process::id(),
        }
    }

    /// Refresh the process table and collect one entry per process.
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        let mut system = lock_recover(&self.system);
        system.refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::everything());

        let processes: Vec<ProcessEntry> = system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().to_string(),
                exe_name: process
                    .exe()
                    .and_then(|exe| exe.file_name())
                    .map(|file| file.to_string_lossy().to_string()),
            })
            .collect();

        if processes.is_empty() {
            return Err(GuardianError::Enumeration(
                "process table is empty".to_string(),
            ));
        }
        Ok(processes)
    }
}

impl Default for SystemEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Enumerator for SystemEnumerator {
    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        list_windows()
    }

    fn list_process_names(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .processes()?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    fn terminate(&self, identifier: &str) -> Result<usize> {
        let targets: Vec<ProcessEntry> = self
            .processes()?
            .into_iter()
            .filter(|entry| entry.pid != self.own_pid && entry.matches(identifier))
            .collect();

        if targets.is_empty() {
            return Err(GuardianError::ProcessNotFound(identifier.to_string()));
        }

        let mut killed = 0;
        let mut denied = Vec::new();
        for ProcessEntry { pid, name, .. } in &targets {
            match signal_terminate(*pid) {
                Signalled::Sent => {
                    debug!("Sent terminate to {} (pid {})", name, pid);
                    killed += 1;
                }
                Signalled::AlreadyGone => debug!("{} (pid {}) already exited", name, pid),
                Signalled::Denied => denied.push(format!("{} (pid {})", name, pid)),
            }
        }

        if killed == 0 {
            if !denied.is_empty() {
                return Err(GuardianError::Permission(format!(
                    "cannot terminate {}",
                    denied.join(", ")
                )));
            }
            return Err(GuardianError::ProcessNotFound(identifier.to_string()));
        }

        if !denied.is_empty() {
            warn!(
                "Terminated {} process(es) for {}, but not: {}",
                killed,
                identifier,
                denied.join(", ")
            );
        }
        info!("Terminated {} process(es) matching {}", killed, identifier);
        Ok(killed)
    }
}

enum Signalled {
    Sent,
    AlreadyGone,
    Denied,
}

#[cfg(unix)]
fn signal_terminate(pid: u32) -> Signalled {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return Signalled::AlreadyGone;
    };
    // SAFETY: kill only sends a signal; it has no memory-safety preconditions
    let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
    if rc == 0 {
        return Signalled::Sent;
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::ESRCH) => Signalled::AlreadyGone,
        _ => Signalled::Denied,
    }
}

#[cfg(not(unix))]
fn signal_terminate(pid: u32) -> Signalled {
    let mut system = System::new();
    let pid = sysinfo::Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    match system.process(pid) {
        None => Signalled::AlreadyGone,
        Some(process) if process.kill() => Signalled::Sent,
        Some(_) => Signalled::Denied,
    }
}

#[cfg(target_os = "linux")]
fn list_windows() -> Result<Vec<WindowInfo>> {
    super::x11::list_windows()
}

#[cfg(not(target_os = "linux"))]
fn list_windows() -> Result<Vec<WindowInfo>> {
    Err(GuardianError::Enumeration(format!(
        "window enumeration is not available on {}",
        std::env::consts::OS
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_matches_on_executable_name() {
        let entry = ProcessEntry {
            pid: 4242,
            name: "wine64-preload".to_string(),
            exe_name: Some("RiotClientServices.exe".to_string()),
        };
        assert!(entry.matches("RiotClientServices.exe"));
        assert!(!entry.matches("Discord.exe"));

        let unreadable = ProcessEntry {
            exe_name: None,
            ..entry
        };
        assert!(!unreadable.matches("RiotClientServices.exe"));
    }

    #[test]
    fn test_lists_own_process() {
        let enumerator = SystemEnumerator::new();
        let names = enumerator.list_process_names().unwrap();
        assert!(!names.is_empty());
    }

    #[test]
    fn test_terminate_unknown_identifier_is_not_found() {
        let enumerator = SystemEnumerator::new();
        let err = enumerator
            .terminate("no-such-process-7f3a9c2e.exe")
            .unwrap_err();
        assert!(matches!(err, GuardianError::ProcessNotFound(_)));
    }
}
