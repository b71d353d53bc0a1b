//! Window and process enumeration
//!
//! The engine only talks to the [`Enumerator`] trait. The real OS backend is
//! [`system::SystemEnumerator`]; tests substitute a scripted fake.

pub mod system;
#[cfg(target_os = "linux")]
mod x11;

use std::collections::BTreeSet;

use crate::error::Result;
use crate::WindowInfo;

pub use system::SystemEnumerator;

/// Read-only view of the desktop plus the one side effect the engine needs
///
/// Implementations block on OS calls; the engine drives them from
/// `spawn_blocking`.
pub trait Enumerator: Send + Sync {
    /// Top-level windows, including minimized and untitled ones.
    fn list_windows(&self) -> Result<Vec<WindowInfo>>;

    /// Names of all running processes.
    fn list_process_names(&self) -> Result<BTreeSet<String>>;

    /// Terminate every process whose name matches `identifier`.
    ///
    /// Returns the number of processes signalled. Fails with
    /// `ProcessNotFound` when nothing matched and `Permission` when matches
    /// existed but none could be signalled.
    fn terminate(&self, identifier: &str) -> Result<usize>;

    /// Backend name for logs
    fn name(&self) -> &str {
        "system"
    }
}

/// Length Linux truncates process names (`comm`) to
pub const COMM_LEN: usize = 15;

/// Does process `name` belong to blocked `identifier`?
///
/// One-directional: the stripped identifier must occur in the process name,
/// so a short process name can never pull in unrelated identifiers. A name
/// of exactly [`COMM_LEN`] characters may be a truncated `comm`, so it also
/// matches when the identifier starts with it.
pub fn process_matches(name: &str, identifier: &str) -> bool {
    let needle = crate::matcher::strip_executable_suffix(identifier);
    if needle.is_empty() {
        return false;
    }
    let name = name.trim().to_lowercase();
    if name.contains(&needle) {
        return true;
    }
    name.chars().count() == COMM_LEN && identifier.trim().to_lowercase().starts_with(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_match_is_one_directional() {
        assert!(process_matches("steam", "Steam.exe"));
        assert!(process_matches("steamwebhelper", "Steam.exe"));
        assert!(!process_matches("sh", "Steam.exe"));
        assert!(!process_matches("anything", ".exe"));
    }

    #[test]
    fn test_truncated_comm_matches_long_identifier() {
        assert!(process_matches("RiotClientServi", "RiotClientServices.exe"));
        assert!(process_matches(
            "FortniteClient-",
            "FortniteClient-Win64-Shipping.exe"
        ));
        // Only a full-length comm can be a truncation
        assert!(!process_matches("RiotClient", "RiotClientServices.exe"));
        assert!(!process_matches("RiotClientOther", "RiotClientServices.exe"));
    }
}
