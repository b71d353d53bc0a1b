//! Classification of window titles and process names against a profile
//!
//! Pure functions, no I/O. Blocked identifiers match by case-insensitive
//! substring containment in either direction after stripping an executable
//! suffix, so `Steam.exe` matches both the window "Steam" and the process
//! `steam`. Whitelist entries only match when the entry occurs in the label.

use crate::policy::Policy;
use crate::Verdict;

/// Suffixes removed from blocked identifiers before matching
pub const EXECUTABLE_SUFFIXES: &[&str] = &[".exe", ".app"];

/// Lowercased identifier without a trailing executable suffix.
pub fn strip_executable_suffix(identifier: &str) -> String {
    let lower = identifier.trim().to_lowercase();
    for suffix in EXECUTABLE_SUFFIXES {
        if let Some(stem) = lower.strip_suffix(suffix) {
            return stem.to_string();
        }
    }
    lower
}

fn contains_either_way(needle: &str, label: &str) -> bool {
    if needle.is_empty() || label.is_empty() {
        return false;
    }
    label.contains(needle) || needle.contains(label)
}

/// Does `label` (a window title or process name) match blocked `identifier`?
pub fn matches_identifier(label: &str, identifier: &str) -> bool {
    let needle = strip_executable_suffix(identifier);
    contains_either_way(&needle, &label.trim().to_lowercase())
}

fn contains_entry(entry: &str, label: &str) -> bool {
    !entry.is_empty() && label.contains(entry)
}

/// Does `label` contain any whitelist entry?
pub fn is_whitelisted(label: &str, whitelist: &[String]) -> bool {
    let label = label.trim().to_lowercase();
    whitelist
        .iter()
        .any(|entry| contains_entry(&entry.trim().to_lowercase(), &label))
}

/// Classify `label` against a blocked list and a whitelist.
///
/// Whitelist wins; among blocked entries the first in list order wins.
pub fn classify(label: &str, blocked: &[String], whitelist: &[String]) -> Verdict {
    Matcher::new(blocked, whitelist).classify(label)
}

/// Pre-normalised matcher for one policy snapshot
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    /// (original identifier, normalised needle)
    blocked: Vec<(String, String)>,
    whitelist: Vec<String>,
}

impl Matcher {
    pub fn new(blocked: &[String], whitelist: &[String]) -> Self {
        Self {
            blocked: blocked
                .iter()
                .map(|app| (app.clone(), strip_executable_suffix(app)))
                .filter(|(_, needle)| !needle.is_empty())
                .collect(),
            whitelist: whitelist
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Matcher for the current profile of `policy`.
    pub fn from_policy(policy: &Policy) -> Self {
        Self::new(policy.blocked_apps(), &policy.whitelist)
    }

    pub fn classify(&self, label: &str) -> Verdict {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return Verdict::Clear;
        }

        if self
            .whitelist
            .iter()
            .any(|entry| contains_entry(entry, &label))
        {
            return Verdict::Whitelisted;
        }

        self.blocked
            .iter()
            .find(|(_, needle)| contains_either_way(needle, &label))
            .map(|(app, _)| Verdict::Blocked(app.clone()))
            .unwrap_or(Verdict::Clear)
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}
