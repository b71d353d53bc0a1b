//! Focus Guardian Library
//!
//! Core components of the enforcement daemon: policy storage, window and
//! process enumeration, matching, schedule gating, the countdown-and-terminate
//! engine, hosts-file domain blocking and the block event log.

pub mod blocker;
pub mod config;
pub mod enforcer;
pub mod enumerator;
pub mod error;
pub mod matcher;
pub mod persist;
pub mod policy;
pub mod recorder;
pub mod schedule;

pub use error::{GuardianError, Result};

use serde::{Deserialize, Serialize};

/// A top-level window as seen by one enumeration pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    /// Native window handle, when the platform exposes one
    pub id: Option<u64>,
    /// Window title
    pub title: String,
    /// Window is minimized/hidden
    pub is_minimized: bool,
    /// Window currently has input focus
    pub is_focused: bool,
}

impl WindowInfo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            is_minimized: false,
            is_focused: false,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn focused(mut self) -> Self {
        self.is_focused = true;
        self
    }

    pub fn minimized(mut self) -> Self {
        self.is_minimized = true;
        self
    }

    /// Minimized and untitled windows never take part in enforcement.
    pub fn is_candidate(&self) -> bool {
        !self.is_minimized && !self.title.trim().is_empty()
    }
}

/// Outcome of classifying a window title or process name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "app", rename_all = "snake_case")]
pub enum Verdict {
    /// Nothing in the current profile matches
    Clear,
    /// A whitelist entry matches; wins over any block match
    Whitelisted,
    /// Matched the given blocked-app identifier
    Blocked(String),
}

impl Verdict {
    pub fn blocked_app(&self) -> Option<&str> {
        match self {
            Verdict::Blocked(app) => Some(app),
            Verdict::Clear | Verdict::Whitelisted => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Clear => write!(f, "clear"),
            Verdict::Whitelisted => write!(f, "whitelisted"),
            Verdict::Blocked(app) => write!(f, "blocked ({})", app),
        }
    }
}
