//! Countdown-and-terminate enforcement
//!
//! An [`EnforcementCase`] tracks one focused blocked window from detection
//! through its warning countdown to termination or cancellation. Cases are
//! owned by the [`engine::Engine`] poll loop and never shared.

pub mod engine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::WindowInfo;

/// Warning period before a blocked app is terminated
pub const DEFAULT_COUNTDOWN: Duration = Duration::from_secs(3);

/// Identity of the window a case follows
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WindowIdentity {
    Handle(u64),
    /// Platforms without stable handles fall back to the title
    Title(String),
}

impl WindowIdentity {
    pub fn of(window: &WindowInfo) -> Self {
        match window.id {
            Some(id) => WindowIdentity::Handle(id),
            None => WindowIdentity::Title(window.title.clone()),
        }
    }
}

/// Cases are keyed by matched app plus window, so repeated observations of
/// the same window continue one case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseKey {
    pub app: String,
    pub window: WindowIdentity,
}

impl CaseKey {
    pub fn new(app: &str, window: &WindowInfo) -> Self {
        Self {
            app: app.to_lowercase(),
            window: WindowIdentity::of(window),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    Detected,
    Warning { remaining: Duration },
    Terminated,
    Cancelled,
}

/// Result of advancing a case by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseTick {
    Countdown(Duration),
    Expired,
}

#[derive(Debug, Clone)]
pub struct EnforcementCase {
    pub id: Uuid,
    pub key: CaseKey,
    /// Blocked identifier as written in the profile
    pub app: String,
    pub title: String,
    pub detected_at: DateTime<Utc>,
    pub state: CaseState,
    last_tick: Instant,
}

impl EnforcementCase {
    pub fn detect(app: &str, window: &WindowInfo, now: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: CaseKey::new(app, window),
            app: app.to_string(),
            title: window.title.clone(),
            detected_at: Utc::now(),
            state: CaseState::Detected,
            last_tick: now,
        }
    }

    /// `Detected -> Warning`; the countdown starts at `now`.
    pub fn start_warning(&mut self, countdown: Duration, now: Instant) {
        if self.state == CaseState::Detected {
            self.state = CaseState::Warning {
                remaining: countdown,
            };
            self.last_tick = now;
        }
    }

    /// Subtract the wall-clock time since the previous tick.
    pub fn tick(&mut self, now: Instant) -> CaseTick {
        let CaseState::Warning { remaining } = self.state else {
            return CaseTick::Expired;
        };
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;

        let remaining = remaining.saturating_sub(elapsed);
        self.state = CaseState::Warning { remaining };
        if remaining.is_zero() {
            CaseTick::Expired
        } else {
            CaseTick::Countdown(remaining)
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self.state {
            CaseState::Warning { remaining } => Some(remaining),
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        if !self.is_finished() {
            self.state = CaseState::Cancelled;
        }
    }

    pub fn mark_terminated(&mut self) {
        self.state = CaseState::Terminated;
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, CaseState::Terminated | CaseState::Cancelled)
    }
}

/// Why a case ended without termination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    WindowClosed,
    LostFocus,
    NoLongerBlocked,
    ScheduleInactive,
    ProcessGone,
    Stopped,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            CancelReason::WindowClosed => "window closed",
            CancelReason::LostFocus => "lost focus",
            CancelReason::NoLongerBlocked => "no longer blocked",
            CancelReason::ScheduleInactive => "outside active hours",
            CancelReason::ProcessGone => "process already gone",
            CancelReason::Stopped => "monitoring stopped",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisorySource {
    /// Blocked window open but not focused
    Window,
    /// Blocked process running without a visible window
    Process,
}

/// Observable output of the engine, for the presentation layer and logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Warning {
        case_id: Uuid,
        app: String,
        title: String,
        remaining_secs: u64,
    },
    Cancelled {
        case_id: Uuid,
        app: String,
        reason: CancelReason,
    },
    Terminated {
        case_id: Uuid,
        app: String,
        processes: usize,
        at: DateTime<Utc>,
    },
    TerminationFailed {
        case_id: Uuid,
        app: String,
        error: String,
    },
    Advisory {
        app: String,
        label: String,
        source: AdvisorySource,
    },
    CycleSkipped {
        reason: String,
    },
}

impl EngineEvent {
    pub(crate) fn warning(case: &EnforcementCase, remaining: Duration) -> Self {
        EngineEvent::Warning {
            case_id: case.id,
            app: case.app.clone(),
            title: case.title.clone(),
            // Round up so "0" is never shown while the app still runs
            remaining_secs: remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0),
        }
    }

    pub(crate) fn cancelled(case: &EnforcementCase, reason: CancelReason) -> Self {
        EngineEvent::Cancelled {
            case_id: case.id,
            app: case.app.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(now: Instant) -> EnforcementCase {
        let window = WindowInfo::new("Game - Level 3").with_id(7).focused();
        let mut case = EnforcementCase::detect("game.exe", &window, now);
        case.start_warning(DEFAULT_COUNTDOWN, now);
        case
    }

    #[test]
    fn test_countdown_expires_on_third_second() {
        let t0 = Instant::now();
        let mut case = case(t0);
        assert_eq!(case.remaining(), Some(Duration::from_secs(3)));

        assert_eq!(case.tick(t0 + Duration::from_secs(1)), CaseTick::Countdown(Duration::from_secs(2)));
        assert_eq!(case.tick(t0 + Duration::from_secs(2)), CaseTick::Countdown(Duration::from_secs(1)));
        assert_eq!(case.tick(t0 + Duration::from_secs(3)), CaseTick::Expired);
    }

    #[test]
    fn test_tick_uses_elapsed_time_not_tick_count() {
        let t0 = Instant::now();
        let mut case = case(t0);
        assert_eq!(
            case.tick(t0 + Duration::from_millis(500)),
            CaseTick::Countdown(Duration::from_millis(2500))
        );
        assert_eq!(case.tick(t0 + Duration::from_secs(4)), CaseTick::Expired);
    }

    #[test]
    fn test_cancel_is_terminal() {
        let t0 = Instant::now();
        let mut case = case(t0);
        case.cancel();
        assert_eq!(case.state, CaseState::Cancelled);
        case.mark_terminated();
        case.cancel();
        assert_eq!(case.state, CaseState::Terminated);
        assert!(case.is_finished());
    }

    #[test]
    fn test_case_key_prefers_handle() {
        let a = WindowInfo::new("Game").with_id(1);
        let b = WindowInfo::new("Game - menu").with_id(1);
        assert_eq!(CaseKey::new("Game.exe", &a), CaseKey::new("game.exe", &b));
        let untitled = WindowInfo::new("Game");
        assert_eq!(
            CaseKey::new("game.exe", &untitled).window,
            WindowIdentity::Title("Game".to_string())
        );
    }

    #[test]
    fn test_warning_event_rounds_up() {
        let t0 = Instant::now();
        let case = case(t0);
        match EngineEvent::warning(&case, Duration::from_millis(1200)) {
            EngineEvent::Warning { remaining_secs, .. } => assert_eq!(remaining_secs, 2),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
