//! Schedule gate: is enforcement active for a profile at a given local time?
//!
//! An enabled per-day override in the schedules table replaces the
//! profile's hours for that weekday. A disabled override is ignored and the
//! profile's hours apply.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::policy::{Day, HourRange, Policy, Profile, Schedules};

/// Hours in effect for `profile_id` on the weekday of `at`.
pub fn effective_range(
    profile_id: &str,
    profile: &Profile,
    schedules: &Schedules,
    at: &NaiveDateTime,
) -> HourRange {
    let day = Day::from(at.weekday());
    match schedules.get(profile_id).and_then(|days| days.get(&day)) {
        Some(schedule) if schedule.enabled => schedule.hours(),
        _ => profile.active_hours,
    }
}

/// Is enforcement active for `profile_id` at local time `at`?
pub fn is_active_now(
    profile_id: &str,
    profile: &Profile,
    schedules: &Schedules,
    at: &NaiveDateTime,
) -> bool {
    effective_range(profile_id, profile, schedules, at).contains_hour(at.hour())
}

/// Gate for the current profile of `policy`.
pub fn is_policy_active(policy: &Policy, at: &NaiveDateTime) -> bool {
    match policy.current() {
        Some(profile) => is_active_now(&policy.current_profile, profile, &policy.schedules, at),
        None => false,
    }
}
