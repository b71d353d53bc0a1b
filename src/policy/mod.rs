//! Policy document: profiles, whitelist and per-day schedule overrides
//!
//! The whole document is serialized as one JSON file owned by
//! [`store::PolicyStore`]. Fields this engine does not know about are kept
//! in [`Policy::extra`] so other tools sharing the file do not lose data.

pub mod store;
pub mod watch;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{GuardianError, Result};

/// Id of the profile that always exists and cannot be deleted
pub const DEFAULT_PROFILE: &str = "default";

/// Apps blocked by the built-in profiles
pub const DEFAULT_BLOCKED_APPS: &[&str] = &[
    "Steam.exe",
    "EpicGamesLauncher.exe",
    "Battle.net.exe",
    "RiotClientServices.exe",
    "FortniteClient-Win64-Shipping.exe",
    "MinecraftLauncher.exe",
    "RobloxPlayerBeta.exe",
    "LeagueClientUx.exe",
    "VALORANT.exe",
    "r5apex.exe",
    "dota2.exe",
    "cs2.exe",
    "GenshinImpact.exe",
    "osu!.exe",
    "Discord.exe",
    "Telegram.exe",
    "WhatsApp.exe",
    "TikTok.exe",
    "Instagram.exe",
    "Spotify.exe",
    "Twitch.exe",
    "Netflix.exe",
];

/// Half-open range of hours `[start, end)`; `0..24` means all day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    pub start: u8,
    pub end: u8,
}

impl HourRange {
    pub const ALWAYS: HourRange = HourRange { start: 0, end: 24 };

    /// Validated constructor.
    pub fn new(start: u8, end: u8) -> Result<Self> {
        let range = Self { start, end };
        range
            .check()
            .map_err(|reason| GuardianError::invalid("hours", reason))?;
        Ok(range)
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.start > 23 {
            return Err(format!("start hour {} is not in 0..=23", self.start));
        }
        if self.end > 24 {
            return Err(format!("end hour {} is not in 0..=24", self.end));
        }
        if self.start > self.end {
            return Err(format!(
                "start hour {} is after end hour {} (overnight ranges are not supported)",
                self.start, self.end
            ));
        }
        Ok(())
    }

    pub fn is_always(&self) -> bool {
        self.start == 0 && self.end == 24
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.is_always() {
            return true;
        }
        u32::from(self.start) <= hour && hour < u32::from(self.end)
    }
}

impl Default for HourRange {
    fn default() -> Self {
        Self::ALWAYS
    }
}

impl std::fmt::Display for HourRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:00-{:02}:00", self.start, self.end)
    }
}

/// A named bundle of blocked apps and active hours
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name
    pub name: String,
    /// Blocked-app identifiers, in match priority order
    #[serde(default)]
    pub blocked_apps: Vec<String>,
    /// Default hours during which enforcement is active
    #[serde(default, alias = "enabled_hours")]
    pub active_hours: HourRange,
}

impl Profile {
    pub fn new(name: impl Into<String>, active_hours: HourRange) -> Self {
        Self {
            name: name.into(),
            blocked_apps: Vec::new(),
            active_hours,
        }
    }

    fn with_default_apps(mut self) -> Self {
        self.blocked_apps = DEFAULT_BLOCKED_APPS.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Day of week as stored in the settings document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];
}

impl From<chrono::Weekday> for Day {
    fn from(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Mon => Day::Monday,
            chrono::Weekday::Tue => Day::Tuesday,
            chrono::Weekday::Wed => Day::Wednesday,
            chrono::Weekday::Thu => Day::Thursday,
            chrono::Weekday::Fri => Day::Friday,
            chrono::Weekday::Sat => Day::Saturday,
            chrono::Weekday::Sun => Day::Sunday,
        }
    }
}

impl FromStr for Day {
    type Err = GuardianError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "monday" | "mon" => Ok(Day::Monday),
            "tuesday" | "tue" => Ok(Day::Tuesday),
            "wednesday" | "wed" => Ok(Day::Wednesday),
            "thursday" | "thu" => Ok(Day::Thursday),
            "friday" | "fri" => Ok(Day::Friday),
            "saturday" | "sat" => Ok(Day::Saturday),
            "sunday" | "sun" => Ok(Day::Sunday),
            other => Err(GuardianError::invalid(
                "weekday",
                format!("'{}' is not a day of the week", other),
            )),
        }
    }
}

impl std::fmt::Display for Day {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Day::Monday => "monday",
            Day::Tuesday => "tuesday",
            Day::Wednesday => "wednesday",
            Day::Thursday => "thursday",
            Day::Friday => "friday",
            Day::Saturday => "saturday",
            Day::Sunday => "sunday",
        };
        f.write_str(name)
    }
}

/// Per-day override of a profile's active hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub start: u8,
    pub end: u8,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl DaySchedule {
    pub fn new(hours: HourRange) -> Self {
        Self {
            start: hours.start,
            end: hours.end,
            enabled: true,
        }
    }

    pub fn hours(&self) -> HourRange {
        HourRange {
            start: self.start,
            end: self.end,
        }
    }
}

/// profile id -> weekday -> override
pub type Schedules = BTreeMap<String, BTreeMap<Day, DaySchedule>>;

/// The full settings document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Id of the profile in effect
    pub current_profile: String,
    /// All profiles by id
    pub profiles: BTreeMap<String, Profile>,
    /// Entries exempt from enforcement regardless of profile
    #[serde(default, alias = "whitelist_apps")]
    pub whitelist: Vec<String>,
    /// Per-day overrides of profile hours
    #[serde(default)]
    pub schedules: Schedules,
    /// Fields owned by other tools, preserved on save
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Policy {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            DEFAULT_PROFILE.to_string(),
            Profile::new("Default", HourRange::ALWAYS).with_default_apps(),
        );
        profiles.insert(
            "study".to_string(),
            Profile::new("Study", HourRange { start: 8, end: 18 }).with_default_apps(),
        );
        profiles.insert(
            "work".to_string(),
            Profile::new("Work", HourRange { start: 9, end: 17 }).with_default_apps(),
        );

        Self {
            current_profile: DEFAULT_PROFILE.to_string(),
            profiles,
            whitelist: Vec::new(),
            schedules: Schedules::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Policy {
    /// Parse and validate a settings document.
    pub fn from_document(content: &str) -> std::result::Result<Self, String> {
        let policy: Policy = serde_json::from_str(content).map_err(|e| e.to_string())?;
        policy.validate()?;
        Ok(policy)
    }

    /// Serialize as the on-disk document (pretty JSON, trailing newline).
    pub fn to_document(&self) -> std::result::Result<String, serde_json::Error> {
        let mut doc = serde_json::to_string_pretty(self)?;
        doc.push('\n');
        Ok(doc)
    }

    /// Structural invariants a loaded document must satisfy.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.profiles.contains_key(DEFAULT_PROFILE) {
            return Err(format!("missing required profile '{}'", DEFAULT_PROFILE));
        }
        if !self.profiles.contains_key(&self.current_profile) {
            return Err(format!(
                "current profile '{}' does not exist",
                self.current_profile
            ));
        }
        for (id, profile) in &self.profiles {
            profile
                .active_hours
                .check()
                .map_err(|e| format!("profile '{}': {}", id, e))?;
        }
        for (id, days) in &self.schedules {
            for (day, schedule) in days {
                schedule
                    .hours()
                    .check()
                    .map_err(|e| format!("schedule '{}' {}: {}", id, day, e))?;
            }
        }
        Ok(())
    }

    pub fn current(&self) -> Option<&Profile> {
        self.profiles.get(&self.current_profile)
    }

    /// Blocked apps of the current profile.
    pub fn blocked_apps(&self) -> &[String] {
        self.current()
            .map(|p| p.blocked_apps.as_slice())
            .unwrap_or(&[])
    }

    pub fn schedule_for(&self, profile_id: &str, day: Day) -> Option<&DaySchedule> {
        self.schedules.get(profile_id).and_then(|days| days.get(&day))
    }
}

/// Case-insensitive equality used for de-duplicating list entries.
pub(crate) fn same_entry(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = Policy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.current_profile, DEFAULT_PROFILE);
        assert!(policy.current().unwrap().active_hours.is_always());
        assert_eq!(policy.profiles["study"].active_hours, HourRange { start: 8, end: 18 });
    }

    #[test]
    fn test_hour_range_validation() {
        assert!(HourRange::new(8, 18).is_ok());
        assert!(HourRange::new(0, 24).is_ok());
        assert!(HourRange::new(18, 8).is_err());
        assert!(HourRange::new(24, 24).is_err());
        assert!(HourRange::new(0, 25).is_err());
    }

    #[test]
    fn test_hour_range_half_open() {
        let range = HourRange { start: 8, end: 18 };
        assert!(!range.contains_hour(7));
        assert!(range.contains_hour(8));
        assert!(range.contains_hour(17));
        assert!(!range.contains_hour(18));
    }

    #[test]
    fn test_parses_legacy_field_names() {
        let doc = r#"{
            "current_profile": "default",
            "profiles": {
                "default": {"name": "Por Defecto", "blocked_apps": ["Steam.exe"], "enabled_hours": {"start": 0, "end": 24}}
            },
            "whitelist_apps": ["Docs"],
            "alert_sound": "alerta.mp3"
        }"#;

        let policy = Policy::from_document(doc).unwrap();
        assert_eq!(policy.whitelist, vec!["Docs".to_string()]);
        assert_eq!(policy.blocked_apps(), &["Steam.exe".to_string()]);
        assert_eq!(policy.extra["alert_sound"], "alerta.mp3");
    }

    #[test]
    fn test_rejects_missing_current_profile() {
        let doc = r#"{"current_profile": "gone", "profiles": {"default": {"name": "D"}}}"#;
        let err = Policy::from_document(doc).unwrap_err();
        assert!(err.contains("gone"));
    }

    #[test]
    fn test_schedule_keys_are_weekday_names() {
        let mut policy = Policy::default();
        policy
            .schedules
            .entry("study".to_string())
            .or_default()
            .insert(Day::Monday, DaySchedule::new(HourRange { start: 10, end: 12 }));

        let doc = policy.to_document().unwrap();
        assert!(doc.contains("\"monday\""));
        let back = Policy::from_document(&doc).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn test_day_parsing() {
        assert_eq!("Monday".parse::<Day>().unwrap(), Day::Monday);
        assert_eq!("sun".parse::<Day>().unwrap(), Day::Sunday);
        assert!("someday".parse::<Day>().is_err());
        assert_eq!(Day::from(chrono::Weekday::Wed), Day::Wednesday);
    }
}
