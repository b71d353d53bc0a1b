//! Durable policy store
//!
//! Owns the settings document. Every mutation is applied to a copy of the
//! in-memory policy, written atomically, and only then swapped in, so a
//! failed save leaves both memory and disk as they were.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::{same_entry, Day, DaySchedule, HourRange, Policy, Profile, DEFAULT_PROFILE};
use crate::error::{GuardianError, Result};
use crate::persist::{digest, file_lock, lock_recover, AtomicWriter};

/// Result of reading the settings document
#[derive(Debug)]
pub struct Loaded {
    pub policy: Policy,
    /// Set when the file existed but was unusable and defaults were used
    pub degraded: Option<GuardianError>,
}

/// Read the settings document at `path`.
///
/// A missing file yields the default policy. A corrupt file also yields the
/// default policy, with the reason reported in [`Loaded::degraded`]; the
/// file itself is left untouched until the next save.
pub fn load(path: &Path) -> Result<Loaded> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Loaded {
                policy: Policy::default(),
                degraded: None,
            });
        }
        Err(e) => return Err(GuardianError::from_io(path, e)),
    };

    match Policy::from_document(&content) {
        Ok(policy) => Ok(Loaded {
            policy,
            degraded: None,
        }),
        Err(reason) => Ok(Loaded {
            policy: Policy::default(),
            degraded: Some(GuardianError::CorruptStore {
                path: path.to_path_buf(),
                reason,
            }),
        }),
    }
}

/// Write `policy` to `path` atomically.
pub fn save(path: &Path, policy: &Policy) -> Result<()> {
    save_with(&AtomicWriter::new(), path, policy).map(|_| ())
}

fn save_with(writer: &AtomicWriter, path: &Path, policy: &Policy) -> Result<String> {
    let doc = policy.to_document().map_err(|e| GuardianError::Persistence {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| GuardianError::from_io(path, e))?;
    }

    let lock = file_lock(path);
    let _guard = lock_recover(&lock);
    writer.write(path, doc.as_bytes())?;
    Ok(digest(doc.as_bytes()))
}

struct State {
    policy: Policy,
    /// Digest of the document as last read or written by us
    digest: Option<String>,
}

/// The single owner of the settings document
pub struct PolicyStore {
    path: PathBuf,
    writer: AtomicWriter,
    state: Mutex<State>,
    load_warning: Option<String>,
}

impl PolicyStore {
    /// Open the store at `path`, falling back to defaults when the document
    /// is missing or corrupt.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(path.into(), AtomicWriter::new())
    }

    fn open_with(path: PathBuf, writer: AtomicWriter) -> Result<Self> {
        let loaded = load(&path)?;
        let load_warning = loaded.degraded.map(|e| {
            warn!("{}; running with default policy", e);
            e.to_string()
        });
        let digest = std::fs::read(&path).ok().map(|bytes| digest(&bytes));

        info!(
            "Policy loaded from {:?} (profile: {})",
            path, loaded.policy.current_profile
        );

        Ok(Self {
            path,
            writer,
            state: Mutex::new(State {
                policy: loaded.policy,
                digest,
            }),
            load_warning,
        })
    }

    #[cfg(test)]
    fn open_failing(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(path.into(), AtomicWriter::failing_before_rename())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reason the document was replaced by defaults at open, if it was.
    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    /// A consistent copy of the current policy.
    pub fn snapshot(&self) -> Policy {
        lock_recover(&self.state).policy.clone()
    }

    /// Apply `op` to a copy of the policy; persist and swap in if it changed.
    fn update<T>(&self, op: impl FnOnce(&mut Policy) -> Result<T>) -> Result<T> {
        let mut state = lock_recover(&self.state);
        let mut next = state.policy.clone();
        let out = op(&mut next)?;

        if next != state.policy {
            let digest = save_with(&self.writer, &self.path, &next)?;
            state.policy = next;
            state.digest = Some(digest);
        }
        Ok(out)
    }

    /// Add `app` to the current profile's blocked list. Returns false if it
    /// was already present (case-insensitive).
    pub fn add_blocked_app(&self, app: &str) -> Result<bool> {
        let app = non_blank("app", app)?;
        self.update(|policy| {
            let profile = current_mut(policy)?;
            if profile.blocked_apps.iter().any(|a| same_entry(a, &app)) {
                return Ok(false);
            }
            profile.blocked_apps.push(app.clone());
            info!("Blocked app added: {}", app);
            Ok(true)
        })
    }

    /// Remove `app` from the current profile's blocked list.
    pub fn remove_blocked_app(&self, app: &str) -> Result<bool> {
        let app = non_blank("app", app)?;
        self.update(|policy| {
            let profile = current_mut(policy)?;
            let before = profile.blocked_apps.len();
            profile.blocked_apps.retain(|a| !same_entry(a, &app));
            Ok(profile.blocked_apps.len() != before)
        })
    }

    pub fn add_whitelist_entry(&self, entry: &str) -> Result<bool> {
        let entry = non_blank("whitelist entry", entry)?;
        self.update(|policy| {
            if policy.whitelist.iter().any(|w| same_entry(w, &entry)) {
                return Ok(false);
            }
            policy.whitelist.push(entry.clone());
            Ok(true)
        })
    }

    pub fn remove_whitelist_entry(&self, entry: &str) -> Result<bool> {
        let entry = non_blank("whitelist entry", entry)?;
        self.update(|policy| {
            let before = policy.whitelist.len();
            policy.whitelist.retain(|w| !same_entry(w, &entry));
            Ok(policy.whitelist.len() != before)
        })
    }

    /// Set the override for `day` on `profile_id`.
    pub fn set_schedule(&self, profile_id: &str, day: Day, start: u8, end: u8) -> Result<()> {
        let hours = HourRange::new(start, end)?;
        self.update(|policy| {
            require_profile(policy, profile_id)?;
            policy
                .schedules
                .entry(profile_id.to_string())
                .or_default()
                .insert(day, DaySchedule::new(hours));
            Ok(())
        })
    }

    /// Keep the override for `day` but stop applying it; the profile's
    /// own hours govern that day until it is set again.
    pub fn disable_schedule(&self, profile_id: &str, day: Day) -> Result<()> {
        self.update(|policy| {
            let fallback = require_profile(policy, profile_id)?.active_hours;
            policy
                .schedules
                .entry(profile_id.to_string())
                .or_default()
                .entry(day)
                .or_insert_with(|| DaySchedule::new(fallback))
                .enabled = false;
            Ok(())
        })
    }

    /// Drop the override for `day`, returning to the profile's hours.
    pub fn clear_schedule(&self, profile_id: &str, day: Day) -> Result<bool> {
        self.update(|policy| {
            require_profile(policy, profile_id)?;
            let Some(days) = policy.schedules.get_mut(profile_id) else {
                return Ok(false);
            };
            let removed = days.remove(&day).is_some();
            if days.is_empty() {
                policy.schedules.remove(profile_id);
            }
            Ok(removed)
        })
    }

    pub fn switch_profile(&self, profile_id: &str) -> Result<()> {
        self.update(|policy| {
            require_profile(policy, profile_id)?;
            if policy.current_profile != profile_id {
                info!("Switched profile: {} -> {}", policy.current_profile, profile_id);
                policy.current_profile = profile_id.to_string();
            }
            Ok(())
        })
    }

    /// Create a profile. The id is derived from `id` (lowercase, spaces to
    /// underscores). Returns false if a profile with that id exists.
    pub fn create_profile(&self, id: &str, name: &str, hours: HourRange) -> Result<bool> {
        let id = profile_id(id)?;
        let name = if name.trim().is_empty() {
            id.clone()
        } else {
            name.trim().to_string()
        };
        self.update(|policy| {
            if policy.profiles.contains_key(&id) {
                return Ok(false);
            }
            policy.profiles.insert(id.clone(), Profile::new(name, hours));
            info!("Profile created: {}", id);
            Ok(true)
        })
    }

    /// Delete a profile and its schedules. Deleting the current profile
    /// switches to the default one.
    pub fn delete_profile(&self, profile_id: &str) -> Result<bool> {
        if profile_id == DEFAULT_PROFILE {
            return Err(GuardianError::ProtectedProfile(profile_id.to_string()));
        }
        self.update(|policy| {
            if policy.profiles.remove(profile_id).is_none() {
                return Ok(false);
            }
            policy.schedules.remove(profile_id);
            if policy.current_profile == profile_id {
                policy.current_profile = DEFAULT_PROFILE.to_string();
            }
            info!("Profile deleted: {}", profile_id);
            Ok(true)
        })
    }

    pub fn set_active_hours(&self, profile_id: &str, start: u8, end: u8) -> Result<()> {
        let hours = HourRange::new(start, end)?;
        self.update(|policy| {
            let profile = policy
                .profiles
                .get_mut(profile_id)
                .ok_or_else(|| GuardianError::UnknownProfile(profile_id.to_string()))?;
            profile.active_hours = hours;
            Ok(())
        })
    }

    /// Re-read the document from disk, replacing the in-memory policy.
    ///
    /// A corrupt document is reported and the current policy kept.
    pub fn reload(&self) -> Result<()> {
        let mut state = lock_recover(&self.state);
        if let Some(bytes) = self.read_document()? {
            self.apply_external(&mut state, &bytes)?;
        }
        Ok(())
    }

    /// Reload only if the file differs from what we last read or wrote.
    pub fn reload_if_changed(&self) -> Result<bool> {
        // Read under the lock so no update lands between read and swap
        let mut state = lock_recover(&self.state);
        let Some(bytes) = self.read_document()? else {
            return Ok(false);
        };
        if state.digest.as_deref() == Some(digest(&bytes).as_str()) {
            return Ok(false);
        }
        self.apply_external(&mut state, &bytes)?;
        Ok(true)
    }

    fn read_document(&self) -> Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GuardianError::from_io(&self.path, e)),
        }
    }

    fn apply_external(&self, state: &mut State, bytes: &[u8]) -> Result<()> {
        let content = String::from_utf8_lossy(bytes);
        let policy =
            Policy::from_document(&content).map_err(|reason| GuardianError::CorruptStore {
                path: self.path.clone(),
                reason,
            })?;

        state.policy = policy;
        state.digest = Some(digest(bytes));
        info!("Policy reloaded from {:?}", self.path);
        Ok(())
    }
}

fn non_blank(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GuardianError::invalid(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn profile_id(raw: &str) -> Result<String> {
    let id = non_blank("profile id", raw)?
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    Ok(id)
}

fn require_profile<'a>(policy: &'a Policy, profile_id: &str) -> Result<&'a Profile> {
    policy
        .profiles
        .get(profile_id)
        .ok_or_else(|| GuardianError::UnknownProfile(profile_id.to_string()))
}

fn current_mut(policy: &mut Policy) -> Result<&mut Profile> {
    let id = policy.current_profile.clone();
    policy
        .profiles
        .get_mut(&id)
        .ok_or(GuardianError::UnknownProfile(id))
}
