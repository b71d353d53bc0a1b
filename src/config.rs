//! Daemon configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `~/.focus-guardian/config.yaml`, then `FOCUS_GUARDIAN_*` environment
//! variables (e.g. `FOCUS_GUARDIAN_POLL_INTERVAL_SECS=2`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::blocker::DEFAULT_LOOPBACK;
use crate::enforcer::engine::EngineSettings;

const ENV_PREFIX: &str = "FOCUS_GUARDIAN";

/// Configuration for the Focus Guardian daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    /// Directory holding settings, event log and PID file
    pub data_dir: PathBuf,
    /// Settings document; defaults to `<data_dir>/settings.json`
    pub settings_path: Option<PathBuf>,
    /// Block event log; defaults to `<data_dir>/events.db`
    pub events_db_path: Option<PathBuf>,
    /// PID file of the running daemon; defaults to `<data_dir>/guardian.pid`
    pub pid_file: Option<PathBuf>,
    /// Hosts file override; defaults to the platform location
    pub hosts_path: Option<PathBuf>,
    /// Address blocked domains are redirected to
    pub loopback_address: String,
    /// Seconds between poll cycles
    pub poll_interval_secs: u64,
    /// Seconds of warning before a blocked app is closed
    pub countdown_secs: u64,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            settings_path: None,
            events_db_path: None,
            pid_file: None,
            hosts_path: None,
            loopback_address: DEFAULT_LOOPBACK.to_string(),
            poll_interval_secs: 5,
            countdown_secs: 3,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".focus-guardian")
}

/// Location of the optional config file
pub fn default_config_file() -> PathBuf {
    default_data_dir().join("config.yaml")
}

impl GuardianConfig {
    /// Load from the default config file and environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&default_config_file())
    }

    /// Load from `file` (if it exists) and environment.
    pub fn load_from(file: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true),
            )
            .build()?;

        let cfg: GuardianConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        if self.loopback_address.trim().is_empty() {
            anyhow::bail!("loopback_address must not be empty");
        }
        Ok(())
    }

    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("settings.json"))
    }

    pub fn events_db_path(&self) -> PathBuf {
        self.events_db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("events.db"))
    }

    pub fn pid_file(&self) -> PathBuf {
        self.pid_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("guardian.pid"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_secs)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            countdown: self.countdown(),
            poll_interval: self.poll_interval(),
        }
    }
}
