//! Hot reload of the settings document
//!
//! Edits made by other tools (or by the CLI while the daemon runs) are
//! picked up here. Our own writes are recognised by digest and ignored.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::store::PolicyStore;
use crate::error::{GuardianError, Result};

/// Keeps the OS watcher alive; dropping it stops reloads.
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl SettingsWatcher {
    /// Watch the store's directory and reload the store when its file changes.
    pub fn spawn(store: Arc<PolicyStore>) -> Result<Self> {
        let path = store.path().to_path_buf();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path.file_name().map(|n| n.to_os_string());

        let (tx, mut rx) = mpsc::channel::<()>(8);
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if ours {
                        // A full channel already has a reload pending
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => warn!("Settings watcher error: {}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| GuardianError::Persistence {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| GuardianError::Persistence {
                path: dir.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;
        info!("Watching {:?} for settings changes", path);

        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Let editors finish their write-rename sequence
                tokio::time::sleep(Duration::from_millis(200)).await;
                while rx.try_recv().is_ok() {}

                match store.reload_if_changed() {
                    Ok(true) => info!("Settings changed on disk, policy reloaded"),
                    Ok(false) => debug!("Settings event without content change"),
                    Err(e) => warn!("Ignoring settings change: {}", e),
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            path,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}
