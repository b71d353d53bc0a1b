//! Atomic file replacement and per-file write locks
//!
//! Every persistent file the engine owns (settings document, hosts file) is
//! rewritten by writing a sibling temporary file and renaming it over the
//! original. A crash mid-write leaves either the old or the new content,
//! never a truncated file.

use crate::error::{GuardianError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, warn};

static FILE_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// The process-wide write lock for `path`.
///
/// Two handles for the same file (even through different relative paths)
/// share one mutex, so only one writer at a time reaches the rename step.
pub fn file_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = lock_key(path);
    let registry = FILE_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut locks = lock_recover(registry);
    Arc::clone(locks.entry(key).or_default())
}

fn lock_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    // File does not exist yet: canonicalize the directory instead
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Hex SHA-256 of a document, used to tell our own writes from external edits.
pub fn digest(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    format!("{:x}", hasher.finalize())
}

/// Writes files via temp-file-then-rename
#[derive(Debug, Clone, Default)]
pub struct AtomicWriter {
    #[cfg(test)]
    fail_before_rename: bool,
}

impl AtomicWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A writer that stops after the temp file is written, before the rename.
    #[cfg(test)]
    pub(crate) fn failing_before_rename() -> Self {
        Self {
            fail_before_rename: true,
        }
    }

    /// Replace `path` with `contents`.
    ///
    /// The caller is expected to hold [`file_lock`] for `path`. Permissions of
    /// an existing file are carried over to the replacement.
    pub fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".guardian-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| GuardianError::from_io(path, e))?;

        tmp.write_all(contents)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| GuardianError::from_io(path, e))?;

        if let Ok(meta) = std::fs::metadata(path) {
            if let Err(e) = tmp.as_file().set_permissions(meta.permissions()) {
                debug!("Could not copy permissions of {:?}: {}", path, e);
            }
        }

        self.before_rename(path)?;

        tmp.persist(path)
            .map_err(|e| GuardianError::from_io(path, e.error))?;

        debug!("Atomically replaced {:?} ({} bytes)", path, contents.len());
        Ok(())
    }

    #[cfg(test)]
    fn before_rename(&self, path: &Path) -> Result<()> {
        if self.fail_before_rename {
            return Err(GuardianError::Persistence {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "simulated failure before rename",
                ),
            });
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn before_rename(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, "old").unwrap();

        AtomicWriter::new().write(&path, b"new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_failure_before_rename_keeps_original_and_cleans_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, "old").unwrap();

        let err = AtomicWriter::failing_before_rename()
            .write(&path, b"new")
            .unwrap_err();

        assert!(matches!(err, GuardianError::Persistence { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temp file should be removed on failure");
    }

    #[test]
    fn test_file_lock_is_shared_per_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hosts");
        let a = file_lock(&path);
        let b = file_lock(&dir.path().join(".").join("hosts"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(digest(b"abc"), digest(b"abc"));
        assert_ne!(digest(b"abc"), digest(b"abd"));
    }
}
