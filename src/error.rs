//! Error taxonomy shared by every engine component

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GuardianError>;

#[derive(Debug, Error)]
pub enum GuardianError {
    /// The settings document exists but could not be parsed or validated.
    #[error("settings document {path:?} is corrupt: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    /// A write or read of persistent state failed; nothing was changed.
    #[error("failed to persist {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    /// The OS query for windows or processes failed.
    #[error("enumeration failed: {0}")]
    Enumeration(String),

    #[error("no running process matches '{0}'")]
    ProcessNotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("profile '{0}' is protected and cannot be deleted")]
    ProtectedProfile(String),
}

impl GuardianError {
    /// Map an I/O failure on `path` into the taxonomy.
    ///
    /// `PermissionDenied` becomes [`GuardianError::Permission`], everything
    /// else is a [`GuardianError::Persistence`].
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            GuardianError::Permission(format!("{}: {}", path.display(), source))
        } else {
            GuardianError::Persistence {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        GuardianError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Caller-input errors are never worth retrying.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            GuardianError::UnknownProfile(_)
                | GuardianError::InvalidInput { .. }
                | GuardianError::ProtectedProfile(_)
        )
    }
}
