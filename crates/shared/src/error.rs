//! Error taxonomy for the filesystem awareness subsystem.

use std::path::PathBuf;

/// Failures surfaced by the awareness services.
///
/// Bulk passes (sync, audit, index refresh) catch these per item and report
/// counts instead of propagating them. Only infrastructure failures reach
/// callers of the lookup operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AwarenessError {
    #[error("Resource unavailable: {path} ({reason})")]
    ResourceUnavailable { path: PathBuf, reason: String },

    #[error("Failed to fingerprint {path}: {reason}")]
    HashComputationFailed { path: PathBuf, reason: String },

    #[error("External search failed: {reason}")]
    ExternalSearchFailed { reason: String },

    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),
}

impl AwarenessError {
    pub fn unavailable(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        AwarenessError::ResourceUnavailable {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn hash_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AwarenessError::HashComputationFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn search_failed(reason: impl Into<String>) -> Self {
        AwarenessError::ExternalSearchFailed {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwarenessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_path() {
        let err = AwarenessError::unavailable(
            "/home/user/Desktop",
            &std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/home/user/Desktop"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_search_failure_message() {
        let err = AwarenessError::search_failed("timed out after 10s");
        assert_eq!(err.to_string(), "External search failed: timed out after 10s");
    }
}
