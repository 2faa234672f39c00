//! Atomic JSON files: cache snapshots and the settings file.

use serde::de::DeserializeOwned;
use serde::Serialize;
use crate::error::{AwarenessError, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Serialize `value` next to `path` and rename it into place, so readers
/// see either the previous file or the new one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let fail = |e: &dyn std::fmt::Display| {
        AwarenessError::PersistenceFailed(format!("{}: {}", path.display(), e))
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| fail(&e))?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| fail(&e))?;

    let tmp_path = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp_path).map_err(|e| fail(&e))?;
        f.write_all(&bytes).map_err(|e| fail(&e))?;
        f.sync_all().map_err(|e| fail(&e))?;
    }
    std::fs::rename(&tmp_path, path).map_err(|e| fail(&e))?;
    Ok(())
}

/// Read a snapshot, treating a missing or corrupt file as absent.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read snapshot");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt snapshot");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::awareness::QuickIndexSnapshot;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("quick_index.json");
        let snapshot = QuickIndexSnapshot {
            last_updated: Some(chrono::Utc::now()),
            ..Default::default()
        };
        write_json_atomic(&path, &snapshot).unwrap();

        let loaded: QuickIndexSnapshot = read_json(&path).unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupt_file_reads_as_absent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("system_profile.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(read_json::<QuickIndexSnapshot>(&path).is_none());
        assert!(read_json::<QuickIndexSnapshot>(&tmp.path().join("missing.json")).is_none());
    }
}
