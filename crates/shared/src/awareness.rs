//! Data model for the filesystem awareness layers.
//!
//! Layer 1 is the [`SystemProfile`], layer 2 the [`QuickIndexSnapshot`],
//! layer 3 produces ephemeral [`FileEntry`] results. The fingerprint store
//! persists [`FingerprintRecord`]s and the [`LearningEvent`] ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Label used when a path does not sit inside a configured category root.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Source label for entries coming from the recent-files list.
pub const RECENT_SOURCE: &str = "Recent";

/// Source label for entries found by a live deep search.
pub const DEEP_SEARCH_SOURCE: &str = "Search";

/// An installed application discovered during an inventory scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEntry {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// A file or folder observed on disk by the quick index or a deep search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Size in bytes, files only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    /// Folder label the entry was found under ("Desktop", "Recent", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl FileEntry {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// Persistent identity record for an indexed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub path: PathBuf,
    /// Content fingerprint; `None` for rows written before fingerprinting
    pub content_hash: Option<String>,
    pub project: String,
    pub tags: Vec<String>,
    pub description: String,
    pub embedding_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningEventType {
    /// The user relocated a file themselves
    ManualMove,
    /// The system relocated a file based on a learned category
    AutoApplied,
}

impl LearningEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningEventType::ManualMove => "manual_move",
            LearningEventType::AutoApplied => "auto_applied",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual_move" => Some(LearningEventType::ManualMove),
            "auto_applied" => Some(LearningEventType::AutoApplied),
            _ => None,
        }
    }
}

/// Outcome of checking whether an automatic relocation stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Confirmed,
    Rejected,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::Confirmed => "confirmed",
            Feedback::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "confirmed" => Some(Feedback::Confirmed),
            "rejected" => Some(Feedback::Rejected),
            _ => None,
        }
    }
}

/// Entry in the append-only learning ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEvent {
    pub id: i64,
    pub fingerprint: String,
    pub event_type: LearningEventType,
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub old_category: String,
    pub new_category: String,
    pub description: Option<String>,
    pub embedding_ref: Option<String>,
    /// Trust in this pattern, always within [0, 1]
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    /// Most recent feedback applied to this event
    pub feedback: Option<Feedback>,
}

/// Best learned destination for a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub category: String,
    pub event_id: i64,
    pub confidence: f64,
    pub example_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub os: String,
    pub arch: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub cpu_cores: Option<usize>,
    #[serde(default)]
    pub total_ram_gb: Option<f32>,
}

/// Root volume usage, as reported by the OS (human-readable units).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub total: Option<String>,
    pub used: Option<String>,
    pub free: Option<String>,
    pub capacity: Option<String>,
}

impl StorageInfo {
    pub fn is_empty(&self) -> bool {
        self.total.is_none() && self.used.is_none() && self.free.is_none()
    }
}

/// Layer 1: relatively static facts about the machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemProfile {
    #[serde(default)]
    pub device: Option<DeviceInfo>,
    #[serde(default)]
    pub storage: StorageInfo,
    #[serde(default)]
    pub apps: Vec<AppEntry>,
    #[serde(default)]
    pub apps_last_scan: Option<DateTime<Utc>>,
    #[serde(default)]
    pub key_folders: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Cached listing of one configured folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderListing {
    pub label: String,
    pub path: PathBuf,
    pub entries: Vec<FileEntry>,
}

/// Layer 2: cached folder listings plus recently modified files.
///
/// Always replaced wholesale; never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuickIndexSnapshot {
    #[serde(default)]
    pub folders: Vec<FolderListing>,
    #[serde(default)]
    pub recent_files: Vec<FileEntry>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl QuickIndexSnapshot {
    pub fn folder(&self, label: &str) -> Option<&FolderListing> {
        self.folders.iter().find(|f| f.label == label)
    }

    pub fn entry_count(&self) -> usize {
        self.folders.iter().map(|f| f.entries.len()).sum()
    }
}

/// Counters returned by a knowledge-base sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub scanned: usize,
    pub learned_moves: usize,
    pub new_indexed: usize,
    pub errors: usize,
    /// Learned patterns rewarded by the feedback loop
    pub reinforced: usize,
    /// Learned patterns penalized by the feedback loop
    pub penalized: usize,
}

/// Counters returned by a fingerprint audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub checked: usize,
    pub updated: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub last_updated: Option<DateTime<Utc>>,
    pub folder_counts: BTreeMap<String, usize>,
    pub recent_files: usize,
}

/// Combined status report exposed to the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub storage: StorageInfo,
    pub device: Option<DeviceInfo>,
    pub index: IndexSummary,
}

/// Human-readable byte size with one decimal ("1.5 MB").
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 * 1024), "3.0 TB");
    }

    #[test]
    fn test_event_type_labels_round_trip() {
        for kind in [LearningEventType::ManualMove, LearningEventType::AutoApplied] {
            assert_eq!(LearningEventType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(LearningEventType::parse("deleted"), None);
    }

    #[test]
    fn test_snapshot_defaults_load_from_empty_json() {
        let snapshot: QuickIndexSnapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.last_updated.is_none());
        assert_eq!(snapshot.entry_count(), 0);
    }

    #[test]
    fn test_entry_kind_serializes_lowercase() {
        let json = serde_json::to_string(&EntryKind::Folder).unwrap();
        assert_eq!(json, "\"folder\"");
    }
}
