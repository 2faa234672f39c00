//! Layer 2: cached listings of key folders plus recently modified files.
//!
//! The snapshot is rebuilt wholesale and swapped in under a write lock held
//! only for the pointer swap, so lookups never see a half-built index.

use crate::deep_search::{file_entry, is_noise_name, DeepSearch};
use chrono::Utc;
use parking_lot::RwLock;
use shared::awareness::{FileEntry, FolderListing, QuickIndexSnapshot, RECENT_SOURCE};
use shared::error::{AwarenessError, Result};
use shared::settings::{AwarenessSettings, IndexedFolder};
use shared::snapshot_file::{read_json, write_json_atomic};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct QuickIndexer {
    folders: Vec<IndexedFolder>,
    max_items_per_folder: usize,
    recent_window: Duration,
    recent_limit: usize,
    snapshot_path: PathBuf,
    deep: Arc<DeepSearch>,
    snapshot: RwLock<Arc<QuickIndexSnapshot>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl QuickIndexer {
    pub fn new(settings: &AwarenessSettings, deep: Arc<DeepSearch>) -> Self {
        Self {
            folders: settings.indexed_folders.clone(),
            max_items_per_folder: settings.max_items_per_folder,
            recent_window: Duration::from_secs(settings.recent_window_hours * 3600),
            recent_limit: settings.recent_limit,
            snapshot_path: settings.quick_index_path(),
            deep,
            snapshot: RwLock::new(Arc::new(QuickIndexSnapshot::default())),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Warm start from the persisted snapshot. Returns whether one was found.
    pub fn load(&self) -> bool {
        match read_json::<QuickIndexSnapshot>(&self.snapshot_path) {
            Some(snapshot) => {
                debug!(entries = snapshot.entry_count(), "Loaded quick index");
                *self.snapshot.write() = Arc::new(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Arc<QuickIndexSnapshot> {
        self.snapshot.read().clone()
    }

    /// Rebuild the index, publish it and persist it.
    ///
    /// Concurrent calls are serialized; lookups keep answering from the
    /// previous snapshot meanwhile.
    pub async fn refresh(&self) -> Arc<QuickIndexSnapshot> {
        let _guard = self.refresh_lock.lock().await;

        let folders = self.folders.clone();
        let max_items = self.max_items_per_folder;
        let listings = tokio::task::spawn_blocking(move || {
            folders
                .iter()
                .map(|folder| {
                    let entries = list_folder(folder, max_items).unwrap_or_else(|e| {
                        warn!(folder = %folder.label, error = %e, "Folder not indexed");
                        Vec::new()
                    });
                    FolderListing {
                        label: folder.label.clone(),
                        path: folder.path.clone(),
                        entries,
                    }
                })
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Folder listing task failed");
            Vec::new()
        });

        let recent = self
            .deep
            .recently_modified(self.recent_window, self.recent_limit)
            .await;
        if let Some(e) = &recent.error {
            warn!(error = %e, "Recent files unavailable");
        }
        let recent_files = recent
            .results
            .into_iter()
            .map(|e| e.with_source(RECENT_SOURCE))
            .collect();

        let snapshot = Arc::new(QuickIndexSnapshot {
            folders: listings,
            recent_files,
            last_updated: Some(Utc::now()),
        });
        *self.snapshot.write() = snapshot.clone();
        info!(
            entries = snapshot.entry_count(),
            recent = snapshot.recent_files.len(),
            "Quick index refreshed"
        );

        if let Err(e) = write_json_atomic(&self.snapshot_path, snapshot.as_ref()) {
            warn!(error = %e, "Failed to save quick index");
        }
        snapshot
    }

    /// Case-insensitive substring match over cached names, in folder order
    /// and then the recent list. A path is reported once, under its folder.
    pub fn lookup(&self, query: &str) -> Vec<FileEntry> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let snapshot = self.snapshot();
        let mut seen = HashSet::new();
        snapshot
            .folders
            .iter()
            .flat_map(|f| f.entries.iter())
            .chain(snapshot.recent_files.iter())
            .filter(|e| e.name.to_lowercase().contains(&query))
            .filter(|e| seen.insert(e.path.clone()))
            .cloned()
            .collect()
    }

    pub fn recent_files(&self) -> Vec<FileEntry> {
        self.snapshot().recent_files.clone()
    }
}

/// Entry names that are never worth listing.
fn is_listing_noise(name: &str) -> bool {
    is_noise_name(name) || name.ends_with(".app")
}

/// The `max_items` most recently modified entries of one folder, after noise
/// filtering. Not recursive.
fn list_folder(folder: &IndexedFolder, max_items: usize) -> Result<Vec<FileEntry>> {
    let read = std::fs::read_dir(&folder.path)
        .map_err(|e| AwarenessError::unavailable(&folder.path, &e))?;

    let mut entries: Vec<FileEntry> = read
        .filter_map(|e| e.ok())
        .filter(|e| !is_listing_noise(&e.file_name().to_string_lossy()))
        .filter_map(|e| {
            let meta = e.metadata().ok()?;
            Some(file_entry(e.path(), &meta).with_source(folder.label.clone()))
        })
        .collect();

    entries.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    entries.truncate(max_items);
    Ok(entries)
}
