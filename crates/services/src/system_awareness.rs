//! The filesystem awareness facade.
//!
//! Owns the three cache layers, the knowledge sync engine and the
//! background work that keeps them fresh. Lookups answer from the latest
//! snapshot and never wait on a background pass.

use crate::adaptive_sync::{AdaptiveSync, CategoryRoots};
use crate::deep_search::{DeepSearch, SearchBackend};
use crate::file_watcher::{ChangeCallback, FileWatcher, WatcherConfig};
use crate::knowledge_store::KnowledgeStore;
use crate::quick_index::QuickIndexer;
use crate::system_profiler::{HostProbe, SystemProbe, SystemProfiler};
use parking_lot::Mutex;
use shared::awareness::{
    AuditStats, FileEntry, IndexSummary, LearnedPattern, QuickIndexSnapshot, SyncStats,
    SystemProfile, SystemStatus, DEEP_SEARCH_SOURCE,
};
use shared::error::{AwarenessError, Result};
use shared::settings::AwarenessSettings;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strsim::jaro_winkler;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct SystemAwareness {
    settings: AwarenessSettings,
    profiler: Arc<SystemProfiler>,
    quick_index: Arc<QuickIndexer>,
    deep_search: Arc<DeepSearch>,
    sync: Arc<AdaptiveSync>,
    watcher: Mutex<Option<FileWatcher>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
}

impl SystemAwareness {
    /// Build against the running machine. Fails only if the knowledge store
    /// cannot be opened.
    pub fn new(settings: AwarenessSettings) -> Result<Self> {
        Self::with_parts(settings, Box::new(HostProbe), SearchBackend::detect())
    }

    pub fn with_parts(
        settings: AwarenessSettings,
        probe: Box<dyn SystemProbe>,
        backend: SearchBackend,
    ) -> Result<Self> {
        let store = Arc::new(KnowledgeStore::open(&settings.knowledge_db_path())?);
        let sync = AdaptiveSync::new(store, CategoryRoots::new(settings.category_roots.clone()))
            .with_feedback_window_days(settings.feedback_window_days);

        let mut walk_roots: Vec<PathBuf> = settings
            .indexed_folders
            .iter()
            .map(|f| f.path.clone())
            .collect();
        for root in &settings.sync_roots {
            if !walk_roots.contains(root) {
                walk_roots.push(root.clone());
            }
        }
        let deep_search = Arc::new(DeepSearch::new(
            backend,
            walk_roots,
            Duration::from_secs(settings.deep_search_timeout_secs),
        ));

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            profiler: Arc::new(SystemProfiler::with_probe(probe, &settings)),
            quick_index: Arc::new(QuickIndexer::new(&settings, deep_search.clone())),
            deep_search,
            sync: Arc::new(sync),
            watcher: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            shutdown,
            started: AtomicBool::new(false),
            settings,
        })
    }

    pub fn settings(&self) -> &AwarenessSettings {
        &self.settings
    }

    /// Warm-start from disk, then schedule background refreshes and start
    /// the file watcher. Returns without waiting for any refresh.
    pub fn start(&self) -> anyhow::Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let had_profile = self.profiler.load();
        let had_index = self.quick_index.load();
        info!(had_profile, had_index, "System awareness starting");

        let profiler = self.profiler.clone();
        self.track(tokio::spawn(async move {
            if let Err(e) = tokio::task::spawn_blocking(move || profiler.refresh_profile()).await {
                warn!(error = %e, "Profile refresh task failed");
            }
        }));

        if self.quick_index.snapshot().last_updated.is_none() {
            let index = self.quick_index.clone();
            self.track(tokio::spawn(async move {
                index.refresh().await;
            }));
        }

        // Watcher signals coalesce: a full channel already means "refresh pending".
        let (signal_tx, mut signal_rx) = mpsc::channel::<()>(1);
        let callback: ChangeCallback = Arc::new(move || {
            let _ = signal_tx.try_send(());
        });
        let watcher = FileWatcher::start(
            WatcherConfig {
                folders: self.settings.watched_folders.clone(),
                mode: self.settings.watch_mode,
                poll_interval: Duration::from_secs(self.settings.poll_interval_secs),
                debounce: Duration::from_secs(self.settings.debounce_secs),
            },
            callback,
        )?;
        *self.watcher.lock() = Some(watcher);

        let index = self.quick_index.clone();
        let mut shutdown = self.shutdown.subscribe();
        self.track(tokio::spawn(async move {
            loop {
                tokio::select! {
                    signal = signal_rx.recv() => {
                        if signal.is_none() {
                            break;
                        }
                        debug!("Change detected, refreshing quick index");
                        index.refresh().await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));

        Ok(())
    }

    /// Run a sync followed by an audit every `interval` until shutdown.
    pub fn start_periodic_sync(&self, interval: Duration) {
        let sync = self.sync.clone();
        let roots = self.settings.sync_roots.clone();
        let index_new = self.settings.index_new_files;
        let mut shutdown = self.shutdown.subscribe();

        self.track(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }
                let sync = sync.clone();
                let roots = roots.clone();
                let pass = tokio::task::spawn_blocking(move || {
                    sync.sync_knowledge_base(&roots, index_new)?;
                    sync.audit_fingerprints()
                })
                .await;
                match pass {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(error = %e, "Periodic knowledge sync failed"),
                    Err(e) => warn!(error = %e, "Periodic knowledge sync task failed"),
                }
            }
        }));
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Stop the watcher and wait for every background task to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);

        if let Some(watcher) = self.watcher.lock().take() {
            // Joining the watcher thread blocks.
            let _ = tokio::task::spawn_blocking(move || drop(watcher)).await;
        }

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("System awareness stopped");
    }

    /// Quick-index matches ranked by name similarity; deep search when the
    /// index has nothing.
    pub async fn find_file(&self, query: &str) -> Vec<FileEntry> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let hits = self.quick_index.lookup(query);
        if !hits.is_empty() {
            return rank_by_name(query, hits);
        }

        debug!(query, "Quick index miss, falling back to deep search");
        let outcome = self
            .deep_search
            .search(query, self.settings.deep_search_limit, None)
            .await;
        outcome
            .results
            .into_iter()
            .map(|e| e.with_source(DEEP_SEARCH_SOURCE))
            .collect()
    }

    /// Uncached search limited to `scope`.
    pub async fn search_in(&self, query: &str, scope: &Path) -> Vec<FileEntry> {
        self.deep_search
            .search(query, self.settings.deep_search_limit, Some(scope))
            .await
            .results
            .into_iter()
            .map(|e| e.with_source(DEEP_SEARCH_SOURCE))
            .collect()
    }

    pub fn resolve_app_path(&self, name: &str) -> Option<PathBuf> {
        self.profiler.resolve_app_path(name)
    }

    pub fn recent_files(&self) -> Vec<FileEntry> {
        let mut recent = self.quick_index.recent_files();
        recent.truncate(self.settings.recent_limit);
        recent
    }

    pub fn system_status(&self) -> SystemStatus {
        let profile = self.profiler.profile();
        let snapshot = self.quick_index.snapshot();
        SystemStatus {
            storage: profile.storage.clone(),
            device: profile.device.clone(),
            index: IndexSummary {
                last_updated: snapshot.last_updated,
                folder_counts: snapshot
                    .folders
                    .iter()
                    .map(|f| (f.label.clone(), f.entries.len()))
                    .collect(),
                recent_files: snapshot.recent_files.len(),
            },
        }
    }

    pub fn profile(&self) -> Arc<SystemProfile> {
        self.profiler.profile()
    }

    /// Refresh the quick index and wait for it.
    pub async fn refresh_index(&self) -> Arc<QuickIndexSnapshot> {
        self.quick_index.refresh().await
    }

    /// Refresh the profile and wait for it.
    pub async fn refresh_profile(&self) -> Arc<SystemProfile> {
        let profiler = self.profiler.clone();
        match tokio::task::spawn_blocking(move || profiler.refresh_profile()).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Profile refresh task failed");
                self.profiler.profile()
            }
        }
    }

    /// Sync the given roots, or the configured sync roots when empty.
    pub async fn sync_knowledge_base(&self, roots: &[PathBuf], index_new: bool) -> Result<SyncStats> {
        let roots = if roots.is_empty() {
            self.settings.sync_roots.clone()
        } else {
            roots.to_vec()
        };
        self.run_blocking(move |sync| sync.sync_knowledge_base(&roots, index_new))
            .await
    }

    pub async fn audit_fingerprints(&self) -> Result<AuditStats> {
        self.run_blocking(|sync| sync.audit_fingerprints()).await
    }

    pub async fn record_auto_applied(&self, from: &Path, to: &Path) -> Result<i64> {
        let (from, to) = (from.to_path_buf(), to.to_path_buf());
        self.run_blocking(move |sync| sync.record_auto_applied(&from, &to))
            .await
    }

    pub async fn learned_patterns(&self, min_confidence: f64) -> Result<Vec<LearnedPattern>> {
        self.run_blocking(move |sync| sync.learned_patterns(min_confidence))
            .await
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&AdaptiveSync) -> Result<T> + Send + 'static,
    {
        let sync = self.sync.clone();
        tokio::task::spawn_blocking(move || f(&sync))
            .await
            .map_err(|e| AwarenessError::PersistenceFailed(format!("knowledge task failed: {}", e)))?
    }
}

/// Stable sort by Jaro-Winkler similarity of the lowercase name to the query.
fn rank_by_name(query: &str, entries: Vec<FileEntry>) -> Vec<FileEntry> {
    let query = query.to_lowercase();
    let mut scored: Vec<(f64, FileEntry)> = entries
        .into_iter()
        .map(|e| (jaro_winkler(&query, &e.name.to_lowercase()), e))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(_, e)| e).collect()
}
