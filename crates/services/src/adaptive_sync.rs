//! Adaptive knowledge sync: move detection by content identity, the
//! passive feedback loop over learned patterns, and fingerprint audits.

use crate::fingerprint::{is_current_fingerprint, Fingerprinter};
use crate::knowledge_store::{FeedbackCheck, KnowledgeStore, NewLearningEvent, INITIAL_CONFIDENCE};
use chrono::{Duration, Utc};
use shared::awareness::{
    AuditStats, Feedback, FingerprintRecord, LearnedPattern, LearningEventType, SyncStats,
    UNCATEGORIZED,
};
use shared::error::{AwarenessError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Confidence added when an automatic relocation stayed in place.
pub const REWARD_DELTA: f64 = 0.1;

/// Confidence removed when an automatic relocation was undone.
pub const PENALTY_DELTA: f64 = 0.3;

const DEFAULT_PROJECT: &str = "default";
const DISCOVERY_TAGS: [&str; 2] = ["discovered", "sync"];

/// Bounded update applied to a learned pattern by the feedback loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceUpdate {
    Reward,
    Penalty,
}

impl ConfidenceUpdate {
    pub fn delta(self) -> f64 {
        match self {
            ConfidenceUpdate::Reward => REWARD_DELTA,
            ConfidenceUpdate::Penalty => -PENALTY_DELTA,
        }
    }

    /// New confidence after this update, always within [0, 1].
    pub fn apply(self, confidence: f64) -> f64 {
        (confidence + self.delta()).clamp(0.0, 1.0)
    }

    pub fn feedback(self) -> Feedback {
        match self {
            ConfidenceUpdate::Reward => Feedback::Confirmed,
            ConfidenceUpdate::Penalty => Feedback::Rejected,
        }
    }
}

/// Roots whose first sub-folder names the category of a path.
///
/// `~/Documents/Taxes/2024/a.pdf` under root `~/Documents` is category
/// `Taxes`. A file sitting directly in a root, or outside every root, is
/// [`UNCATEGORIZED`].
#[derive(Debug, Clone, Default)]
pub struct CategoryRoots {
    roots: Vec<PathBuf>,
}

impl CategoryRoots {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots
                .into_iter()
                .map(|r| std::fs::canonicalize(&r).unwrap_or(r))
                .collect(),
        }
    }

    pub fn categorize(&self, path: &Path) -> String {
        for root in &self.roots {
            if let Ok(rest) = path.strip_prefix(root) {
                let mut parts = rest.components();
                if let (Some(first), Some(_)) = (parts.next(), parts.next()) {
                    return first.as_os_str().to_string_lossy().to_string();
                }
            }
        }
        UNCATEGORIZED.to_string()
    }
}

/// Counters from one feedback-loop pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackSummary {
    pub reinforced: usize,
    pub penalized: usize,
    /// Events left for a later pass (content changed, unreadable)
    pub deferred: usize,
}

enum FileOutcome {
    Unchanged,
    Duplicate,
    Moved,
    Indexed,
    ContentChanged,
    Unindexed,
    /// Known path with unknown content, settled after the walk
    Pending(String),
}

pub struct AdaptiveSync {
    store: Arc<KnowledgeStore>,
    fingerprinter: Fingerprinter,
    categories: CategoryRoots,
    feedback_window: Duration,
}

impl AdaptiveSync {
    pub fn new(store: Arc<KnowledgeStore>, categories: CategoryRoots) -> Self {
        Self {
            store,
            fingerprinter: Fingerprinter::default(),
            categories,
            feedback_window: Duration::days(7),
        }
    }

    pub fn with_feedback_window_days(mut self, days: u64) -> Self {
        self.feedback_window = Duration::days(days as i64);
        self
    }

    pub fn with_fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    /// Walk `roots`, detect moves by fingerprint and optionally index new
    /// files, then run the feedback loop.
    ///
    /// Moves are resolved across the whole pass before any in-place content
    /// change is recorded, so a file recreated at a moved file's old path
    /// never takes over the moved record.
    ///
    /// Per-file failures are counted in `errors`. Only a store failure in
    /// the feedback loop is returned as an error.
    pub fn sync_knowledge_base(&self, roots: &[PathBuf], index_new: bool) -> Result<SyncStats> {
        info!(roots = roots.len(), index_new, "Knowledge sync started");
        let mut stats = SyncStats::default();
        let mut pending: Vec<(PathBuf, String)> = Vec::new();

        for root in roots {
            let root = match std::fs::canonicalize(root) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %AwarenessError::unavailable(root, &e), "Skipping sync root");
                    stats.errors += 1;
                    continue;
                }
            };

            let walker = WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| !is_hidden(e));

            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, "Unreadable entry during sync");
                        stats.errors += 1;
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }

                stats.scanned += 1;
                let outcome = self.sync_file(entry.path(), index_new);
                tally(&mut stats, &mut pending, entry.path(), outcome);
            }
        }

        for (path, hash) in std::mem::take(&mut pending) {
            let outcome = self.settle_pending(&path, &hash, index_new);
            tally(&mut stats, &mut pending, &path, outcome);
        }

        let feedback = self.run_feedback_loop()?;
        stats.reinforced = feedback.reinforced;
        stats.penalized = feedback.penalized;

        info!(
            scanned = stats.scanned,
            learned_moves = stats.learned_moves,
            new_indexed = stats.new_indexed,
            errors = stats.errors,
            reinforced = stats.reinforced,
            penalized = stats.penalized,
            "Knowledge sync finished"
        );
        Ok(stats)
    }

    fn sync_file(&self, path: &Path, index_new: bool) -> Result<FileOutcome> {
        let hash = self.fingerprinter.fingerprint(path)?;

        if let Some(record) = self.store.find_by_fingerprint(&hash)? {
            if record.path == path {
                return Ok(FileOutcome::Unchanged);
            }
            if record.path.exists()
                && self.fingerprinter.fingerprint(&record.path).ok().as_deref() == Some(hash.as_str())
            {
                debug!(path = %path.display(), original = %record.path.display(), "Duplicate content, not a move");
                return Ok(FileOutcome::Duplicate);
            }
            self.learn_move(&record, path, &hash)?;
            return Ok(FileOutcome::Moved);
        }

        if self.store.find_by_path(path)?.is_some() {
            // The old content may have moved elsewhere in this pass.
            return Ok(FileOutcome::Pending(hash));
        }

        self.index_file(path, hash, index_new)
    }

    /// Runs once every move of the pass has been learned.
    fn settle_pending(&self, path: &Path, hash: &str, index_new: bool) -> Result<FileOutcome> {
        if self.store.find_by_path(path)?.is_some() {
            // Edited in place: the path keeps its record, the identity changes.
            self.store.update_fingerprint(path, hash)?;
            debug!(path = %path.display(), "Content changed in place");
            return Ok(FileOutcome::ContentChanged);
        }
        self.index_file(path, hash.to_string(), index_new)
    }

    fn index_file(&self, path: &Path, hash: String, index_new: bool) -> Result<FileOutcome> {
        if !index_new {
            return Ok(FileOutcome::Unindexed);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.store.upsert_record(&FingerprintRecord {
            path: path.to_path_buf(),
            content_hash: Some(hash),
            project: DEFAULT_PROJECT.to_string(),
            tags: DISCOVERY_TAGS.iter().map(|t| t.to_string()).collect(),
            description: format!("Discovered during sync: {}", name),
            embedding_ref: None,
        })?;
        Ok(FileOutcome::Indexed)
    }

    fn learn_move(&self, record: &FingerprintRecord, new_path: &Path, hash: &str) -> Result<()> {
        let old_category = self.categories.categorize(&record.path);
        let new_category = self.categories.categorize(new_path);

        let event_id = self.store.append_event(&NewLearningEvent {
            fingerprint: hash.to_string(),
            event_type: LearningEventType::ManualMove,
            old_path: record.path.clone(),
            new_path: new_path.to_path_buf(),
            old_category: old_category.clone(),
            new_category: new_category.clone(),
            description: Some(record.description.clone()).filter(|d| !d.is_empty()),
            embedding_ref: record.embedding_ref.clone(),
            confidence: INITIAL_CONFIDENCE,
        })?;
        self.store.relocate_record(&record.path, new_path)?;

        info!(
            event_id,
            from = %record.path.display(),
            to = %new_path.display(),
            old_category = %old_category,
            new_category = %new_category,
            "Learned manual move"
        );
        Ok(())
    }

    /// Evaluate recent auto-applied relocations once each.
    ///
    /// A file still at its applied location with the same fingerprint rewards
    /// the best manual move for that category; a file gone from there
    /// penalizes it. Changed or unreadable files are left for a later pass.
    pub fn run_feedback_loop(&self) -> Result<FeedbackSummary> {
        let since = Utc::now() - self.feedback_window;
        let mut summary = FeedbackSummary::default();

        for event in self.store.pending_auto_events(since)? {
            let update = if event.new_path.exists() {
                match self.fingerprinter.fingerprint(&event.new_path) {
                    Ok(h) if h == event.fingerprint => ConfidenceUpdate::Reward,
                    Ok(_) => {
                        debug!(event_id = event.id, "Auto-applied file changed, deferring");
                        summary.deferred += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(event_id = event.id, error = %e, "Cannot verify auto-applied file");
                        summary.deferred += 1;
                        continue;
                    }
                }
            } else {
                ConfidenceUpdate::Penalty
            };

            let target = self.store.top_manual_move(&event.new_category)?;
            let check = FeedbackCheck {
                auto_event_id: event.id,
                target_event_id: target.as_ref().map(|t| t.id),
                outcome: update.feedback(),
                delta: update.delta(),
            };

            if let Some(Some(confidence)) = self.store.apply_feedback(&check)? {
                match update {
                    ConfidenceUpdate::Reward => summary.reinforced += 1,
                    ConfidenceUpdate::Penalty => summary.penalized += 1,
                }
                info!(
                    category = %event.new_category,
                    outcome = update.feedback().as_str(),
                    confidence,
                    "Adjusted learned pattern"
                );
            }
        }

        Ok(summary)
    }

    /// Recompute missing or legacy fingerprints for records whose path still
    /// exists. A second run after convergence updates nothing.
    pub fn audit_fingerprints(&self) -> Result<AuditStats> {
        let mut stats = AuditStats::default();

        for record in self.store.all_records()? {
            stats.checked += 1;
            if is_current_fingerprint(record.content_hash.as_deref()) || !record.path.exists() {
                continue;
            }
            let result = self
                .fingerprinter
                .fingerprint(&record.path)
                .and_then(|hash| self.store.update_fingerprint(&record.path, &hash));
            match result {
                Ok(_) => stats.updated += 1,
                Err(e) => {
                    warn!(path = %record.path.display(), error = %e, "Audit could not refresh fingerprint");
                    stats.errors += 1;
                }
            }
        }

        info!(checked = stats.checked, updated = stats.updated, errors = stats.errors, "Fingerprint audit finished");
        Ok(stats)
    }

    /// Log a relocation the system performed itself, for later feedback.
    pub fn record_auto_applied(&self, from: &Path, to: &Path) -> Result<i64> {
        let hash = self.fingerprinter.fingerprint(to)?;
        self.store.append_event(&NewLearningEvent {
            fingerprint: hash,
            event_type: LearningEventType::AutoApplied,
            old_path: from.to_path_buf(),
            new_path: to.to_path_buf(),
            old_category: self.categories.categorize(from),
            new_category: self.categories.categorize(to),
            description: None,
            embedding_ref: None,
            confidence: INITIAL_CONFIDENCE,
        })
    }

    pub fn learned_patterns(&self, min_confidence: f64) -> Result<Vec<LearnedPattern>> {
        self.store.learned_patterns(min_confidence)
    }
}

fn tally(
    stats: &mut SyncStats,
    pending: &mut Vec<(PathBuf, String)>,
    path: &Path,
    outcome: Result<FileOutcome>,
) {
    match outcome {
        Ok(FileOutcome::Moved) => stats.learned_moves += 1,
        Ok(FileOutcome::Indexed) => stats.new_indexed += 1,
        Ok(FileOutcome::Pending(hash)) => pending.push((path.to_path_buf(), hash)),
        Ok(_) => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Sync skipped file");
            stats.errors += 1;
        }
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        root: PathBuf,
        sync: AdaptiveSync,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = std::fs::canonicalize(tmp.path()).unwrap();
        let store = Arc::new(KnowledgeStore::in_memory().unwrap());
        let sync = AdaptiveSync::new(store, CategoryRoots::new([root.clone()]));
        Fixture {
            _tmp: tmp,
            root,
            sync,
        }
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_confidence_update_bounds() {
        let mut c = INITIAL_CONFIDENCE;
        let pattern = [
            ConfidenceUpdate::Reward,
            ConfidenceUpdate::Reward,
            ConfidenceUpdate::Penalty,
            ConfidenceUpdate::Penalty,
            ConfidenceUpdate::Penalty,
            ConfidenceUpdate::Reward,
        ];
        for update in pattern.iter().cycle().take(60) {
            let before = c;
            c = update.apply(c);
            assert!((0.0..=1.0).contains(&c));
            match update {
                ConfidenceUpdate::Reward => {
                    assert!((c - (before + REWARD_DELTA).min(1.0)).abs() < 1e-9)
                }
                ConfidenceUpdate::Penalty => {
                    assert!((c - (before - PENALTY_DELTA).max(0.0)).abs() < 1e-9)
                }
            }
        }
        assert_eq!(ConfidenceUpdate::Reward.apply(0.95), 1.0);
        assert_eq!(ConfidenceUpdate::Penalty.apply(0.1), 0.0);
        assert!(PENALTY_DELTA > REWARD_DELTA);
    }

    #[test]
    fn test_categorize() {
        let roots = CategoryRoots::new([PathBuf::from("/home/u/Documents")]);
        assert_eq!(roots.categorize(Path::new("/home/u/Documents/Taxes/2024/a.pdf")), "Taxes");
        assert_eq!(roots.categorize(Path::new("/home/u/Documents/Taxes/a.pdf")), "Taxes");
        assert_eq!(roots.categorize(Path::new("/home/u/Documents/a.pdf")), UNCATEGORIZED);
        assert_eq!(roots.categorize(Path::new("/home/u/Desktop/a.pdf")), UNCATEGORIZED);
    }

    #[test]
    fn test_categorize_multiple_roots() {
        let roots = CategoryRoots::new([
            PathBuf::from("/home/u/Documents"),
            PathBuf::from("/srv/share"),
        ]);
        assert_eq!(roots.categorize(Path::new("/srv/share/Team/notes.md")), "Team");
    }

    #[test]
    fn test_sync_is_idempotent() {
        let f = fixture();
        write(&f.root.join("Inbox/a.txt"), "alpha");
        write(&f.root.join("Inbox/b.txt"), "beta");

        let first = f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();
        assert_eq!(first.scanned, 2);
        assert_eq!(first.new_indexed, 2);

        let second = f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();
        assert_eq!(second.learned_moves, 0);
        assert_eq!(second.new_indexed, 0);
        assert_eq!(second.errors, 0);
    }

    #[test]
    fn test_move_is_learned_and_metadata_kept() {
        let f = fixture();
        let a = f.root.join("A/report.txt");
        write(&a, "X");
        f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();

        let h1 = f.sync.store().find_by_path(&a).unwrap().unwrap().content_hash.unwrap();
        let b = f.root.join("B/report_renamed.txt");
        std::fs::create_dir_all(b.parent().unwrap()).unwrap();
        std::fs::rename(&a, &b).unwrap();

        let stats = f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();
        assert_eq!(stats.learned_moves, 1);
        assert_eq!(stats.new_indexed, 0);

        let record = f.sync.store().find_by_fingerprint(&h1).unwrap().unwrap();
        assert_eq!(record.path, b);
        assert_eq!(record.project, "default");
        assert_eq!(record.tags, vec!["discovered", "sync"]);
        assert_eq!(record.description, "Discovered during sync: report.txt");
        assert_eq!(f.sync.store().record_count().unwrap(), 1);

        let events = f.sync.store().events(Some(LearningEventType::ManualMove)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].old_category, "A");
        assert_eq!(events[0].new_category, "B");
        assert_eq!(events[0].confidence, INITIAL_CONFIDENCE);

        // Move is not learned twice
        let again = f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();
        assert_eq!(again.learned_moves, 0);
    }

    #[test]
    fn test_changed_content_before_move_is_not_a_move() {
        let f = fixture();
        let a = f.root.join("A/report.txt");
        write(&a, "X");
        f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();

        std::fs::remove_file(&a).unwrap();
        let b = f.root.join("B/report.txt");
        write(&b, "X, edited");

        let unindexed = f.sync.sync_knowledge_base(&[f.root.clone()], false).unwrap();
        assert_eq!(unindexed.learned_moves, 0);
        assert_eq!(unindexed.new_indexed, 0);
        assert!(f.sync.store().find_by_path(&b).unwrap().is_none());

        let indexed = f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();
        assert_eq!(indexed.learned_moves, 0);
        assert_eq!(indexed.new_indexed, 1);
        assert!(f.sync.store().find_by_path(&b).unwrap().is_some());
    }

    #[test]
    fn test_move_then_recreate_at_old_path() {
        let f = fixture();
        let z = f.root.join("Z/report.txt");
        write(&z, "X");
        let h1 = f.sync.fingerprinter.fingerprint(&z).unwrap();
        f.sync
            .store()
            .upsert_record(&FingerprintRecord {
                path: z.clone(),
                content_hash: Some(h1.clone()),
                project: "taxes".into(),
                tags: vec!["2024".into()],
                description: "Quarterly report".into(),
                embedding_ref: None,
            })
            .unwrap();

        // Readdir order decides which path is walked first; either must work.
        let a = f.root.join("A/report.txt");
        std::fs::create_dir_all(a.parent().unwrap()).unwrap();
        std::fs::rename(&z, &a).unwrap();
        write(&z, "Y, a fresh draft");

        let stats = f.sync.sync_knowledge_base(&[f.root.clone()], false).unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.learned_moves, 1);
        assert_eq!(stats.errors, 0);

        let moved = f.sync.store().find_by_fingerprint(&h1).unwrap().unwrap();
        assert_eq!(moved.path, a);
        assert_eq!(moved.project, "taxes");
        assert_eq!(moved.description, "Quarterly report");
        assert!(f.sync.store().find_by_path(&z).unwrap().is_none());

        let events = f.sync.store().events(Some(LearningEventType::ManualMove)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].old_path, z);
        assert_eq!(events[0].new_path, a);

        let indexed = f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();
        assert_eq!(indexed.learned_moves, 0);
        assert_eq!(indexed.new_indexed, 1);
        assert_eq!(f.sync.store().record_count().unwrap(), 2);
    }

    #[test]
    fn test_edit_in_place_keeps_record() {
        let f = fixture();
        let path = f.root.join("Notes/todo.txt");
        write(&path, "milk");
        f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();

        write(&path, "milk, eggs");
        let stats = f.sync.sync_knowledge_base(&[f.root.clone()], false).unwrap();
        assert_eq!(stats.learned_moves, 0);
        assert_eq!(stats.new_indexed, 0);

        let record = f.sync.store().find_by_path(&path).unwrap().unwrap();
        let current = f.sync.fingerprinter.fingerprint(&path).unwrap();
        assert_eq!(record.content_hash.as_deref(), Some(current.as_str()));
        assert_eq!(record.tags, vec!["discovered", "sync"]);
    }

    #[test]
    fn test_copy_is_not_a_move() {
        let f = fixture();
        let a = f.root.join("A/report.txt");
        write(&a, "same bytes");
        f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();

        write(&f.root.join("B/copy.txt"), "same bytes");
        let stats = f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();
        assert_eq!(stats.learned_moves, 0);
        assert!(f.sync.store().find_by_path(&a).unwrap().is_some());

        let again = f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();
        assert_eq!(again.learned_moves, 0);
    }

    #[test]
    fn test_unindexed_files_stay_unindexed() {
        let f = fixture();
        write(&f.root.join("tmp.txt"), "transient");
        let stats = f.sync.sync_knowledge_base(&[f.root.clone()], false).unwrap();
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.new_indexed, 0);
        assert_eq!(f.sync.store().record_count().unwrap(), 0);
    }

    #[test]
    fn test_hidden_entries_and_missing_roots() {
        let f = fixture();
        write(&f.root.join(".cache/blob"), "hidden");
        write(&f.root.join(".DS_Store"), "junk");
        write(&f.root.join("visible.txt"), "shown");

        let stats = f
            .sync
            .sync_knowledge_base(&[f.root.clone(), f.root.join("missing")], true)
            .unwrap();
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn test_feedback_rewards_relocation_that_stuck() {
        let f = fixture();
        let a = f.root.join("Inbox/a.txt");
        write(&a, "taxes 2023");
        f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();
        let moved = f.root.join("Taxes/a.txt");
        std::fs::create_dir_all(moved.parent().unwrap()).unwrap();
        std::fs::rename(&a, &moved).unwrap();
        f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();

        // The organizer later files another document into Taxes.
        let from = f.root.join("Inbox/b.txt");
        let to = f.root.join("Taxes/b.txt");
        write(&to, "taxes 2024");
        f.sync.record_auto_applied(&from, &to).unwrap();

        let stats = f.sync.sync_knowledge_base(&[f.root.clone()], false).unwrap();
        assert_eq!(stats.reinforced, 1);
        let pattern = &f.sync.learned_patterns(0.0).unwrap()[0];
        assert_eq!(pattern.category, "Taxes");
        assert!((pattern.confidence - 0.6).abs() < 1e-9);

        // Evaluated once only
        let again = f.sync.sync_knowledge_base(&[f.root.clone()], false).unwrap();
        assert_eq!(again.reinforced, 0);
    }

    #[test]
    fn test_feedback_penalizes_undone_relocation() {
        let f = fixture();
        let a = f.root.join("Inbox/a.txt");
        write(&a, "photo");
        f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();
        let moved = f.root.join("Photos/a.txt");
        std::fs::create_dir_all(moved.parent().unwrap()).unwrap();
        std::fs::rename(&a, &moved).unwrap();
        f.sync.sync_knowledge_base(&[f.root.clone()], true).unwrap();

        let to = f.root.join("Photos/b.txt");
        write(&to, "another photo");
        f.sync.record_auto_applied(&f.root.join("Inbox/b.txt"), &to).unwrap();
        std::fs::remove_file(&to).unwrap();

        let feedback = f.sync.run_feedback_loop().unwrap();
        assert_eq!(feedback.penalized, 1);
        let event = &f.sync.store().events(Some(LearningEventType::ManualMove)).unwrap()[0];
        assert!((event.confidence - 0.2).abs() < 1e-9);
        assert_eq!(event.feedback, Some(Feedback::Rejected));
    }

    #[test]
    fn test_audit_converges() {
        let f = fixture();
        let store = f.sync.store();
        for (name, legacy) in [("a.txt", Some("d41d8cd98f00b204e9800998ecf8427e")), ("b.txt", None)] {
            let path = f.root.join(name);
            write(&path, name);
            store
                .upsert_record(&FingerprintRecord {
                    path,
                    content_hash: legacy.map(String::from),
                    project: "p".into(),
                    tags: Vec::new(),
                    description: String::new(),
                    embedding_ref: None,
                })
                .unwrap();
        }
        store
            .upsert_record(&FingerprintRecord {
                path: f.root.join("gone.txt"),
                content_hash: Some("abc".into()),
                project: "p".into(),
                tags: Vec::new(),
                description: String::new(),
                embedding_ref: None,
            })
            .unwrap();

        let first = f.sync.audit_fingerprints().unwrap();
        assert_eq!(first.checked, 3);
        assert_eq!(first.updated, 2);
        assert_eq!(first.errors, 0);

        for record in store.all_records().unwrap() {
            if record.path.exists() {
                assert!(is_current_fingerprint(record.content_hash.as_deref()));
            }
        }

        let second = f.sync.audit_fingerprints().unwrap();
        assert_eq!(second.updated, 0);
    }
}
