//! Persistent fingerprint index and learning-event ledger.
//!
//! Backed by SQLite. Every write is a single-row insert or update keyed by
//! path, content hash or event id, so no multi-row transactions are used.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use shared::awareness::{
    Feedback, FingerprintRecord, LearnedPattern, LearningEvent, LearningEventType,
};
use shared::error::{AwarenessError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Confidence assigned to a freshly learned move.
pub const INITIAL_CONFIDENCE: f64 = 0.5;

const EVENT_COLUMNS: &str = "e.id, e.file_hash, e.event_type, e.old_path, e.new_path,
    e.old_category, e.new_category, e.description, e.embedding_ref, e.confidence, e.timestamp,
    (SELECT c.outcome FROM feedback_checks c
        WHERE c.target_event_id = e.id OR c.auto_event_id = e.id
        ORDER BY c.id DESC LIMIT 1)";

/// A learning event about to be appended to the ledger.
#[derive(Debug, Clone)]
pub struct NewLearningEvent {
    pub fingerprint: String,
    pub event_type: LearningEventType,
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub old_category: String,
    pub new_category: String,
    pub description: Option<String>,
    pub embedding_ref: Option<String>,
    pub confidence: f64,
}

/// Result of evaluating one auto-applied event.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackCheck {
    pub auto_event_id: i64,
    /// Manual-move event whose confidence is adjusted, if one exists
    pub target_event_id: Option<i64>,
    pub outcome: Feedback,
    pub delta: f64,
}

pub struct KnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

fn db_err(e: rusqlite::Error) -> AwarenessError {
    AwarenessError::PersistenceFailed(e.to_string())
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

impl KnowledgeStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AwarenessError::unavailable(parent, &e))?;
        }
        let conn = Connection::open(db_path).map_err(db_err)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: db_path.to_path_buf(),
        })
    }

    /// Throwaway store, used by tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS file_index (
                path TEXT PRIMARY KEY,
                file_hash TEXT,
                project TEXT NOT NULL DEFAULT 'default',
                tags TEXT NOT NULL DEFAULT '[]',
                description TEXT NOT NULL DEFAULT '',
                embedding_ref TEXT,
                indexed_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_file_index_hash ON file_index(file_hash);

            CREATE TABLE IF NOT EXISTS learning_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_hash TEXT NOT NULL,
                event_type TEXT NOT NULL,
                old_path TEXT NOT NULL,
                new_path TEXT NOT NULL,
                old_category TEXT NOT NULL,
                new_category TEXT NOT NULL,
                description TEXT,
                embedding_ref TEXT,
                confidence REAL NOT NULL DEFAULT 0.5,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_type_time ON learning_events(event_type, timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_category ON learning_events(new_category);

            CREATE TABLE IF NOT EXISTS feedback_checks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                auto_event_id INTEGER NOT NULL UNIQUE REFERENCES learning_events(id),
                target_event_id INTEGER REFERENCES learning_events(id),
                outcome TEXT NOT NULL,
                delta REAL NOT NULL,
                checked_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_feedback_target ON feedback_checks(target_event_id);",
        )
        .map_err(db_err)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Most recently touched record carrying this fingerprint.
    pub fn find_by_fingerprint(&self, hash: &str) -> Result<Option<FingerprintRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT path, file_hash, project, tags, description, embedding_ref
             FROM file_index WHERE file_hash = ?1
             ORDER BY updated_at DESC, rowid DESC LIMIT 1",
            params![hash],
            row_to_record,
        )
        .optional()
        .map_err(db_err)
    }

    pub fn find_by_path(&self, path: &Path) -> Result<Option<FingerprintRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT path, file_hash, project, tags, description, embedding_ref
             FROM file_index WHERE path = ?1",
            params![path_str(path)],
            row_to_record,
        )
        .optional()
        .map_err(db_err)
    }

    /// Insert a record, or overwrite the one already stored at its path.
    pub fn upsert_record(&self, record: &FingerprintRecord) -> Result<()> {
        let tags = serde_json::to_string(&record.tags)
            .map_err(|e| AwarenessError::PersistenceFailed(e.to_string()))?;
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO file_index (path, file_hash, project, tags, description, embedding_ref, indexed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(path) DO UPDATE SET
                file_hash = excluded.file_hash,
                project = excluded.project,
                tags = excluded.tags,
                description = excluded.description,
                embedding_ref = excluded.embedding_ref,
                updated_at = excluded.updated_at",
            params![
                path_str(&record.path),
                record.content_hash,
                record.project,
                tags,
                record.description,
                record.embedding_ref,
                now
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Move a record to a new path, keeping its metadata.
    ///
    /// A stale row already sitting at `new_path` is replaced. Returns whether
    /// a record existed at `old_path`.
    pub fn relocate_record(&self, old_path: &Path, new_path: &Path) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE OR REPLACE file_index SET path = ?2, updated_at = ?3 WHERE path = ?1",
                params![path_str(old_path), path_str(new_path), Utc::now().timestamp()],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    /// Rewrite the stored fingerprint of one path.
    pub fn update_fingerprint(&self, path: &Path, hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE file_index SET file_hash = ?2, updated_at = ?3 WHERE path = ?1",
                params![path_str(path), hash, Utc::now().timestamp()],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    pub fn all_records(&self) -> Result<Vec<FingerprintRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT path, file_hash, project, tags, description, embedding_ref
                 FROM file_index ORDER BY path",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_record).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn record_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM file_index", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as usize)
    }

    /// Append to the ledger, returning the new event id.
    pub fn append_event(&self, event: &NewLearningEvent) -> Result<i64> {
        let confidence = event.confidence.clamp(0.0, 1.0);
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO learning_events
                (file_hash, event_type, old_path, new_path, old_category, new_category,
                 description, embedding_ref, confidence, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.fingerprint,
                event.event_type.as_str(),
                path_str(&event.old_path),
                path_str(&event.new_path),
                event.old_category,
                event.new_category,
                event.description,
                event.embedding_ref,
                confidence,
                Utc::now().timestamp()
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn event(&self, id: i64) -> Result<Option<LearningEvent>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM learning_events e WHERE e.id = ?1"),
            params![id],
            row_to_event,
        )
        .optional()
        .map_err(db_err)
    }

    /// Ledger contents in insertion order, optionally filtered by type.
    pub fn events(&self, event_type: Option<LearningEventType>) -> Result<Vec<LearningEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM learning_events e
                 WHERE ?1 IS NULL OR e.event_type = ?1 ORDER BY e.id"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![event_type.map(|t| t.as_str())], row_to_event)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Add `delta` to an event's confidence, clamped to [0, 1] in one update.
    ///
    /// Returns the new confidence, or `None` if the event does not exist.
    pub fn adjust_confidence(&self, event_id: i64, delta: f64) -> Result<Option<f64>> {
        let conn = self.conn.lock();
        adjust_confidence_locked(&conn, event_id, delta)
    }

    /// Auto-applied events since `since` that have not been evaluated yet.
    pub fn pending_auto_events(&self, since: DateTime<Utc>) -> Result<Vec<LearningEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM learning_events e
                 WHERE e.event_type = 'auto_applied' AND e.timestamp >= ?1
                   AND NOT EXISTS (SELECT 1 FROM feedback_checks c WHERE c.auto_event_id = e.id)
                 ORDER BY e.id"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![since.timestamp()], row_to_event)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Highest-confidence manual move into `category`; newest wins ties.
    pub fn top_manual_move(&self, category: &str) -> Result<Option<LearningEvent>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM learning_events e
                 WHERE e.event_type = 'manual_move' AND e.new_category = ?1
                 ORDER BY e.confidence DESC, e.id DESC LIMIT 1"
            ),
            params![category],
            row_to_event,
        )
        .optional()
        .map_err(db_err)
    }

    /// Record the outcome for an auto-applied event and apply its delta.
    ///
    /// Each auto-applied event is evaluated once: a repeated check is ignored
    /// and returns `None`. Otherwise returns the target's new confidence
    /// (`Some(None)` when there was no target to adjust).
    pub fn apply_feedback(&self, check: &FeedbackCheck) -> Result<Option<Option<f64>>> {
        let conn = self.conn.lock();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO feedback_checks
                    (auto_event_id, target_event_id, outcome, delta, checked_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    check.auto_event_id,
                    check.target_event_id,
                    check.outcome.as_str(),
                    check.delta,
                    Utc::now().timestamp()
                ],
            )
            .map_err(db_err)?;
        if inserted == 0 {
            return Ok(None);
        }
        match check.target_event_id {
            Some(target) => Ok(Some(adjust_confidence_locked(&conn, target, check.delta)?)),
            None => Ok(Some(None)),
        }
    }

    /// Best manual move per destination category at or above `min_confidence`.
    pub fn learned_patterns(&self, min_confidence: f64) -> Result<Vec<LearnedPattern>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, new_category, confidence, new_path FROM learning_events
                 WHERE event_type = 'manual_move' AND confidence >= ?1
                 ORDER BY confidence DESC, id DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![min_confidence], |row| {
                Ok(LearnedPattern {
                    event_id: row.get(0)?,
                    category: row.get(1)?,
                    confidence: row.get(2)?,
                    example_path: PathBuf::from(row.get::<_, String>(3)?),
                })
            })
            .map_err(db_err)?;

        let mut seen = HashSet::new();
        let mut patterns = Vec::new();
        for pattern in rows {
            let pattern = pattern.map_err(db_err)?;
            if seen.insert(pattern.category.clone()) {
                patterns.push(pattern);
            }
        }
        Ok(patterns)
    }
}

fn adjust_confidence_locked(conn: &Connection, event_id: i64, delta: f64) -> Result<Option<f64>> {
    let changed = conn
        .execute(
            "UPDATE learning_events
             SET confidence = MIN(1.0, MAX(0.0, confidence + ?2))
             WHERE id = ?1",
            params![event_id, delta],
        )
        .map_err(db_err)?;
    if changed == 0 {
        return Ok(None);
    }
    conn.query_row(
        "SELECT confidence FROM learning_events WHERE id = ?1",
        params![event_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(db_err)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FingerprintRecord> {
    let tags: String = row.get(3)?;
    Ok(FingerprintRecord {
        path: PathBuf::from(row.get::<_, String>(0)?),
        content_hash: row.get(1)?,
        project: row.get(2)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        description: row.get(4)?,
        embedding_ref: row.get(5)?,
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<LearningEvent> {
    let kind: String = row.get(2)?;
    let event_type = LearningEventType::parse(&kind)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(2, "event_type".into(), Type::Text))?;
    let feedback: Option<String> = row.get(11)?;

    Ok(LearningEvent {
        id: row.get(0)?,
        fingerprint: row.get(1)?,
        event_type,
        old_path: PathBuf::from(row.get::<_, String>(3)?),
        new_path: PathBuf::from(row.get::<_, String>(4)?),
        old_category: row.get(5)?,
        new_category: row.get(6)?,
        description: row.get(7)?,
        embedding_ref: row.get(8)?,
        confidence: row.get(9)?,
        timestamp: from_unix(row.get(10)?),
        feedback: feedback.as_deref().and_then(Feedback::parse),
    })
}
