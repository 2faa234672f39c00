//! Knowledge-base sync skill for Fix mode.
//!
//! Walks the sync roots, learns from files the user moved themselves and
//! scores earlier automatic moves. Writes to the knowledge base, so it asks
//! once per session.

use anyhow::Result;
use async_trait::async_trait;
use services::SystemAwareness;
use shared::awareness::SyncStats;
use shared::skill::{Mode, PermissionLevel, Skill, SkillContext, SkillInput, SkillOutput};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct KnowledgeSync {
    awareness: Arc<SystemAwareness>,
}

impl KnowledgeSync {
    pub fn new(awareness: Arc<SystemAwareness>) -> Self {
        Self { awareness }
    }

    /// Roots from the `roots` parameter; empty means the configured roots.
    fn roots(input: &SkillInput) -> Vec<PathBuf> {
        input
            .params
            .get("roots")
            .and_then(|v| v.as_array())
            .map(|roots| {
                roots
                    .iter()
                    .filter_map(|r| r.as_str())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn summary(stats: &SyncStats) -> String {
        let mut text = format!(
            "Scanned {} files: {} moves learned, {} newly indexed",
            stats.scanned, stats.learned_moves, stats.new_indexed
        );
        if stats.reinforced + stats.penalized > 0 {
            text.push_str(&format!(
                "\nAutomatic moves: {} kept, {} undone",
                stats.reinforced, stats.penalized
            ));
        }
        if stats.errors > 0 {
            text.push_str(&format!("\n{} files could not be read", stats.errors));
        }
        text
    }
}

#[async_trait]
impl Skill for KnowledgeSync {
    fn id(&self) -> &'static str {
        "knowledge_sync"
    }

    fn name(&self) -> &'static str {
        "Knowledge Sync"
    }

    fn description(&self) -> &'static str {
        "Learn where you keep things by noticing files you moved"
    }

    fn permission_level(&self) -> PermissionLevel {
        PermissionLevel::Sensitive
    }

    fn modes(&self) -> &'static [Mode] {
        &[Mode::Fix]
    }

    async fn execute(&self, input: SkillInput, _ctx: &SkillContext) -> Result<SkillOutput> {
        let roots = Self::roots(&input);
        let index_new = input
            .bool_param("index_new")
            .unwrap_or(self.awareness.settings().index_new_files);

        let stats = self
            .awareness
            .sync_knowledge_base(&roots, index_new)
            .await?;
        info!(
            scanned = stats.scanned,
            learned = stats.learned_moves,
            "Knowledge sync requested by agent"
        );

        Ok(SkillOutput::text(Self::summary(&stats)).with_data(serde_json::to_value(&stats)?))
    }
}
