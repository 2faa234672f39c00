//! File lookup skill for Find mode.
//!
//! Answers from the quick index first, ranked by name similarity, and only
//! runs a live search when the index has nothing. A `scope` parameter skips
//! the index and searches that directory directly.

use super::format_entries;
use anyhow::Result;
use async_trait::async_trait;
use services::SystemAwareness;
use shared::awareness::FileEntry;
use shared::skill::{
    Mode, PermissionLevel, Skill, SkillContext, SkillInput, SkillOutput, SuggestedAction,
};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_LIMIT: usize = 20;

pub struct FindFile {
    awareness: Arc<SystemAwareness>,
}

impl FindFile {
    pub fn new(awareness: Arc<SystemAwareness>) -> Self {
        Self { awareness }
    }

    fn build_suggestions(&self, results: &[FileEntry], query: &str) -> Vec<SuggestedAction> {
        let mut suggestions = Vec::new();

        // Offer a scoped search in the folder holding the best match
        if let Some(parent) = results.first().and_then(|top| top.path.parent()) {
            suggestions.push(SuggestedAction {
                label: format!("Search in {}", parent.display()),
                skill_id: "find_file".to_string(),
                params: [
                    ("query".to_string(), serde_json::json!(query)),
                    (
                        "scope".to_string(),
                        serde_json::json!(parent.to_string_lossy()),
                    ),
                ]
                .into_iter()
                .collect(),
            });
        }

        suggestions
    }
}

#[async_trait]
impl Skill for FindFile {
    fn id(&self) -> &'static str {
        "find_file"
    }

    fn name(&self) -> &'static str {
        "Find File"
    }

    fn description(&self) -> &'static str {
        "Find files and folders by name in your usual places, searching deeper when needed"
    }

    fn permission_level(&self) -> PermissionLevel {
        PermissionLevel::Safe
    }

    fn modes(&self) -> &'static [Mode] {
        &[Mode::Find]
    }

    async fn execute(&self, input: SkillInput, _ctx: &SkillContext) -> Result<SkillOutput> {
        let query = input.param_or_query("query");
        let limit = input
            .params
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LIMIT);

        let mut results = match input.params.get("scope").and_then(|v| v.as_str()) {
            Some(scope) => {
                self.awareness
                    .search_in(&query, &PathBuf::from(scope))
                    .await
            }
            None => self.awareness.find_file(&query).await,
        };
        results.truncate(limit);

        if results.is_empty() {
            return Ok(SkillOutput::text(format!(
                "No files found matching '{}'",
                query
            )));
        }

        let text = format!(
            "Found {} matching '{}':\n\n{}",
            results.len(),
            query,
            format_entries(&results)
        );
        let data = serde_json::to_value(&results)?;
        let files = results.iter().map(|e| e.path.clone()).collect();
        let suggestions = self.build_suggestions(&results, &query);

        let mut output = SkillOutput::text(text).with_data(data).with_files(files);
        for action in suggestions {
            output = output.with_action(action);
        }
        Ok(output)
    }

    fn validate_input(&self, input: &SkillInput) -> Result<()> {
        if input.param_or_query("query").is_empty() {
            anyhow::bail!("Search query cannot be empty");
        }
        Ok(())
    }
}
