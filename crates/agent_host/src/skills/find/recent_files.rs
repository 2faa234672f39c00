//! Recently modified files for Find mode.

use super::format_entries;
use anyhow::Result;
use async_trait::async_trait;
use services::SystemAwareness;
use shared::skill::{Mode, PermissionLevel, Skill, SkillContext, SkillInput, SkillOutput};
use std::sync::Arc;

pub struct RecentFiles {
    awareness: Arc<SystemAwareness>,
}

impl RecentFiles {
    pub fn new(awareness: Arc<SystemAwareness>) -> Self {
        Self { awareness }
    }
}

#[async_trait]
impl Skill for RecentFiles {
    fn id(&self) -> &'static str {
        "recent_files"
    }

    fn name(&self) -> &'static str {
        "Recent Files"
    }

    fn description(&self) -> &'static str {
        "List files you changed recently, newest first"
    }

    fn permission_level(&self) -> PermissionLevel {
        PermissionLevel::Safe
    }

    fn modes(&self) -> &'static [Mode] {
        &[Mode::Find]
    }

    async fn execute(&self, _input: SkillInput, _ctx: &SkillContext) -> Result<SkillOutput> {
        let recent = self.awareness.recent_files();
        if recent.is_empty() {
            return Ok(SkillOutput::text("No recently modified files"));
        }

        let text = format!(
            "{} recently modified:\n\n{}",
            recent.len(),
            format_entries(&recent)
        );
        let data = serde_json::to_value(&recent)?;
        let files = recent.into_iter().map(|e| e.path).collect();
        Ok(SkillOutput::text(text).with_data(data).with_files(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::test_support::fixture;

    #[tokio::test]
    async fn test_lists_recent_files() {
        let f = fixture();
        std::fs::write(f.home.join("Documents/draft.md"), "x").unwrap();
        f.awareness.refresh_index().await;

        let skill = RecentFiles::new(f.awareness.clone());
        let ctx = SkillContext::new(Mode::Find, f.home.join("data"));
        let output = skill
            .execute(SkillInput::from_query(""), &ctx)
            .await
            .unwrap();

        assert_eq!(output.files, vec![f.home.join("Documents/draft.md")]);
        assert!(output.text.unwrap().contains("[Recent]"));
    }

    #[tokio::test]
    async fn test_empty_before_first_refresh() {
        let f = fixture();
        let skill = RecentFiles::new(f.awareness.clone());
        let ctx = SkillContext::new(Mode::Find, f.home.join("data"));
        let output = skill
            .execute(SkillInput::from_query(""), &ctx)
            .await
            .unwrap();
        assert!(output.files.is_empty());
    }
}
