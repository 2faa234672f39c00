//! Learned relocation patterns for Fix mode.

use anyhow::Result;
use async_trait::async_trait;
use services::SystemAwareness;
use shared::skill::{Mode, PermissionLevel, Skill, SkillContext, SkillInput, SkillOutput};
use std::sync::Arc;

/// Patterns below this are not trusted enough to act on.
const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

pub struct LearnedPatterns {
    awareness: Arc<SystemAwareness>,
}

impl LearnedPatterns {
    pub fn new(awareness: Arc<SystemAwareness>) -> Self {
        Self { awareness }
    }
}

#[async_trait]
impl Skill for LearnedPatterns {
    fn id(&self) -> &'static str {
        "learned_patterns"
    }

    fn name(&self) -> &'static str {
        "Learned Patterns"
    }

    fn description(&self) -> &'static str {
        "Show which folders files usually end up in, and how sure we are"
    }

    fn permission_level(&self) -> PermissionLevel {
        PermissionLevel::Safe
    }

    fn modes(&self) -> &'static [Mode] {
        &[Mode::Fix]
    }

    async fn execute(&self, input: SkillInput, _ctx: &SkillContext) -> Result<SkillOutput> {
        let min_confidence = input
            .params
            .get("min_confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_MIN_CONFIDENCE)
            .clamp(0.0, 1.0);

        let patterns = self.awareness.learned_patterns(min_confidence).await?;
        if patterns.is_empty() {
            return Ok(SkillOutput::text(format!(
                "No patterns learned with confidence of at least {:.0}%",
                min_confidence * 100.0
            )));
        }

        let mut text = format!("{} learned patterns:\n", patterns.len());
        for pattern in &patterns {
            text.push_str(&format!(
                "- {} ({:.0}%), e.g. {}\n",
                pattern.category,
                pattern.confidence * 100.0,
                pattern.example_path.display()
            ));
        }
        Ok(SkillOutput::text(text).with_data(serde_json::to_value(&patterns)?))
    }

    fn validate_input(&self, input: &SkillInput) -> Result<()> {
        if let Some(value) = input.params.get("min_confidence") {
            if value.as_f64().is_none() {
                anyhow::bail!("min_confidence must be a number between 0 and 1");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::test_support::fixture;

    #[tokio::test]
    async fn test_lists_pattern_after_manual_move() {
        let f = fixture();
        let docs = f.home.join("Documents");
        std::fs::create_dir_all(docs.join("Inbox")).unwrap();
        std::fs::create_dir_all(docs.join("Receipts")).unwrap();
        std::fs::write(docs.join("Inbox/coffee.pdf"), "4.50").unwrap();
        f.awareness.sync_knowledge_base(&[], true).await.unwrap();
        std::fs::rename(docs.join("Inbox/coffee.pdf"), docs.join("Receipts/coffee.pdf")).unwrap();
        f.awareness.sync_knowledge_base(&[], false).await.unwrap();

        let skill = LearnedPatterns::new(f.awareness.clone());
        let ctx = SkillContext::new(Mode::Fix, f.home.join("data"));
        let output = skill
            .execute(SkillInput::from_query(""), &ctx)
            .await
            .unwrap();

        let text = output.text.unwrap();
        assert!(text.contains("- Receipts (50%)"), "{text}");
        assert_eq!(output.data.unwrap()[0]["category"], "Receipts");
    }

    #[tokio::test]
    async fn test_threshold_filters_everything() {
        let f = fixture();
        let skill = LearnedPatterns::new(f.awareness.clone());
        let ctx = SkillContext::new(Mode::Fix, f.home.join("data"));
        let output = skill
            .execute(
                SkillInput::from_query("").with_param("min_confidence", serde_json::json!(0.9)),
                &ctx,
            )
            .await
            .unwrap();
        assert!(output.text.unwrap().contains("at least 90%"));
        assert!(skill
            .validate_input(
                &SkillInput::from_query("").with_param("min_confidence", serde_json::json!("high"))
            )
            .is_err());
    }
}
