//! Fingerprint audit skill for Fix mode.

use anyhow::Result;
use async_trait::async_trait;
use services::SystemAwareness;
use shared::skill::{Mode, PermissionLevel, Skill, SkillContext, SkillInput, SkillOutput};
use std::sync::Arc;

/// Recomputes missing or outdated fingerprints in the knowledge base.
pub struct FingerprintAudit {
    awareness: Arc<SystemAwareness>,
}

impl FingerprintAudit {
    pub fn new(awareness: Arc<SystemAwareness>) -> Self {
        Self { awareness }
    }
}

#[async_trait]
impl Skill for FingerprintAudit {
    fn id(&self) -> &'static str {
        "fingerprint_audit"
    }

    fn name(&self) -> &'static str {
        "Fingerprint Audit"
    }

    fn description(&self) -> &'static str {
        "Check the file knowledge base and repair missing content fingerprints"
    }

    fn permission_level(&self) -> PermissionLevel {
        PermissionLevel::Safe
    }

    fn modes(&self) -> &'static [Mode] {
        &[Mode::Fix]
    }

    async fn execute(&self, _input: SkillInput, _ctx: &SkillContext) -> Result<SkillOutput> {
        let stats = self.awareness.audit_fingerprints().await?;

        let mut text = format!(
            "Checked {} records, updated {}",
            stats.checked, stats.updated
        );
        if stats.errors > 0 {
            text.push_str(&format!(", {} files unreadable", stats.errors));
        }
        Ok(SkillOutput::text(text).with_data(serde_json::to_value(&stats)?))
    }
}
