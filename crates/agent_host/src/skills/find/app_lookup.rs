//! Installed application lookup for Find mode.

use anyhow::Result;
use async_trait::async_trait;
use services::SystemAwareness;
use shared::skill::{Mode, PermissionLevel, Skill, SkillContext, SkillInput, SkillOutput};
use std::sync::Arc;

/// Resolves an application name against the profile's app inventory.
pub struct AppLookup {
    awareness: Arc<SystemAwareness>,
}

impl AppLookup {
    pub fn new(awareness: Arc<SystemAwareness>) -> Self {
        Self { awareness }
    }
}

#[async_trait]
impl Skill for AppLookup {
    fn id(&self) -> &'static str {
        "app_lookup"
    }

    fn name(&self) -> &'static str {
        "Application Lookup"
    }

    fn description(&self) -> &'static str {
        "Find where an installed application lives"
    }

    fn permission_level(&self) -> PermissionLevel {
        PermissionLevel::Safe
    }

    fn modes(&self) -> &'static [Mode] {
        &[Mode::Find, Mode::Fix]
    }

    async fn execute(&self, input: SkillInput, _ctx: &SkillContext) -> Result<SkillOutput> {
        let name = input.param_or_query("name");

        let Some(path) = self.awareness.resolve_app_path(&name) else {
            let known = self.awareness.profile().apps.len();
            return Ok(SkillOutput::text(format!(
                "No installed application matches '{}' ({} apps known)",
                name, known
            )));
        };

        Ok(SkillOutput::text(format!("{} is at {}", name, path.display()))
            .with_data(serde_json::json!({ "name": name, "path": path }))
            .with_files(vec![path]))
    }

    fn validate_input(&self, input: &SkillInput) -> Result<()> {
        if input.param_or_query("name").is_empty() {
            anyhow::bail!("Application name cannot be empty");
        }
        Ok(())
    }
}
