//! Skill registry and management for agent tool execution.
//!
//! The registry owns every awareness skill, applies the user's permission
//! settings and records each invocation as a [`SkillExecution`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use services::SystemAwareness;
use shared::skill::{
    Mode, Permission, PermissionLevel, Skill, SkillContext, SkillError, SkillExecution, SkillInput,
};
use tracing::{debug, warn};

pub mod find;
pub mod fix;

/// Registry managing all available skills
pub struct SkillRegistry {
    /// All registered skills by ID
    skills: HashMap<String, Arc<dyn Skill>>,
    /// User permission settings per skill
    permissions: HashMap<String, Permission>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            skills: HashMap::new(),
            permissions: HashMap::new(),
        }
    }

    /// Register a skill. Safe skills default to enabled, sensitive ones ask.
    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        let id = skill.id().to_string();

        if !self.permissions.contains_key(&id) {
            let default_perm = match skill.permission_level() {
                PermissionLevel::Safe => Permission::Enabled,
                PermissionLevel::Sensitive => Permission::Ask,
            };
            self.permissions.insert(id.clone(), default_perm);
        }

        self.skills.insert(id, skill);
    }

    pub fn get(&self, skill_id: &str) -> Option<&Arc<dyn Skill>> {
        self.skills.get(skill_id)
    }

    /// Skills available in a mode, ordered by id.
    pub fn for_mode(&self, mode: Mode) -> Vec<&Arc<dyn Skill>> {
        let mut skills: Vec<_> = self
            .skills
            .values()
            .filter(|skill| skill.modes().contains(&mode))
            .collect();
        skills.sort_by_key(|skill| skill.id());
        skills
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Skill>> {
        self.skills.values()
    }

    pub fn get_permission(&self, skill_id: &str) -> Permission {
        self.permissions
            .get(skill_id)
            .copied()
            .unwrap_or(Permission::Ask)
    }

    pub fn set_permission(&mut self, skill_id: &str, permission: Permission) {
        self.permissions.insert(skill_id.to_string(), permission);
    }

    /// Check mode support, the user's permission and, for sensitive skills
    /// left on `Ask`, the session approval.
    pub fn can_execute(&self, skill_id: &str, ctx: &SkillContext) -> Result<(), SkillError> {
        let skill = self
            .skills
            .get(skill_id)
            .ok_or_else(|| SkillError::NotFound {
                skill_id: skill_id.to_string(),
            })?;

        if !skill.modes().contains(&ctx.mode) {
            return Err(SkillError::ModeNotSupported {
                skill_id: skill_id.to_string(),
                mode: ctx.mode,
            });
        }

        let allowed = match self.get_permission(skill_id) {
            Permission::Disabled => false,
            Permission::Ask => {
                skill.permission_level() == PermissionLevel::Safe
                    || ctx.is_session_approved(skill_id)
            }
            Permission::Enabled => true,
        };
        if !allowed {
            return Err(SkillError::PermissionDenied {
                skill_id: skill_id.to_string(),
            });
        }

        Ok(())
    }

    /// Invoke a skill with permission check.
    ///
    /// A skill that runs and fails still yields an execution record, marked
    /// failed; only refusals to run are errors.
    pub async fn invoke(
        &self,
        skill_id: &str,
        input: SkillInput,
        ctx: &SkillContext,
    ) -> Result<SkillExecution, SkillError> {
        self.can_execute(skill_id, ctx)?;

        let skill = self
            .skills
            .get(skill_id)
            .ok_or_else(|| SkillError::NotFound {
                skill_id: skill_id.to_string(),
            })?;

        skill
            .validate_input(&input)
            .map_err(|e| SkillError::InvalidInput {
                message: e.to_string(),
            })?;

        let execution = SkillExecution::new(skill_id, ctx.mode, input.clone());
        let start = Instant::now();

        match skill.execute(input, ctx).await {
            Ok(output) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                debug!(skill = skill_id, duration_ms, "Skill completed");
                Ok(execution.complete(output, duration_ms))
            }
            Err(e) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                warn!(skill = skill_id, error = %e, "Skill failed");
                Ok(execution.fail(e.to_string(), duration_ms))
            }
        }
    }

    pub fn requires_approval(&self, skill_id: &str, ctx: &SkillContext) -> bool {
        match self.skills.get(skill_id) {
            Some(skill) => {
                skill.permission_level() == PermissionLevel::Sensitive
                    && self.get_permission(skill_id) == Permission::Ask
                    && !ctx.is_session_approved(skill_id)
            }
            None => false,
        }
    }

    pub fn skill_info(&self, skill_id: &str) -> Option<SkillInfo> {
        self.skills
            .get(skill_id)
            .map(|skill| self.info_for(skill.as_ref()))
    }

    pub fn skills_info_for_mode(&self, mode: Mode) -> Vec<SkillInfo> {
        self.for_mode(mode)
            .into_iter()
            .map(|skill| self.info_for(skill.as_ref()))
            .collect()
    }

    /// Capability outline for a mode, one skill per line, as shown to the
    /// agent. Disabled skills are left out.
    pub fn outline(&self, mode: Mode) -> String {
        self.skills_info_for_mode(mode)
            .into_iter()
            .filter(|info| info.user_permission != Permission::Disabled)
            .map(|info| {
                let marker = match info.permission_level {
                    PermissionLevel::Safe => "",
                    PermissionLevel::Sensitive => " (asks first)",
                };
                format!("- {}: {}{}", info.id, info.description, marker)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn info_for(&self, skill: &dyn Skill) -> SkillInfo {
        SkillInfo {
            id: skill.id(),
            name: skill.name(),
            description: skill.description(),
            permission_level: skill.permission_level(),
            modes: skill.modes().to_vec(),
            user_permission: self.get_permission(skill.id()),
        }
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Skill information for display
#[derive(Debug, Clone)]
pub struct SkillInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub permission_level: PermissionLevel,
    pub modes: Vec<Mode>,
    pub user_permission: Permission,
}

/// Registry with every awareness skill bound to one facade.
pub fn init_registry(awareness: Arc<SystemAwareness>) -> SkillRegistry {
    let mut registry = SkillRegistry::new();
    find::register_skills(&mut registry, awareness.clone());
    fix::register_skills(&mut registry, awareness);
    registry
}

/// Initialize an empty skill registry (for testing or minimal setup)
pub fn init_empty_registry() -> SkillRegistry {
    SkillRegistry::new()
}

#[cfg(test)]
pub(crate) mod test_support {
    use services::deep_search::SearchBackend;
    use services::system_profiler::SystemProbe;
    use services::SystemAwareness;
    use shared::awareness::{DeviceInfo, StorageInfo};
    use shared::settings::{AwarenessSettings, IndexedFolder, WatchMode};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct StaticProbe;

    impl SystemProbe for StaticProbe {
        fn device_info(&self) -> anyhow::Result<DeviceInfo> {
            Ok(DeviceInfo {
                name: "studio".into(),
                os: "TestOS 14".into(),
                arch: "aarch64".into(),
                cpu_cores: Some(8),
                ..Default::default()
            })
        }

        fn storage_info(&self) -> anyhow::Result<StorageInfo> {
            Ok(StorageInfo {
                total: Some("500G".into()),
                used: Some("200G".into()),
                free: Some("300G".into()),
                capacity: Some("40%".into()),
            })
        }

        fn key_folders(&self) -> BTreeMap<String, PathBuf> {
            BTreeMap::new()
        }
    }

    pub struct Fixture {
        pub _tmp: TempDir,
        pub home: PathBuf,
        pub awareness: Arc<SystemAwareness>,
    }

    /// Facade over a throwaway home with Desktop, Downloads, Documents and
    /// one installed app.
    pub fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let home = std::fs::canonicalize(tmp.path()).unwrap();
        for dir in ["Desktop", "Downloads", "Documents", "Applications/Calculator.app"] {
            std::fs::create_dir_all(home.join(dir)).unwrap();
        }

        let settings = AwarenessSettings {
            data_dir: home.join("data"),
            watched_folders: vec![home.join("Desktop")],
            indexed_folders: vec![
                IndexedFolder::new("Desktop", home.join("Desktop")),
                IndexedFolder::new("Downloads", home.join("Downloads")),
            ],
            app_dirs: vec![home.join("Applications")],
            app_extensions: vec!["app".into()],
            sync_roots: vec![home.join("Documents")],
            category_roots: vec![home.join("Documents")],
            watch_mode: WatchMode::Polling,
            ..Default::default()
        };
        let awareness =
            SystemAwareness::with_parts(settings, Box::new(StaticProbe), SearchBackend::Walk)
                .unwrap();
        Fixture {
            _tmp: tmp,
            home,
            awareness: Arc::new(awareness),
        }
    }
}
