//! System status skill for Fix mode.
//!
//! Reports device facts, root volume usage and the state of the quick
//! index, all from cached layers. With `refresh: true` both the profile
//! and the index are rebuilt first.

use anyhow::Result;
use async_trait::async_trait;
use services::SystemAwareness;
use shared::awareness::SystemStatus;
use shared::skill::{Mode, PermissionLevel, Skill, SkillContext, SkillInput, SkillOutput};
use std::sync::Arc;

pub struct SystemStatusReport {
    awareness: Arc<SystemAwareness>,
}

impl SystemStatusReport {
    pub fn new(awareness: Arc<SystemAwareness>) -> Self {
        Self { awareness }
    }

    fn format_status(status: &SystemStatus) -> String {
        let mut output = String::new();

        match &status.device {
            Some(device) => {
                output.push_str(&format!(
                    "Device: {} ({}, {})\n",
                    device.name, device.os, device.arch
                ));
                if let Some(model) = &device.model {
                    output.push_str(&format!("Model: {}\n", model));
                }
                if let Some(cores) = device.cpu_cores {
                    output.push_str(&format!("CPU cores: {}\n", cores));
                }
                if let Some(ram) = device.total_ram_gb {
                    output.push_str(&format!("Memory: {:.1} GB\n", ram));
                }
            }
            None => output.push_str("Device: not profiled yet\n"),
        }

        if status.storage.is_empty() {
            output.push_str("Storage: unknown\n");
        } else {
            let part = |v: &Option<String>| v.clone().unwrap_or_else(|| "?".to_string());
            output.push_str(&format!(
                "Storage: {} free of {} ({} used)\n",
                part(&status.storage.free),
                part(&status.storage.total),
                part(&status.storage.capacity),
            ));
        }

        match status.index.last_updated {
            Some(updated) => {
                output.push_str(&format!(
                    "Quick index updated {}\n",
                    updated.format("%Y-%m-%d %H:%M")
                ));
                for (label, count) in &status.index.folder_counts {
                    output.push_str(&format!("  {}: {} items\n", label, count));
                }
                output.push_str(&format!("  Recent: {} files\n", status.index.recent_files));
            }
            None => output.push_str("Quick index not built yet\n"),
        }

        output
    }
}

#[async_trait]
impl Skill for SystemStatusReport {
    fn id(&self) -> &'static str {
        "system_status"
    }

    fn name(&self) -> &'static str {
        "System Status"
    }

    fn description(&self) -> &'static str {
        "Show device details, disk space and what the file index currently knows"
    }

    fn permission_level(&self) -> PermissionLevel {
        PermissionLevel::Safe
    }

    fn modes(&self) -> &'static [Mode] {
        &[Mode::Find, Mode::Fix]
    }

    async fn execute(&self, input: SkillInput, _ctx: &SkillContext) -> Result<SkillOutput> {
        if input.bool_param("refresh").unwrap_or(false) {
            self.awareness.refresh_profile().await;
            self.awareness.refresh_index().await;
        }

        let status = self.awareness.system_status();
        let text = Self::format_status(&status);
        Ok(SkillOutput::text(text).with_data(serde_json::to_value(&status)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::test_support::fixture;
    use shared::skill::ResultType;

    #[tokio::test]
    async fn test_status_before_and_after_refresh() {
        let f = fixture();
        std::fs::write(f.home.join("Desktop/a.txt"), "x").unwrap();
        let skill = SystemStatusReport::new(f.awareness.clone());
        let ctx = SkillContext::new(Mode::Fix, f.home.join("data"));

        let cold = skill
            .execute(SkillInput::from_query(""), &ctx)
            .await
            .unwrap();
        let text = cold.text.unwrap();
        assert!(text.contains("not profiled yet"));
        assert!(text.contains("not built yet"));

        let warm = skill
            .execute(
                SkillInput::from_query("").with_param("refresh", serde_json::json!(true)),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(warm.result_type, ResultType::Data);
        let text = warm.text.unwrap();
        assert!(text.contains("Device: studio (TestOS 14, aarch64)"));
        assert!(text.contains("Storage: 300G free of 500G (40% used)"));
        assert!(text.contains("Desktop: 1 items"));

        let data = warm.data.unwrap();
        assert_eq!(data["index"]["folder_counts"]["Desktop"], 1);
    }
}
