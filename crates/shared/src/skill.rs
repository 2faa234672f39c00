//! Skill system types and traits for agent tool execution.
//!
//! The awareness operations are exposed to the agent's command dispatcher as
//! skills: small, permission-checked units invoked by id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Permission level for skills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionLevel {
    /// Auto-approved, runs without confirmation
    Safe,
    /// Requires per-session confirmation before execution
    Sensitive,
}

/// User's permission setting for a skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Permission {
    Enabled,
    Disabled,
    #[default]
    Ask,
}

/// Agent modes that can use skills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Locating files and applications
    Find,
    /// System maintenance: status, sync, audits
    Fix,
}

impl Mode {
    pub fn all() -> &'static [Mode] {
        &[Mode::Find, Mode::Fix]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Mode::Find => "Find",
            Mode::Fix => "Fix",
        }
    }
}

/// Skill execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

/// Result type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultType {
    Text,
    Files,
    Data,
    Error,
}

/// Input to a skill execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInput {
    /// Natural language request from user
    pub query: String,
    /// Structured parameters (skill-specific)
    pub params: HashMap<String, serde_json::Value>,
}

impl SkillInput {
    pub fn from_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// String parameter, falling back to the trimmed query.
    pub fn param_or_query(&self, key: &str) -> String {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| self.query.trim().to_string())
    }

    pub fn bool_param(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(|v| v.as_bool())
    }
}

/// Suggested follow-up action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub label: String,
    pub skill_id: String,
    pub params: HashMap<String, serde_json::Value>,
}

/// Output from a skill execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillOutput {
    /// Primary result type
    pub result_type: ResultType,
    /// Text response for display
    pub text: Option<String>,
    /// Paths surfaced by the skill
    pub files: Vec<PathBuf>,
    /// Structured data for the dispatcher
    pub data: Option<serde_json::Value>,
    /// Follow-up actions suggested
    pub suggested_actions: Vec<SuggestedAction>,
}

impl SkillOutput {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            result_type: ResultType::Text,
            text: Some(message.into()),
            files: Vec::new(),
            data: None,
            suggested_actions: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result_type: ResultType::Error,
            text: Some(message.into()),
            files: Vec::new(),
            data: None,
            suggested_actions: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        if self.result_type == ResultType::Text {
            self.result_type = ResultType::Data;
        }
        self
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        if !files.is_empty() {
            self.result_type = ResultType::Files;
        }
        self.files = files;
        self
    }

    pub fn with_action(mut self, action: SuggestedAction) -> Self {
        self.suggested_actions.push(action);
        self
    }
}

/// Context provided to skills during execution
pub struct SkillContext {
    /// Current mode
    pub mode: Mode,
    /// Session approval cache (for Sensitive skills)
    pub session_approvals: Arc<RwLock<HashSet<String>>>,
    /// App data directory for storing skill data
    pub data_dir: PathBuf,
}

impl SkillContext {
    pub fn new(mode: Mode, data_dir: PathBuf) -> Self {
        Self {
            mode,
            session_approvals: Arc::new(RwLock::new(HashSet::new())),
            data_dir,
        }
    }

    /// Check if a skill is approved for this session
    pub fn is_session_approved(&self, skill_id: &str) -> bool {
        self.session_approvals.read().contains(skill_id)
    }

    /// Grant session approval for a skill
    pub fn approve_session(&self, skill_id: &str) {
        self.session_approvals.write().insert(skill_id.to_string());
    }
}

/// Record of a skill execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillExecution {
    pub id: Uuid,
    pub skill_id: String,
    pub mode: Mode,
    pub timestamp: DateTime<Utc>,
    pub input: SkillInput,
    pub output: Option<SkillOutput>,
    pub status: ExecutionStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl SkillExecution {
    pub fn new(skill_id: impl Into<String>, mode: Mode, input: SkillInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            skill_id: skill_id.into(),
            mode,
            timestamp: Utc::now(),
            input,
            output: None,
            status: ExecutionStatus::Running,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn complete(mut self, output: SkillOutput, duration_ms: u64) -> Self {
        self.status = ExecutionStatus::Completed;
        self.output = Some(output);
        self.duration_ms = duration_ms;
        self
    }

    pub fn fail(mut self, error: impl Into<String>, duration_ms: u64) -> Self {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.duration_ms = duration_ms;
        self
    }
}

/// Core skill trait that all skills must implement
#[async_trait]
pub trait Skill: Send + Sync {
    /// Unique skill identifier (snake_case)
    fn id(&self) -> &'static str;

    /// Human-readable display name
    fn name(&self) -> &'static str;

    /// Description shown in capability outline
    fn description(&self) -> &'static str;

    /// Permission level (Safe or Sensitive)
    fn permission_level(&self) -> PermissionLevel;

    /// Which modes can invoke this skill
    fn modes(&self) -> &'static [Mode];

    /// Execute the skill with given input
    async fn execute(&self, input: SkillInput, ctx: &SkillContext) -> anyhow::Result<SkillOutput>;

    /// Optional: Validate input before execution
    fn validate_input(&self, _input: &SkillInput) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Skill error types
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("Skill not found: {skill_id}")]
    NotFound { skill_id: String },

    #[error("Permission denied for skill: {skill_id}")]
    PermissionDenied { skill_id: String },

    #[error("Skill {skill_id} not available in {mode:?} mode")]
    ModeNotSupported { skill_id: String, mode: Mode },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Execution failed: {0}")]
    ExecutionFailed(#[from] anyhow::Error),
}
