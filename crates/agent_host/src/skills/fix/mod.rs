//! Fix mode skills for keeping the awareness layers healthy.
//!
//! Provides:
//! - Machine and index status
//! - Knowledge-base sync (learns from manual file moves)
//! - Fingerprint audit of the knowledge base
//! - Learned relocation patterns

pub mod fingerprint_audit;
pub mod knowledge_sync;
pub mod learned_patterns;
pub mod system_status;

pub use fingerprint_audit::FingerprintAudit;
pub use knowledge_sync::KnowledgeSync;
pub use learned_patterns::LearnedPatterns;
pub use system_status::SystemStatusReport;

use crate::skills::SkillRegistry;
use services::SystemAwareness;
use std::sync::Arc;

/// Register all Fix mode skills with the registry
pub fn register_skills(registry: &mut SkillRegistry, awareness: Arc<SystemAwareness>) {
    registry.register(Arc::new(SystemStatusReport::new(awareness.clone())));
    registry.register(Arc::new(KnowledgeSync::new(awareness.clone())));
    registry.register(Arc::new(FingerprintAudit::new(awareness.clone())));
    registry.register(Arc::new(LearnedPatterns::new(awareness)));
}
