//! Agent Host - exposes filesystem awareness to the agent as skills
//!
//! The agent's command dispatcher never talks to the services directly; it
//! invokes skills by id through the [`SkillRegistry`], which applies the
//! per-skill permission rules first.

pub mod skills;

pub use skills::{init_empty_registry, init_registry, SkillInfo, SkillRegistry};
