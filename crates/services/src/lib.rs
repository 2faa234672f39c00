//! Filesystem awareness services: layered caches of the local machine and
//! an adaptive index that learns from the user's own file moves.

pub mod adaptive_sync;
pub mod deep_search;
pub mod file_watcher;
pub mod fingerprint;
pub mod knowledge_store;
pub mod quick_index;
pub mod system_awareness;
pub mod system_profiler;

pub use system_awareness::SystemAwareness;
