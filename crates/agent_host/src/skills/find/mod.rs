//! Find mode skills for locating files and applications.
//!
//! Provides:
//! - File lookup through the quick index with deep-search fallback
//! - Installed application lookup
//! - Recently modified files

pub mod app_lookup;
pub mod find_file;
pub mod recent_files;

pub use app_lookup::AppLookup;
pub use find_file::FindFile;
pub use recent_files::RecentFiles;

use crate::skills::SkillRegistry;
use services::SystemAwareness;
use shared::awareness::{format_size, FileEntry};
use std::sync::Arc;

/// Register all Find mode skills with the registry
pub fn register_skills(registry: &mut SkillRegistry, awareness: Arc<SystemAwareness>) {
    registry.register(Arc::new(FindFile::new(awareness.clone())));
    registry.register(Arc::new(AppLookup::new(awareness.clone())));
    registry.register(Arc::new(RecentFiles::new(awareness)));
}

/// Numbered listing: name, source and size or "folder", then the path.
pub(crate) fn format_entries(entries: &[FileEntry]) -> String {
    let mut output = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let detail = match entry.size_bytes {
            Some(size) if !entry.is_folder() => format_size(size),
            _ if entry.is_folder() => "folder".to_string(),
            _ => "-".to_string(),
        };
        let modified = entry
            .modified_at
            .map(|t| format!(" | {}", t.format("%Y-%m-%d %H:%M")))
            .unwrap_or_default();
        let source = entry
            .source
            .as_deref()
            .map(|s| format!(" [{}]", s))
            .unwrap_or_default();

        output.push_str(&format!(
            "{}. {}{}\n   {}{}\n   {}\n",
            i + 1,
            entry.name,
            source,
            detail,
            modified,
            entry.path.display()
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::awareness::EntryKind;
    use std::path::PathBuf;

    #[test]
    fn test_format_entries_shows_size_and_source() {
        let entries = vec![
            FileEntry {
                name: "report.pdf".into(),
                path: PathBuf::from("/home/u/Desktop/report.pdf"),
                kind: EntryKind::File,
                size_bytes: Some(1536),
                modified_at: None,
                source: Some("Desktop".into()),
            },
            FileEntry {
                name: "Taxes".into(),
                path: PathBuf::from("/home/u/Documents/Taxes"),
                kind: EntryKind::Folder,
                size_bytes: None,
                modified_at: None,
                source: None,
            },
        ];

        let text = format_entries(&entries);
        assert!(text.contains("1. report.pdf [Desktop]"));
        assert!(text.contains("1.5 KB"));
        assert!(text.contains("2. Taxes\n   folder"));
    }
}
