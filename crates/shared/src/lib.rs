pub mod awareness;
pub mod error;
pub mod skill;
pub mod snapshot_file;

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};

    /// How the file watcher picks its change source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum WatchMode {
        /// Native notifications when available, polling otherwise
        #[default]
        Auto,
        Events,
        Polling,
    }

    /// A folder listed by the quick index, with the label used to tag results.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct IndexedFolder {
        pub label: String,
        pub path: PathBuf,
    }

    impl IndexedFolder {
        pub fn new(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
            Self {
                label: label.into(),
                path: path.into(),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct AwarenessSettings {
        /// Where profile, quick index and knowledge database are stored
        pub data_dir: PathBuf,
        pub watched_folders: Vec<PathBuf>,
        pub indexed_folders: Vec<IndexedFolder>,
        /// Application install directories
        pub app_dirs: Vec<PathBuf>,
        /// Bundle suffixes recognised as applications (without the dot)
        pub app_extensions: Vec<String>,
        /// Roots walked by a knowledge sync when none are given
        pub sync_roots: Vec<PathBuf>,
        /// Roots whose first sub-folder names the category of a moved file
        pub category_roots: Vec<PathBuf>,
        pub max_items_per_folder: usize,
        pub recent_window_hours: u64,
        pub recent_limit: usize,
        pub deep_search_limit: usize,
        pub deep_search_timeout_secs: u64,
        pub poll_interval_secs: u64,
        pub debounce_secs: u64,
        pub feedback_window_days: u64,
        pub sync_interval_mins: u64,
        pub watch_mode: WatchMode,
        pub index_new_files: bool,
    }

    impl Default for AwarenessSettings {
        fn default() -> Self {
            let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            Self {
                data_dir: default_data_dir(),
                watched_folders: vec![
                    home.join("Desktop"),
                    home.join("Downloads"),
                    home.join("Documents"),
                ],
                indexed_folders: vec![
                    IndexedFolder::new("Desktop", home.join("Desktop")),
                    IndexedFolder::new("Downloads", home.join("Downloads")),
                    IndexedFolder::new("Documents", home.join("Documents")),
                ],
                app_dirs: default_app_dirs(&home),
                app_extensions: vec!["app".into(), "desktop".into()],
                sync_roots: vec![home.join("Documents")],
                category_roots: vec![home.join("Documents")],
                max_items_per_folder: 50,
                recent_window_hours: 24,
                recent_limit: 20,
                deep_search_limit: 20,
                deep_search_timeout_secs: 10,
                poll_interval_secs: 10,
                debounce_secs: 5,
                feedback_window_days: 7,
                sync_interval_mins: 60,
                watch_mode: WatchMode::Auto,
                index_new_files: false,
            }
        }
    }

    impl AwarenessSettings {
        /// Load settings from a JSON file, falling back to defaults.
        pub fn load_or_default(path: &Path) -> Self {
            let loaded = std::fs::read(path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<AwarenessSettings>(&bytes).map_err(|e| e.to_string())
                });
            match loaded {
                Ok(settings) => settings.expanded(),
                Err(e) => {
                    if path.exists() {
                        tracing::warn!(path = %path.display(), error = %e, "Unreadable settings, using defaults");
                    }
                    Self::default()
                }
            }
        }

        pub fn save(&self, path: &Path) -> anyhow::Result<()> {
            crate::snapshot_file::write_json_atomic(path, self)?;
            Ok(())
        }

        /// Default location of the settings file.
        pub fn config_path() -> Option<PathBuf> {
            directories::ProjectDirs::from("com.local", "Little Helper", "LittleHelper")
                .map(|p| p.config_dir().join("awareness.json"))
        }

        pub fn profile_path(&self) -> PathBuf {
            self.data_dir.join("system_profile.json")
        }

        pub fn quick_index_path(&self) -> PathBuf {
            self.data_dir.join("quick_index.json")
        }

        pub fn knowledge_db_path(&self) -> PathBuf {
            self.data_dir.join("knowledge.db")
        }

        /// Expand `~` in every configured path.
        fn expanded(mut self) -> Self {
            self.data_dir = expand_user_path(&self.data_dir);
            for p in self
                .watched_folders
                .iter_mut()
                .chain(self.app_dirs.iter_mut())
                .chain(self.sync_roots.iter_mut())
                .chain(self.category_roots.iter_mut())
            {
                *p = expand_user_path(p);
            }
            for folder in &mut self.indexed_folders {
                folder.path = expand_user_path(&folder.path);
            }
            self
        }
    }

    fn default_data_dir() -> PathBuf {
        directories::ProjectDirs::from("com.local", "Little Helper", "LittleHelper")
            .map(|p| p.data_dir().join("system"))
            .unwrap_or_else(|| PathBuf::from("./data"))
    }

    fn default_app_dirs(home: &Path) -> Vec<PathBuf> {
        if cfg!(target_os = "macos") {
            vec![
                PathBuf::from("/Applications"),
                PathBuf::from("/System/Applications"),
                home.join("Applications"),
            ]
        } else {
            vec![
                PathBuf::from("/usr/share/applications"),
                home.join(".local/share/applications"),
            ]
        }
    }

    /// Replace a leading `~` with the user's home directory.
    pub fn expand_user_path(path: &Path) -> PathBuf {
        match path.strip_prefix("~") {
            Ok(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| path.to_path_buf()),
            Err(_) => path.to_path_buf(),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn test_missing_file_yields_defaults() {
            let tmp = TempDir::new().unwrap();
            let settings = AwarenessSettings::load_or_default(&tmp.path().join("nope.json"));
            assert_eq!(settings.max_items_per_folder, 50);
            assert_eq!(settings.watch_mode, WatchMode::Auto);
        }

        #[test]
        fn test_partial_file_keeps_defaults_for_missing_fields() {
            let tmp = TempDir::new().unwrap();
            let path = tmp.path().join("awareness.json");
            std::fs::write(&path, r#"{"recent_limit": 5, "watch_mode": "polling"}"#).unwrap();

            let settings = AwarenessSettings::load_or_default(&path);
            assert_eq!(settings.recent_limit, 5);
            assert_eq!(settings.watch_mode, WatchMode::Polling);
            assert_eq!(settings.deep_search_timeout_secs, 10);
        }

        #[test]
        fn test_save_then_load() {
            let tmp = TempDir::new().unwrap();
            let path = tmp.path().join("nested").join("awareness.json");
            let mut settings = AwarenessSettings::default();
            settings.data_dir = tmp.path().join("data");
            settings.index_new_files = true;
            settings.save(&path).unwrap();

            let loaded = AwarenessSettings::load_or_default(&path);
            assert!(loaded.index_new_files);
            assert_eq!(loaded.knowledge_db_path(), tmp.path().join("data").join("knowledge.db"));
        }

        #[test]
        fn test_save_replaces_file_whole() {
            let tmp = TempDir::new().unwrap();
            let path = tmp.path().join("awareness.json");
            std::fs::write(&path, "{\"index_new_files\": tr").unwrap();

            let mut settings = AwarenessSettings::default();
            settings.sync_interval_mins = 15;
            settings.save(&path).unwrap();

            assert!(!path.with_extension("tmp").exists());
            let raw: serde_json::Value =
                serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
            assert_eq!(raw["sync_interval_mins"], 15);
            assert_eq!(AwarenessSettings::load_or_default(&path).sync_interval_mins, 15);
        }

        #[test]
        fn test_expand_user_path() {
            let plain = PathBuf::from("/tmp/x");
            assert_eq!(expand_user_path(&plain), plain);
            if let Some(home) = dirs::home_dir() {
                assert_eq!(expand_user_path(Path::new("~/Desktop")), home.join("Desktop"));
            }
        }
    }
}
