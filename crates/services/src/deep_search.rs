//! Layer 3: uncached search through the OS's native search facility.
//!
//! Used only when the quick index misses. Every native call is bounded by a
//! timeout; a failure yields an empty result plus the error, never a panic.

use chrono::{DateTime, Utc};
use shared::awareness::{EntryKind, FileEntry};
use shared::error::AwarenessError;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Depth limit for the portable directory-walk backend.
const WALK_MAX_DEPTH: usize = 8;

/// Native search facility used for queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchBackend {
    /// macOS Spotlight via `mdfind`
    Spotlight,
    /// `locate` database (mlocate/plocate)
    Locate,
    /// Bounded directory walk over the configured roots
    Walk,
}

impl SearchBackend {
    /// Pick the best facility present on this machine.
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") && binary_available("mdfind") {
            SearchBackend::Spotlight
        } else if binary_available("locate") {
            SearchBackend::Locate
        } else {
            SearchBackend::Walk
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SearchBackend::Spotlight => "spotlight",
            SearchBackend::Locate => "locate",
            SearchBackend::Walk => "walk",
        }
    }
}

fn binary_available(program: &str) -> bool {
    std::process::Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Results of one search. `error` is set when the native call failed or
/// timed out; `results` is then empty.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub results: Vec<FileEntry>,
    pub error: Option<AwarenessError>,
}

impl SearchOutcome {
    fn failed(error: AwarenessError) -> Self {
        Self {
            results: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub struct DeepSearch {
    backend: SearchBackend,
    walk_roots: Vec<PathBuf>,
    timeout: Duration,
}

impl DeepSearch {
    /// `walk_roots` are searched by the walk backend and used for the
    /// recent-files list when the backend has no modification-time query.
    pub fn new(backend: SearchBackend, walk_roots: Vec<PathBuf>, timeout: Duration) -> Self {
        Self {
            backend,
            walk_roots,
            timeout,
        }
    }

    pub fn backend(&self) -> &SearchBackend {
        &self.backend
    }

    /// Find up to `limit` files or folders matching `query`, optionally only
    /// beneath `scope`.
    pub async fn search(&self, query: &str, limit: usize, scope: Option<&Path>) -> SearchOutcome {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return SearchOutcome::default();
        }
        info!(query, backend = self.backend.name(), "Deep search");

        let outcome = match self.backend {
            SearchBackend::Spotlight => {
                let mut args = Vec::new();
                if let Some(scope) = scope {
                    args.push("-onlyin".to_string());
                    args.push(scope.to_string_lossy().to_string());
                }
                args.push(query.to_string());
                self.native("mdfind", &args, scope, limit).await
            }
            SearchBackend::Locate => {
                let fetch = limit.saturating_mul(10).max(100);
                let args = vec!["-i".into(), "-l".into(), fetch.to_string(), query.to_string()];
                self.native("locate", &args, scope, limit).await
            }
            SearchBackend::Walk => {
                let roots = match scope {
                    Some(scope) => vec![scope.to_path_buf()],
                    None => self.walk_roots.clone(),
                };
                let needle = query.to_lowercase();
                self.walk(roots, limit, move |entry| {
                    entry.file_name().to_string_lossy().to_lowercase().contains(&needle)
                })
                .await
            }
        };

        if let Some(e) = &outcome.error {
            warn!(query, error = %e, "Deep search failed");
        } else {
            debug!(query, results = outcome.results.len(), "Deep search finished");
        }
        outcome
    }

    /// Files modified within `window`, newest first.
    pub async fn recently_modified(&self, window: Duration, limit: usize) -> SearchOutcome {
        if limit == 0 {
            return SearchOutcome::default();
        }
        match self.backend {
            SearchBackend::Spotlight => {
                let query = format!(
                    "kMDItemContentModificationDate > $time.now(-{}) && kMDItemContentType != \"public.folder\"",
                    window.as_secs()
                );
                let mut outcome = self.native("mdfind", &[query], None, usize::MAX).await;
                outcome.results.retain(|e| !e.is_folder());
                outcome
                    .results
                    .sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
                outcome.results.truncate(limit);
                outcome
            }
            SearchBackend::Locate | SearchBackend::Walk => {
                let cutoff = SystemTime::now()
                    .checked_sub(window)
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                let roots = self.walk_roots.clone();
                // Collect every match, then sort; the walk order is arbitrary.
                let mut outcome = self
                    .walk(roots, usize::MAX, move |entry| {
                        entry.file_type().is_file()
                            && entry
                                .metadata()
                                .ok()
                                .and_then(|m| m.modified().ok())
                                .map(|t| t >= cutoff)
                                .unwrap_or(false)
                    })
                    .await;
                outcome
                    .results
                    .sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
                outcome.results.truncate(limit);
                outcome
            }
        }
    }

    async fn native(
        &self,
        program: &str,
        args: &[String],
        scope: Option<&Path>,
        limit: usize,
    ) -> SearchOutcome {
        match run_search_command(program, args, self.timeout).await {
            Ok(stdout) => SearchOutcome {
                results: collect_results(&stdout, scope, limit),
                error: None,
            },
            Err(e) => SearchOutcome::failed(e),
        }
    }

    async fn walk<F>(&self, roots: Vec<PathBuf>, limit: usize, matches: F) -> SearchOutcome
    where
        F: Fn(&walkdir::DirEntry) -> bool + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let task = tokio::task::spawn_blocking(move || {
            let mut results = Vec::new();
            let mut timed_out = false;
            'roots: for root in roots {
                let walker = WalkDir::new(&root)
                    .max_depth(WALK_MAX_DEPTH)
                    .follow_links(false)
                    .into_iter()
                    .filter_entry(|e| {
                        let name = e.file_name().to_string_lossy();
                        e.depth() == 0 || !(is_noise_name(&name) || name == "Library")
                    });
                for entry in walker.filter_map(|e| e.ok()) {
                    if Instant::now() > deadline {
                        timed_out = true;
                        break 'roots;
                    }
                    if entry.depth() == 0 || !matches(&entry) {
                        continue;
                    }
                    if let Ok(meta) = entry.metadata() {
                        results.push(file_entry(entry.path().to_path_buf(), &meta));
                        if results.len() >= limit {
                            break 'roots;
                        }
                    }
                }
            }
            (results, timed_out)
        });

        match task.await {
            Ok((results, false)) => SearchOutcome {
                results,
                error: None,
            },
            Ok((_, true)) => SearchOutcome::failed(AwarenessError::search_failed(format!(
                "directory walk timed out after {}s",
                self.timeout.as_secs()
            ))),
            Err(e) => SearchOutcome::failed(AwarenessError::search_failed(e.to_string())),
        }
    }
}

/// Run a search program, returning stdout. Non-zero exit, spawn failure and
/// timeout all map to `ExternalSearchFailed`.
async fn run_search_command(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<String, AwarenessError> {
    let output = tokio::time::timeout(
        timeout,
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await;

    match output {
        Ok(Ok(output)) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        }
        Ok(Ok(output)) => Err(AwarenessError::search_failed(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))),
        Ok(Err(e)) => Err(AwarenessError::search_failed(format!("{}: {}", program, e))),
        Err(_) => Err(AwarenessError::search_failed(format!(
            "{} timed out after {}s",
            program,
            timeout.as_secs()
        ))),
    }
}

/// Turn one-path-per-line output into entries, dropping system and hidden
/// paths, paths outside `scope`, and paths that no longer exist.
fn collect_results(stdout: &str, scope: Option<&Path>, limit: usize) -> Vec<FileEntry> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .filter(|p| scope.map(|s| p.starts_with(s)).unwrap_or(true))
        .filter(|p| !is_system_path(p, scope))
        .filter_map(|p| {
            let meta = std::fs::metadata(&p).ok()?;
            Some(file_entry(p, &meta))
        })
        .take(limit)
        .collect()
}

/// Paths under a `Library` folder, hidden files, and paths inside a hidden
/// folder below `scope`. Hidden folders above the scope are the caller's
/// choice and do not count.
pub fn is_system_path(path: &Path, scope: Option<&Path>) -> bool {
    let in_library = path
        .components()
        .any(|c| matches!(c, Component::Normal(part) if part == "Library"));
    let hidden_name = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false);
    let hidden_below_scope = scope
        .and_then(|s| path.strip_prefix(s).ok())
        .map(|rest| {
            rest.components().any(|c| {
                matches!(c, Component::Normal(part) if part.to_string_lossy().starts_with('.'))
            })
        })
        .unwrap_or(false);
    in_library || hidden_name || hidden_below_scope
}

/// Hidden entries and known junk names that never belong in results.
pub fn is_noise_name(name: &str) -> bool {
    name.starts_with('.')
        || matches!(name, "__pycache__" | "Icon\r" | "node_modules")
        || name.ends_with(".localized")
}

pub(crate) fn file_entry(path: PathBuf, meta: &std::fs::Metadata) -> FileEntry {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    let kind = if meta.is_dir() {
        EntryKind::Folder
    } else {
        EntryKind::File
    };
    FileEntry {
        name,
        path,
        kind,
        size_bytes: (kind == EntryKind::File).then(|| meta.len()),
        modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("Projects/Invoices")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::create_dir_all(root.join("Library/Caches")).unwrap();
        std::fs::write(root.join("Projects/Invoices/invoice_march.pdf"), "pdf").unwrap();
        std::fs::write(root.join("Projects/notes.txt"), "notes").unwrap();
        std::fs::write(root.join(".hidden/invoice_secret.pdf"), "x").unwrap();
        std::fs::write(root.join("Projects/.invoice_draft.pdf"), "x").unwrap();
        tmp
    }

    #[test]
    fn test_is_system_path() {
        assert!(is_system_path(Path::new("/Users/a/Library/Caches/x.db"), None));
        assert!(is_system_path(Path::new("/Users/a/Documents/.DS_Store"), None));
        assert!(!is_system_path(Path::new("/Users/a/Documents/report.pdf"), None));

        let home = Path::new("/Users/a");
        assert!(is_system_path(Path::new("/Users/a/.config/x"), Some(home)));
        let dot_scope = Path::new("/Users/a/.config");
        assert!(!is_system_path(Path::new("/Users/a/.config/app/settings.toml"), Some(dot_scope)));
    }

    #[test]
    fn test_collect_results_filters_and_limits() {
        let tmp = tree();
        let root = tmp.path();
        let stdout = format!(
            "{}\n{}\n{}\n{}\n\n",
            root.join("Projects/Invoices/invoice_march.pdf").display(),
            root.join("Projects/.invoice_draft.pdf").display(),
            root.join("Projects/deleted_invoice.pdf").display(),
            root.join("Projects/Invoices").display(),
        );

        // The temp root may itself sit under a dot folder such as /tmp/.tmpXXXX.
        let results = collect_results(&stdout, None, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "invoice_march.pdf");
        assert_eq!(results[0].size_bytes, Some(3));
        assert!(results[1].is_folder());
        assert_eq!(results[1].size_bytes, None);

        assert_eq!(collect_results(&stdout, None, 1).len(), 1);
        let scoped = collect_results(&stdout, Some(root.join("Projects/Invoices/x").as_path()), 10);
        assert!(scoped.is_empty());
    }

    #[test]
    fn test_collect_results_hidden_folders_relative_to_scope() {
        let tmp = tree();
        let root = tmp.path();
        let secret = root.join(".hidden/invoice_secret.pdf");
        let stdout = format!(
            "{}\n{}\n",
            root.join("Projects/Invoices/invoice_march.pdf").display(),
            secret.display(),
        );

        let from_root = collect_results(&stdout, Some(root), 10);
        assert_eq!(from_root.len(), 1);
        assert_eq!(from_root[0].name, "invoice_march.pdf");

        let inside_hidden = collect_results(&stdout, Some(root.join(".hidden").as_path()), 10);
        assert_eq!(inside_hidden.len(), 1);
        assert_eq!(inside_hidden[0].path, secret);
    }

    #[tokio::test]
    async fn test_walk_search_is_case_insensitive() {
        let tmp = tree();
        let search = DeepSearch::new(
            SearchBackend::Walk,
            vec![tmp.path().to_path_buf()],
            Duration::from_secs(5),
        );

        let outcome = search.search("INVOICE", 20, None).await;
        assert!(outcome.error.is_none());
        let names: Vec<_> = outcome.results.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"invoice_march.pdf"));
        assert!(names.contains(&"Invoices"));
        assert!(!names.contains(&"invoice_secret.pdf"));
    }

    #[tokio::test]
    async fn test_walk_search_respects_scope_and_empty_query() {
        let tmp = tree();
        let search = DeepSearch::new(SearchBackend::Walk, Vec::new(), Duration::from_secs(5));

        let scoped = search
            .search("notes", 20, Some(tmp.path().join("Projects").as_path()))
            .await;
        assert_eq!(scoped.results.len(), 1);

        let empty = search.search("   ", 20, Some(tmp.path())).await;
        assert!(empty.is_empty());
        assert!(empty.error.is_none());
    }

    #[tokio::test]
    async fn test_recently_modified_by_walk() {
        let tmp = tree();
        let old = tmp.path().join("Projects/notes.txt");
        filetime::set_file_mtime(&old, filetime::FileTime::from_unix_time(1_000_000_000, 0))
            .unwrap();

        let search = DeepSearch::new(
            SearchBackend::Walk,
            vec![tmp.path().to_path_buf()],
            Duration::from_secs(5),
        );
        let outcome = search
            .recently_modified(Duration::from_secs(24 * 3600), 20)
            .await;
        let names: Vec<_> = outcome.results.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["invoice_march.pdf"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_native_command_timeout_is_reported() {
        let err = run_search_command("sleep", &["5".to_string()], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, AwarenessError::ExternalSearchFailed { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_program_is_search_failure() {
        let search = DeepSearch::new(SearchBackend::Spotlight, Vec::new(), Duration::from_secs(1));
        if binary_available("mdfind") {
            return;
        }
        let outcome = search.search("anything", 5, None).await;
        assert!(outcome.results.is_empty());
        assert!(outcome.error.is_some());
    }
}
