//! Change detection for the quick-index folders.
//!
//! The strategy is picked once at start: native notifications through
//! `notify`, or polling each folder's modification time. Native bursts are
//! debounced to at most one callback per interval, with a trailing call so
//! the last change of a burst is never lost.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use shared::error::AwarenessError;
use shared::settings::WatchMode;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Strategy in use by a running watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStrategy {
    Events,
    Polling,
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub folders: Vec<PathBuf>,
    pub mode: WatchMode,
    pub poll_interval: Duration,
    pub debounce: Duration,
}

/// Minimum spacing between callbacks.
#[derive(Debug)]
pub struct Debounce {
    interval: Duration,
    last_fire: Option<Instant>,
}

impl Debounce {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fire: None,
        }
    }

    /// Whether a callback may fire at `now`; records the firing if so.
    pub fn ready(&mut self, now: Instant) -> bool {
        let ready = match self.last_fire {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        };
        if ready {
            self.last_fire = Some(now);
        }
        ready
    }

    /// Time left before the next callback may fire.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_fire {
            Some(last) => self
                .interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }
}

enum Backend {
    Native {
        watcher: RecommendedWatcher,
        dispatcher: JoinHandle<()>,
    },
    Polling {
        stop: Sender<()>,
        poller: JoinHandle<()>,
    },
}

pub struct FileWatcher {
    backend: Option<Backend>,
    strategy: WatchStrategy,
}

impl FileWatcher {
    /// Start watching. In `Auto` mode a native watcher that cannot be
    /// created falls back to polling; in `Events` mode it is an error.
    pub fn start(config: WatcherConfig, callback: ChangeCallback) -> anyhow::Result<Self> {
        if config.mode != WatchMode::Polling {
            match start_native(&config, callback.clone()) {
                Ok(backend) => {
                    info!(folders = config.folders.len(), "File watcher using native events");
                    return Ok(Self {
                        backend: Some(backend),
                        strategy: WatchStrategy::Events,
                    });
                }
                Err(e) if config.mode == WatchMode::Auto => {
                    warn!(error = %e, "Native file events unavailable, polling instead");
                }
                Err(e) => return Err(e),
            }
        }

        let backend = start_polling(&config, callback)?;
        info!(
            folders = config.folders.len(),
            interval_secs = config.poll_interval.as_secs(),
            "File watcher polling"
        );
        Ok(Self {
            backend: Some(backend),
            strategy: WatchStrategy::Polling,
        })
    }

    pub fn strategy(&self) -> WatchStrategy {
        self.strategy
    }

    pub fn is_running(&self) -> bool {
        self.backend.is_some()
    }

    /// Stop watching and wait for the background thread to exit.
    pub fn stop(&mut self) {
        match self.backend.take() {
            Some(Backend::Native {
                watcher,
                dispatcher,
            }) => {
                // Dropping the watcher closes the event channel.
                drop(watcher);
                let _ = dispatcher.join();
            }
            Some(Backend::Polling { stop, poller }) => {
                let _ = stop.send(());
                let _ = poller.join();
            }
            None => return,
        }
        debug!("File watcher stopped");
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn start_native(config: &WatcherConfig, callback: ChangeCallback) -> anyhow::Result<Backend> {
    let (tx, rx) = mpsc::channel::<()>();
    let mut watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
        match result {
            Ok(event) => {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(_)
                ) {
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        }
    })?;

    for folder in &config.folders {
        if let Err(e) = watcher.watch(folder, RecursiveMode::NonRecursive) {
            warn!(folder = %folder.display(), error = %e, "Folder not watched");
        }
    }

    let dispatcher = spawn_dispatcher(rx, config.debounce, callback)?;
    Ok(Backend::Native {
        watcher,
        dispatcher,
    })
}

/// Collapse raw events into debounced callbacks until the channel closes.
fn spawn_dispatcher(
    rx: Receiver<()>,
    interval: Duration,
    callback: ChangeCallback,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("file-watcher-dispatch".into())
        .spawn(move || {
            let mut debounce = Debounce::new(interval);
            while rx.recv().is_ok() {
                loop {
                    let now = Instant::now();
                    if debounce.ready(now) {
                        callback();
                        break;
                    }
                    match rx.recv_timeout(debounce.remaining(now)) {
                        Ok(()) | Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
            }
        })
}

fn folder_mtimes(folders: &[PathBuf]) -> HashMap<PathBuf, Option<SystemTime>> {
    folders
        .iter()
        .map(|f| {
            let mtime = std::fs::metadata(f).and_then(|m| m.modified()).ok();
            (f.clone(), mtime)
        })
        .collect()
}

fn start_polling(config: &WatcherConfig, callback: ChangeCallback) -> anyhow::Result<Backend> {
    let (stop, stop_rx) = mpsc::channel::<()>();
    let folders = config.folders.clone();
    let interval = config.poll_interval;

    for folder in &folders {
        if !folder.exists() {
            let err = std::io::Error::from(std::io::ErrorKind::NotFound);
            warn!(error = %AwarenessError::unavailable(folder, &err), "Polling a missing folder");
        }
    }

    let poller = std::thread::Builder::new()
        .name("file-watcher-poll".into())
        .spawn(move || {
            let mut previous = folder_mtimes(&folders);
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
                let current = folder_mtimes(&folders);
                if current != previous {
                    debug!("Watched folder changed");
                    callback();
                }
                previous = current;
            }
        })?;

    Ok(Backend::Polling { stop, poller })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn counting_callback() -> (ChangeCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            count,
        )
    }

    fn wait_for(count: &AtomicUsize, at_least: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) >= at_least {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_debounce_spacing() {
        let start = Instant::now();
        let mut d = Debounce::new(Duration::from_secs(5));
        assert!(d.ready(start));
        assert!(!d.ready(start + Duration::from_secs(1)));
        assert_eq!(d.remaining(start + Duration::from_secs(1)), Duration::from_secs(4));
        assert!(!d.ready(start + Duration::from_secs(4)));
        assert!(d.ready(start + Duration::from_secs(5)));
        assert_eq!(d.remaining(start + Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[test]
    fn test_dispatcher_collapses_burst() {
        let (callback, count) = counting_callback();
        let (tx, rx) = mpsc::channel();
        let handle = spawn_dispatcher(rx, Duration::from_millis(200), callback).unwrap();

        for _ in 0..10 {
            tx.send(()).unwrap();
        }
        // Leading call right away, one trailing call after the interval.
        assert!(wait_for(&count, 2, Duration::from_secs(2)));
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        drop(tx);
        handle.join().unwrap();
    }

    #[test]
    fn test_polling_detects_new_file() {
        let tmp = TempDir::new().unwrap();
        let (callback, count) = counting_callback();
        let config = WatcherConfig {
            folders: vec![tmp.path().to_path_buf(), tmp.path().join("missing")],
            mode: WatchMode::Polling,
            poll_interval: Duration::from_millis(50),
            debounce: Duration::from_millis(50),
        };
        let mut watcher = FileWatcher::start(config, callback).unwrap();
        assert_eq!(watcher.strategy(), WatchStrategy::Polling);

        std::thread::sleep(Duration::from_millis(120));
        filetime::set_file_mtime(tmp.path(), filetime::FileTime::from_unix_time(1_000_000_000, 0))
            .unwrap();
        assert!(wait_for(&count, 1, Duration::from_secs(2)));

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[test]
    fn test_auto_mode_reports_changes() {
        let tmp = TempDir::new().unwrap();
        let (callback, count) = counting_callback();
        let config = WatcherConfig {
            folders: vec![tmp.path().to_path_buf()],
            mode: WatchMode::Auto,
            poll_interval: Duration::from_millis(50),
            debounce: Duration::from_millis(50),
        };
        let watcher = FileWatcher::start(config, callback).unwrap();

        std::thread::sleep(Duration::from_millis(120));
        std::fs::write(tmp.path().join("new.txt"), "x").unwrap();
        filetime::set_file_mtime(tmp.path(), filetime::FileTime::from_unix_time(1_000_000_000, 0))
            .unwrap();
        assert!(wait_for(&count, 1, Duration::from_secs(3)));
        drop(watcher);
    }
}
