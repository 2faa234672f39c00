//! Layer 1: device facts, installed applications, storage and key folders.
//!
//! Hardware info is gathered once and kept. The application inventory is
//! rescanned only when an install directory changed after the last scan.
//! Storage is recomputed on every refresh.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use shared::awareness::{AppEntry, DeviceInfo, StorageInfo, SystemProfile};
use shared::settings::AwarenessSettings;
use shared::snapshot_file::{read_json, write_json_atomic};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of host facts, swappable in tests.
pub trait SystemProbe: Send + Sync {
    fn device_info(&self) -> anyhow::Result<DeviceInfo>;
    fn storage_info(&self) -> anyhow::Result<StorageInfo>;
    fn key_folders(&self) -> BTreeMap<String, PathBuf>;
}

/// Probe backed by the running machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProbe;

impl SystemProbe for HostProbe {
    fn device_info(&self) -> anyhow::Result<DeviceInfo> {
        let name = Command::new("hostname")
            .output()
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(DeviceInfo {
            name,
            os: os_name(),
            arch: std::env::consts::ARCH.to_string(),
            model: hardware_model(),
            cpu_cores: std::thread::available_parallelism().ok().map(|n| n.get()),
            total_ram_gb: total_ram_gb(),
        })
    }

    fn storage_info(&self) -> anyhow::Result<StorageInfo> {
        let output = Command::new("df").args(["-h", "/"]).output()?;
        if !output.status.success() {
            anyhow::bail!("df exited with {}", output.status);
        }
        parse_df_output(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| anyhow::anyhow!("unexpected df output"))
    }

    fn key_folders(&self) -> BTreeMap<String, PathBuf> {
        let mut folders = BTreeMap::new();
        let known = [
            ("home", dirs::home_dir()),
            ("desktop", dirs::desktop_dir()),
            ("downloads", dirs::download_dir()),
            ("documents", dirs::document_dir()),
            ("pictures", dirs::picture_dir()),
            ("music", dirs::audio_dir()),
            ("movies", dirs::video_dir()),
        ];
        for (key, path) in known {
            if let Some(path) = path {
                folders.insert(key.to_string(), path);
            }
        }
        folders
    }
}

#[cfg(target_os = "macos")]
fn os_name() -> String {
    Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .map(|o| format!("macOS {}", String::from_utf8_lossy(&o.stdout).trim()))
        .unwrap_or_else(|_| "macOS".to_string())
}

#[cfg(target_os = "linux")]
fn os_name() -> String {
    let os_release = std::fs::read_to_string("/etc/os-release").unwrap_or_default();
    os_release
        .lines()
        .find(|l| l.starts_with("PRETTY_NAME="))
        .and_then(|l| l.split('=').nth(1))
        .map(|s| s.trim_matches('"').to_string())
        .unwrap_or_else(|| "Linux".to_string())
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn os_name() -> String {
    std::env::consts::OS.to_string()
}

#[cfg(target_os = "macos")]
fn hardware_model() -> Option<String> {
    sysctl("hw.model")
}

#[cfg(not(target_os = "macos"))]
fn hardware_model() -> Option<String> {
    std::fs::read_to_string("/sys/devices/virtual/dmi/id/product_name")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(target_os = "macos")]
fn total_ram_gb() -> Option<f32> {
    let bytes: u64 = sysctl("hw.memsize")?.parse().ok()?;
    Some(bytes as f32 / (1024.0 * 1024.0 * 1024.0))
}

#[cfg(target_os = "linux")]
fn total_ram_gb() -> Option<f32> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let kb: u64 = meminfo
        .lines()
        .find(|l| l.starts_with("MemTotal:"))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()?;
    Some(kb as f32 / (1024.0 * 1024.0))
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn total_ram_gb() -> Option<f32> {
    None
}

#[cfg(target_os = "macos")]
fn sysctl(key: &str) -> Option<String> {
    let output = Command::new("sysctl").args(["-n", key]).output().ok()?;
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Parse the data row of `df -h /`.
fn parse_df_output(output: &str) -> Option<StorageInfo> {
    let line = output.lines().nth(1)?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return None;
    }
    Some(StorageInfo {
        total: Some(parts[1].to_string()),
        used: Some(parts[2].to_string()),
        free: Some(parts[3].to_string()),
        capacity: Some(parts[4].to_string()),
    })
}

pub struct SystemProfiler {
    probe: Box<dyn SystemProbe>,
    app_dirs: Vec<PathBuf>,
    app_extensions: Vec<String>,
    profile_path: PathBuf,
    profile: RwLock<Arc<SystemProfile>>,
    refresh_lock: Mutex<()>,
}

impl SystemProfiler {
    pub fn new(settings: &AwarenessSettings) -> Self {
        Self::with_probe(Box::new(HostProbe), settings)
    }

    pub fn with_probe(probe: Box<dyn SystemProbe>, settings: &AwarenessSettings) -> Self {
        Self {
            probe,
            app_dirs: settings.app_dirs.clone(),
            app_extensions: settings.app_extensions.clone(),
            profile_path: settings.profile_path(),
            profile: RwLock::new(Arc::new(SystemProfile::default())),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Load the persisted profile, if any. Returns whether one was found.
    pub fn load(&self) -> bool {
        match read_json::<SystemProfile>(&self.profile_path) {
            Some(profile) => {
                debug!(apps = profile.apps.len(), "Loaded system profile");
                *self.profile.write() = Arc::new(profile);
                true
            }
            None => false,
        }
    }

    /// Latest profile; never waits on a refresh in progress.
    pub fn profile(&self) -> Arc<SystemProfile> {
        self.profile.read().clone()
    }

    /// Bring the profile up to date and persist it.
    ///
    /// Probe failures are logged and leave the previous values in place.
    pub fn refresh_profile(&self) -> Arc<SystemProfile> {
        let _guard = self.refresh_lock.lock();
        let mut profile = (*self.profile()).clone();

        if profile.device.is_none() {
            match self.probe.device_info() {
                Ok(device) => profile.device = Some(device),
                Err(e) => warn!(error = %e, "Device info unavailable"),
            }
        }

        if self.apps_need_rescan(profile.apps_last_scan) {
            // Stamp before scanning so installs during the scan trigger another pass.
            let started = Utc::now();
            profile.apps = self.scan_applications();
            profile.apps_last_scan = Some(started);
            info!(apps = profile.apps.len(), "Application inventory rescanned");
        }

        match self.probe.storage_info() {
            Ok(storage) => profile.storage = storage,
            Err(e) => warn!(error = %e, "Storage info unavailable"),
        }

        if profile.key_folders.is_empty() {
            profile.key_folders = self.probe.key_folders();
        }

        profile.last_updated = Some(Utc::now());
        let profile = Arc::new(profile);
        *self.profile.write() = profile.clone();

        if let Err(e) = write_json_atomic(&self.profile_path, profile.as_ref()) {
            warn!(error = %e, "Failed to save system profile");
        }
        profile
    }

    fn apps_need_rescan(&self, last_scan: Option<DateTime<Utc>>) -> bool {
        let Some(last_scan) = last_scan else {
            return true;
        };
        self.app_dirs.iter().any(|dir| match std::fs::metadata(dir).and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified) > last_scan,
            Err(_) => false,
        })
    }

    fn scan_applications(&self) -> Vec<AppEntry> {
        let mut seen = HashSet::new();
        let mut apps = Vec::new();

        for dir in &self.app_dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    if dir.exists() {
                        warn!(dir = %dir.display(), error = %e, "Cannot scan application directory");
                    }
                    continue;
                }
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if !self.is_application(&path) {
                    continue;
                }
                let Some(name) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                    continue;
                };
                if seen.insert(name.clone()) {
                    apps.push(AppEntry { name, path });
                }
            }
        }

        apps.sort_by(|a, b| a.name.cmp(&b.name));
        apps
    }

    fn is_application(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy();
                self.app_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }

    /// Case-insensitive exact name match, then substring match.
    pub fn resolve_app_path(&self, name: &str) -> Option<PathBuf> {
        let query = name.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        let profile = self.profile();
        profile
            .apps
            .iter()
            .find(|app| app.name.to_lowercase() == query)
            .or_else(|| {
                profile
                    .apps
                    .iter()
                    .find(|app| app.name.to_lowercase().contains(&query))
            })
            .map(|app| app.path.clone())
    }
}
