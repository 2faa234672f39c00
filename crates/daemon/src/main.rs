//! Headless filesystem awareness service.
//!
//! Usage: `awareness-daemon [settings.json]`. Without an argument the
//! per-user settings file is used; a missing file means defaults.

use anyhow::{Context, Result};
use services::SystemAwareness;
use shared::settings::AwarenessSettings;
use shared::skill::Mode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn settings_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(AwarenessSettings::config_path)
}

fn load_settings() -> AwarenessSettings {
    match settings_path() {
        Some(path) => {
            info!(path = %path.display(), "Loading settings");
            AwarenessSettings::load_or_default(&path)
        }
        None => {
            warn!("No settings location available, using defaults");
            AwarenessSettings::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let sync_interval = Duration::from_secs(settings.sync_interval_mins.max(1) * 60);
    let data_dir = settings.data_dir.clone();

    let awareness = Arc::new(
        SystemAwareness::new(settings).context("Failed to open the knowledge base")?,
    );
    awareness.start()?;
    awareness.start_periodic_sync(sync_interval);

    let registry = agent_host::init_registry(awareness.clone());
    for mode in Mode::all() {
        info!(
            mode = mode.display_name(),
            skills = registry.for_mode(*mode).len(),
            "Skills ready"
        );
    }
    info!(
        data_dir = %data_dir.display(),
        sync_interval_mins = sync_interval.as_secs() / 60,
        "Awareness daemon running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");
    awareness.shutdown().await;
    Ok(())
}
