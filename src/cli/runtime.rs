use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use relay_bridge::{JsonFileStore, SharedStore};
use sentinel_policy_center::{load_policy, SentinelPolicy};

use crate::http_relay::{HttpRelay, HttpRelayConfig};

pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

pub struct LoadedConfig {
    pub policy: SentinelPolicy,
    pub path: PathBuf,
}

/// Explicit path, else `./config/sentinel.yaml`, else `<config dir>/sentinel/config.yaml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let local = PathBuf::from("config/sentinel.yaml");
    if local.exists() {
        return Ok(local);
    }
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("sentinel");
    path.push("config.yaml");
    Ok(path)
}

pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = resolve_config_path(explicit)?;
    if path.exists() {
        info!("Loading policy from: {}", path.display());
    } else {
        warn!("Policy file not found, using defaults: {}", path.display());
    }
    let policy = load_policy(Some(path.as_path()))
        .with_context(|| format!("Failed to load policy from {}", path.display()))?;
    Ok(LoadedConfig { policy, path })
}

pub fn default_data_dir() -> Result<PathBuf> {
    let mut path = dirs::data_dir().context("Failed to get data directory")?;
    path.push("sentinel");
    Ok(path)
}

pub fn open_store(data_dir: Option<PathBuf>) -> Result<SharedStore> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    info!("Using data directory: {}", dir.display());
    Ok(JsonFileStore::new(dir) as SharedStore)
}

/// HTTP relay from the policy, with optional command-line overrides.
pub fn build_relay(
    policy: &SentinelPolicy,
    base_url: Option<String>,
    api_key: Option<String>,
) -> Result<Arc<HttpRelay>> {
    let mut config = HttpRelayConfig::from_policy(&policy.relay);
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    if let Some(api_key) = api_key.filter(|key| !key.is_empty()) {
        config.api_key = Some(api_key);
    }
    let relay = HttpRelay::new(config).context("Failed to build HTTP relay")?;
    Ok(Arc::new(relay))
}
