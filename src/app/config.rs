use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_API_BASE_URL, HTTP_REQUEST_TIMEOUT_SECS, SESSION_STORE_FILE,
    SESSION_SWEEP_INTERVAL_SECS,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Remote API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Session persistence and expiry configuration
    #[serde(default)]
    pub session: SessionConfig,
}

/// Remote API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every endpoint is joined onto
    pub base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: HTTP_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between expiry checks of the held token
    pub sweep_interval_secs: u64,
    /// Where the session is persisted; defaults to the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: SESSION_SWEEP_INTERVAL_SECS,
            store_path: None,
        }
    }
}

impl SessionConfig {
    pub fn sweep_interval(&self) -> Duration {
        // A zero period would spin
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Session file location
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_config_dir()?.join(SESSION_STORE_FILE)),
        }
    }
}

fn figment(global: Option<&Path>, local: &Path, explicit: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if let Some(global) = global.filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(global));
    }

    if local.exists() {
        figment = figment.merge(Toml::file(local));
    }

    // PLAZA_API__BASE_URL -> api.base_url
    figment = figment.merge(Env::prefixed("PLAZA_").split("__"));

    if let Some(explicit) = explicit {
        figment = figment.merge(Toml::file(explicit));
    }

    figment
}

/// Load configuration from multiple sources
///
/// Later sources win: defaults, the global file, `.plaza/config.toml`,
/// `PLAZA_*` environment variables, then an explicitly named file.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
    }

    let global_config = get_config_dir()?.join("config.toml");
    let local_config = PathBuf::from(".plaza/config.toml");

    figment(Some(&global_config), &local_config, explicit)
        .extract()
        .context("Failed to load configuration")
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "plaza") {
        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;
        Ok(config_dir.to_path_buf())
    } else {
        // Fallback to home directory
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Could not determine home directory")?;
        let config_dir = PathBuf::from(home).join(".config").join("plaza");
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = if let Some(p) = path {
        p
    } else {
        get_config_dir()?.join("config.toml")
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

/// Create a default configuration file if it doesn't exist. Returns the
/// path when a file was written.
pub fn init_config() -> Result<Option<PathBuf>> {
    let config_file = get_config_dir()?.join("config.toml");
    if config_file.exists() {
        return Ok(None);
    }

    save_config(&Config::default(), Some(config_file.clone()))?;
    Ok(Some(config_file))
}
