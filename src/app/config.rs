use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::library::Playlist;
use crate::metadata::DEFAULT_PREFIX_BYTES;

/// User-editable settings, stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Key the persisted document lives under.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Byte-range proxy endpoint. Without one, tracks are fetched directly
    /// with a `Range` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(default = "default_prefix_bytes")]
    pub prefix_bytes: usize,
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,
    #[serde(default = "default_store_poll_ms")]
    pub store_poll_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Read-only playlists shipped with the player.
    #[serde(default = "default_playlists")]
    pub playlists: Vec<Playlist>,
}

fn default_storage_key() -> String {
    "Playlists".to_string()
}

fn default_prefix_bytes() -> usize {
    DEFAULT_PREFIX_BYTES
}

fn default_save_debounce_ms() -> u64 {
    800
}

fn default_store_poll_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_playlists() -> Vec<Playlist> {
    vec![Playlist::new("Pop"), Playlist::new("Peace")]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            proxy_url: None,
            prefix_bytes: default_prefix_bytes(),
            save_debounce_ms: default_save_debounce_ms(),
            store_poll_ms: default_store_poll_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            playlists: default_playlists(),
        }
    }
}

impl Settings {
    pub fn config_dir() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("playdeck")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// One JSON file per storage key lives here.
    pub fn state_dir() -> PathBuf {
        Self::config_dir().join("state")
    }

    pub fn log_dir() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".cache").join("playdeck")
    }

    /// Loads `path` (or the default location). A missing file is created
    /// with defaults; an unreadable or malformed one is ignored.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        if !path.exists() {
            let settings = Self::default();
            if let Err(e) = settings.save(&path) {
                warn!(path = %path.display(), error = %e, "could not write default config");
            }
            return settings;
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "malformed config, using defaults");
                Self::default()
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable config, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid config.toml")
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render config")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn store_poll(&self) -> Duration {
        Duration::from_millis(self.store_poll_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
