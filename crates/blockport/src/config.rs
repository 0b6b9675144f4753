//! Configuration file loading and parsing.
//!
//! blockport reads an optional `blockport.toml` (or the file named by
//! `BLOCKPORT_CONFIG`). If no config file exists, every setting falls back to
//! its default.

use crate::errors::invalid_config;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "blockport.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "BLOCKPORT_CONFIG";

/// Environment variable overriding `[library].root`.
pub const LIBRARY_ENV: &str = "BLOCKPORT_LIBRARY";

/// Root configuration structure loaded from `blockport.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockportConfig {
    /// Import pipeline tuning (optional).
    pub sync: Option<SyncConfig>,
    /// Local media library (optional).
    pub library: Option<LibraryConfig>,
    /// Control endpoint server (optional).
    pub server: Option<ServerConfig>,
}

/// Import pipeline tuning.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// Resolution cache entry lifetime in seconds (default: 3600).
    pub cache_ttl_secs: Option<u64>,
    /// Resolution cache capacity (default: 10000).
    pub cache_capacity: Option<u64>,
    /// Per-download timeout in seconds (default: 300).
    pub fetch_timeout_secs: Option<u64>,
    /// Parallel downloads per document (default: 4).
    pub max_concurrent_fetches: Option<usize>,
    /// Largest accepted download in bytes (default: 64 MiB).
    pub max_download_bytes: Option<u64>,
}

impl SyncConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.unwrap_or(3600))
    }

    pub fn cache_capacity(&self) -> u64 {
        self.cache_capacity.unwrap_or(10_000)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.unwrap_or(300))
    }

    /// Worker count, never below one.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_concurrent_fetches.unwrap_or(4).max(1)
    }

    pub fn max_download_bytes(&self) -> u64 {
        self.max_download_bytes.unwrap_or(64 * 1024 * 1024)
    }
}

/// Local media library settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibraryConfig {
    /// Library directory (overridden by `BLOCKPORT_LIBRARY`).
    pub root: Option<PathBuf>,
    /// Public URL prefix used when initializing a library.
    pub public_base_url: Option<String>,
}

/// Control endpoint server settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Listen address (default: "0.0.0.0:3000").
    pub bind: Option<String>,
    /// Bearer token required for edit operations; open when unset.
    pub edit_token: Option<String>,
}

impl ServerConfig {
    pub fn bind(&self) -> String {
        self.bind
            .clone()
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
    }
}

impl BlockportConfig {
    /// Load configuration from `path` if it exists.
    ///
    /// Returns an empty config (all sections None) if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: BlockportConfig = toml::from_str(&content)
            .map_err(|e| invalid_config(path, &e.to_string()))?;

        Ok(config)
    }

    /// Load from an explicit path, else `BLOCKPORT_CONFIG`, else
    /// `blockport.toml` in the working directory.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => std::env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };
        Self::load(&path)
    }

    /// Sync settings with defaults for a missing section.
    pub fn sync(&self) -> SyncConfig {
        self.sync.clone().unwrap_or_default()
    }

    /// Server settings with defaults for a missing section.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Library root: `BLOCKPORT_LIBRARY` first, then `[library].root`.
    pub fn library_root(&self) -> Option<PathBuf> {
        std::env::var_os(LIBRARY_ENV)
            .map(PathBuf::from)
            .or_else(|| self.library.as_ref().and_then(|l| l.root.clone()))
    }

    pub fn public_base_url(&self) -> Option<String> {
        self.library
            .as_ref()
            .and_then(|l| l.public_base_url.clone())
    }
}
