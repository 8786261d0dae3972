//! Application configuration management.
//!
//! This module handles loading and saving the dashboard configuration: the
//! backend origin that proxied API paths are forwarded to, the origin the
//! dashboard itself is served from, and request timeouts.
//!
//! Configuration is stored at `~/.config/sensedash/config.json`. The origins
//! can be overridden with `SENSEDASH_BACKEND_ORIGIN` and `SENSEDASH_APP_ORIGIN`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "sensedash";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const BACKEND_ORIGIN_ENV: &str = "SENSEDASH_BACKEND_ORIGIN";
const APP_ORIGIN_ENV: &str = "SENSEDASH_APP_ORIGIN";

/// Backend the dev proxy forwards API paths to
const DEFAULT_BACKEND_ORIGIN: &str = "http://localhost:8080";

/// Origin serving the dashboard itself
const DEFAULT_APP_ORIGIN: &str = "http://localhost:5173";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

fn default_proxy_prefixes() -> Vec<String> {
    vec!["/sense".to_string(), "/user".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_origin: String,
    pub app_origin: String,
    /// Path prefixes forwarded to `backend_origin`
    pub proxy_prefixes: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_origin: DEFAULT_BACKEND_ORIGIN.to_string(),
            app_origin: DEFAULT_APP_ORIGIN.to_string(),
            proxy_prefixes: default_proxy_prefixes(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load from the config file (defaults if missing), then apply env overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(origin) = lookup(BACKEND_ORIGIN_ENV).filter(|v| !v.is_empty()) {
            self.backend_origin = origin;
        }
        if let Some(origin) = lookup(APP_ORIGIN_ENV).filter(|v| !v.is_empty()) {
            self.app_origin = origin;
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Turn a request URL into an absolute one.
    ///
    /// Absolute URLs pass through. Relative paths under a proxy prefix go to
    /// the backend, everything else to the app origin.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        let path = if url.starts_with('/') {
            url.to_string()
        } else {
            format!("/{}", url)
        };
        let origin = if self.is_proxied(&path) {
            &self.backend_origin
        } else {
            &self.app_origin
        };
        format!("{}{}", origin.trim_end_matches('/'), path)
    }

    fn is_proxied(&self, path: &str) -> bool {
        self.proxy_prefixes.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .map(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
                .unwrap_or(false)
        })
    }
}
