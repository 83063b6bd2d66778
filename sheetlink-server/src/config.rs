//! Server configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sheetlink_core::ProcessorConfig;
use std::fs;
use std::path::Path;

/// Read from the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "sheetlink.toml";

/// Overrides `server.addr`
pub const ADDR_ENV: &str = "SHEETLINK_ADDR";

/// Full configuration file as seen by the server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Base URL advertised by `GET /docs`
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            max_upload_bytes: default_max_upload_bytes(),
            public_url: default_public_url(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Resolve the configuration: explicit file, then `sheetlink.toml`, then defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };
        Ok(config.with_addr_override(std::env::var(ADDR_ENV).ok()))
    }

    pub fn with_addr_override(mut self, addr: Option<String>) -> Self {
        if let Some(addr) = addr.filter(|a| !a.trim().is_empty()) {
            self.server.addr = addr;
        }
        self
    }
}

fn default_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_public_url() -> String {
    "http://localhost:8000".to_string()
}
