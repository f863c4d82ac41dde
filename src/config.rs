//! Configuration file handling.
//!
//! Settings come from an optional `signal-analytics.toml`; command-line
//! flags and `DATABASE_URL` override whatever the file says.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::geo::{DistrictCatalog, DEFAULT_TOP_DISTRICTS};

pub const DEFAULT_CONFIG_FILE: &str = "signal-analytics.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Upstream store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Postgres connection string. `DATABASE_URL` takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Upper bound on rows fetched per request.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
            fetch_limit: default_fetch_limit(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_fetch_limit() -> i64 {
    60_000
}

/// Reducer parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_point_limit")]
    pub point_limit: usize,

    #[serde(default = "default_top_districts")]
    pub top_districts: usize,

    #[serde(default = "default_district_operators")]
    pub district_operators: Vec<String>,

    #[serde(default = "default_district_network_types")]
    pub district_network_types: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            point_limit: default_point_limit(),
            top_districts: default_top_districts(),
            district_operators: default_district_operators(),
            district_network_types: default_district_network_types(),
        }
    }
}

impl EngineConfig {
    pub fn catalog(&self) -> DistrictCatalog {
        DistrictCatalog {
            operators: self.district_operators.clone(),
            network_types: self.district_network_types.clone(),
        }
    }
}

fn default_point_limit() -> usize {
    60_000
}

fn default_top_districts() -> usize {
    DEFAULT_TOP_DISTRICTS
}

fn default_district_operators() -> Vec<String> {
    DistrictCatalog::default().operators
}

fn default_district_network_types() -> Vec<String> {
    DistrictCatalog::default().network_types
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Returns `Ok(None)` when the default file does not exist.
    pub fn load_default() -> Result<Option<Self>> {
        let path = Path::new(DEFAULT_CONFIG_FILE);

        if path.exists() {
            Ok(Some(Self::load(path)?))
        } else {
            Ok(None)
        }
    }

    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Config::default()).context("failed to render default config")
    }

    pub fn database_url(&self) -> Result<&str> {
        self.store
            .database_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .context("DATABASE_URL must be set (or store.database_url in the config file)")
    }
}
