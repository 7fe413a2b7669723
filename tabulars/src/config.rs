//! Configuration system for Tabula.
//!
//! TOML-based; every section is optional and falls back to defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dialect::DialectKind;
use crate::error::{Result, TabulaError};
use crate::schema::SchemaRegistry;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TabulaConfig {
    pub compiler: CompilerConfig,
    pub schema: SchemaConfig,
    pub cache: CacheConfig,
    pub duckdb: DuckDbConfig,
}

/// Query compilation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Placeholder style of the target engine (default: ansi, `?`).
    pub dialect: DialectKind,
    /// Order unaliased columns by select-list position (default: true).
    /// Turn off for engines without ordinal ORDER BY support.
    pub ordinal_order_by: bool,
}

/// Where table definitions come from.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Directory of table YAML files. Unset = built-in business schema.
    pub dir: Option<PathBuf>,
}

/// Caller-side result cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry TTL in seconds (default: 300).
    pub ttl_secs: u64,
    /// Maximum cached reports (default: 256).
    pub max_size: usize,
}

/// DuckDB-specific configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DuckDbConfig {
    /// Database file (default: in-memory).
    pub path: PathBuf,
    /// Maximum concurrent queries (default: 16).
    pub max_concurrency: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Ansi,
            ordinal_order_by: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_size: 256,
        }
    }
}

impl Default for DuckDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            max_concurrency: 16,
        }
    }
}

impl TabulaConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| TabulaError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| TabulaError::Config(format!("failed to parse config: {e}")))
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `TABULA_CONFIG` environment variable
    /// 2. `./tabula.toml` (current directory)
    /// 3. `~/.config/tabula/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("TABULA_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path, "loaded config from TABULA_CONFIG");
                    return cfg;
                }
                Err(err) => tracing::warn!(path = %path, error = %err, "ignoring TABULA_CONFIG"),
            }
        }

        if let Ok(cfg) = Self::from_file("tabula.toml") {
            tracing::info!("loaded config from ./tabula.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tabula").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }

    /// Schema registry named by `[schema] dir`, or the built-in one.
    pub fn load_registry(&self) -> Result<Arc<SchemaRegistry>> {
        let registry = match &self.schema.dir {
            Some(dir) => SchemaRegistry::load_from_dir(dir)?,
            None => SchemaRegistry::business()?,
        };
        Ok(Arc::new(registry))
    }
}
