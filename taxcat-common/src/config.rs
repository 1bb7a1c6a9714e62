//! Configuration loading and resolution
//!
//! Bootstrap configuration lives in a TOML file. Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`TAXCAT_CONFIG`)
//! 3. Per-user config file (`<config_dir>/taxcat/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! Individual keys can further be overridden by `TAXCAT_BASE_URL` and
//! `TAXCAT_AUTH_TOKEN`; the binary applies its own CLI overrides last.

use crate::model::{DEFAULT_CHUNK_SIZE, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_PATH_ENV: &str = "TAXCAT_CONFIG";
pub const BASE_URL_ENV: &str = "TAXCAT_BASE_URL";
pub const AUTH_TOKEN_ENV: &str = "TAXCAT_AUTH_TOKEN";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Catalog service connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Transport timeout per request; uploads add no timeout of their own
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bearer token forwarded on every request (optional)
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// Bulk upload tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// Query controller tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            auth_token: None,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            page_size: default_page_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl QueryConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TomlConfig {
    /// Parse TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the uploader or the catalog service cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.upload.chunk_size == 0 {
            return Err(Error::Config("upload.chunk_size must be at least 1".to_string()));
        }
        if self.query.page_size == 0 || self.query.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "query.page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if self.service.base_url.trim().is_empty() {
            return Err(Error::Config("service.base_url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Apply `TAXCAT_BASE_URL` / `TAXCAT_AUTH_TOKEN` when set and non-empty
    ///
    /// Returns the names of the variables that were applied.
    pub fn apply_env_overrides(&mut self) -> Vec<&'static str> {
        let mut applied = Vec::new();
        if let Some(url) = non_empty_env(BASE_URL_ENV) {
            self.service.base_url = url;
            applied.push(BASE_URL_ENV);
        }
        if let Some(token) = non_empty_env(AUTH_TOKEN_ENV) {
            self.service.auth_token = Some(token);
            applied.push(AUTH_TOKEN_ENV);
        }
        applied
    }

    /// Apply command-line overrides (highest priority) and re-validate
    pub fn apply_cli_overrides(
        &mut self,
        base_url: Option<String>,
        auth_token: Option<String>,
    ) -> Result<()> {
        if let Some(url) = base_url {
            self.service.base_url = url;
        }
        if let Some(token) = auth_token {
            self.service.auth_token = Some(token);
        }
        self.validate()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Locate the config file to read
///
/// Returns the path and whether it was requested explicitly (CLI or ENV), in
/// which case a missing file is an error rather than a fallback to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<(PathBuf, bool)> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), true));
    }

    // Priority 2: Environment variable
    if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
        return Some((PathBuf::from(path), true));
    }

    // Priority 3: Per-user config file
    default_config_path().map(|p| (p, false))
}

/// `<config_dir>/taxcat/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("taxcat").join("config.toml"))
}

/// Where the loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// Compiled defaults; `missing` is the implicit path that had no file
    Defaults { missing: Option<PathBuf> },
}

/// Resolved configuration plus how it was resolved
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: ConfigSource,
    /// Environment variables that overrode file values
    pub env_overrides: Vec<&'static str>,
}

impl LoadedConfig {
    /// Log the resolution outcome
    ///
    /// Resolution itself logs nothing, so the binary can install its
    /// subscriber (which needs the config) first and report afterwards.
    pub fn log(&self) {
        match &self.source {
            ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigSource::Defaults {
                missing: Some(path),
            } => warn!(
                "No config file at {}; using compiled defaults",
                path.display()
            ),
            ConfigSource::Defaults { missing: None } => {
                warn!("Could not determine config directory; using compiled defaults")
            }
        }
        for name in &self.env_overrides {
            info!("Configuration overridden by {}", name);
        }
    }
}

/// Resolve configuration following the resolution priority, then apply
/// environment overrides, without logging
///
/// A missing implicit config file is not an error: compiled defaults are
/// used and the outcome is reported through `LoadedConfig::log`.
pub fn resolve_config(cli_arg: Option<&Path>) -> Result<LoadedConfig> {
    let (mut config, source) = match resolve_config_path(cli_arg) {
        Some((path, _)) if path.exists() => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
            (TomlConfig::from_toml_str(&content)?, ConfigSource::File(path))
        }
        Some((path, true)) => {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Some((path, false)) => (
            TomlConfig::default(),
            ConfigSource::Defaults {
                missing: Some(path),
            },
        ),
        None => (TomlConfig::default(), ConfigSource::Defaults { missing: None }),
    };

    let env_overrides = config.apply_env_overrides();
    config.validate()?;
    Ok(LoadedConfig {
        config,
        source,
        env_overrides,
    })
}

/// Resolve configuration and log the outcome immediately
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let loaded = resolve_config(cli_arg)?;
    loaded.log();
    Ok(loaded.config)
}

/// Write configuration as TOML (used by `taxcat` to seed a config file)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.upload.chunk_size, 2000);
        assert_eq!(config.query.debounce(), Duration::from_millis(300));
        assert_eq!(config.query.page_size, 15);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [service]
            base_url = "https://catalog.example"

            [query]
            debounce_ms = 150
            "#,
        )
        .unwrap();
        assert_eq!(config.service.base_url, "https://catalog.example");
        assert_eq!(config.service.timeout_secs, 30);
        assert_eq!(config.query.debounce_ms, 150);
        assert_eq!(config.query.page_size, 15);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = TomlConfig::from_toml_str("[upload]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_page_size_above_service_limit_rejected() {
        assert!(TomlConfig::from_toml_str("[query]\npage_size = 101\n").is_err());
        assert!(TomlConfig::from_toml_str("[query]\npage_size = 100\n").is_ok());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("[service\nbase_url=").unwrap_err();
        assert!(err.to_string().contains("Parse TOML failed"));
    }
}
