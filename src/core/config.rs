//! Application configuration management
//!
//! Handles loading and saving application settings including:
//! - API base URL and request timeout
//! - Token store backend selection
//! - Circuit breaker tuning for token refresh

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LookbookError, Result};

/// Overrides the configuration directory (useful for tests and CI)
const CONFIG_DIR_ENV: &str = "LOOKBOOK_CONFIG_DIR";

/// Overrides `api_base_url`
const API_URL_ENV: &str = "LOOKBOOK_API_URL";

/// Overrides `token_store`
const TOKEN_STORE_ENV: &str = "LOOKBOOK_TOKEN_STORE";

/// Where credentials are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TokenStoreKind {
    /// System keyring (default)
    #[default]
    Keyring,
    /// JSON file in the configuration directory
    File,
    /// Process memory only, nothing survives a restart
    Memory,
}

impl TokenStoreKind {
    /// Get the configuration identifier
    pub fn name(&self) -> &'static str {
        match self {
            TokenStoreKind::Keyring => "keyring",
            TokenStoreKind::File => "file",
            TokenStoreKind::Memory => "memory",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "keyring" => Some(TokenStoreKind::Keyring),
            "file" => Some(TokenStoreKind::File),
            "memory" => Some(TokenStoreKind::Memory),
            _ => None,
        }
    }

    /// Get all available backends
    pub fn all() -> &'static [TokenStoreKind] {
        &[
            TokenStoreKind::Keyring,
            TokenStoreKind::File,
            TokenStoreKind::Memory,
        ]
    }
}

impl std::fmt::Display for TokenStoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Circuit breaker limits applied to token refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,

    /// Seconds the circuit stays open after the last attempt
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: u64,

    /// Minimum seconds between two refresh attempts
    #[serde(default = "default_min_refresh_interval")]
    pub min_refresh_interval_secs: u64,
}

fn default_max_failures() -> u32 {
    3
}

fn default_reset_timeout() -> u64 {
    60
}

fn default_min_refresh_interval() -> u64 {
    5
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            reset_timeout_secs: default_reset_timeout(),
            min_refresh_interval_secs: default_min_refresh_interval(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_secs)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL every API path is resolved against
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Credential persistence backend
    #[serde(default)]
    pub token_store: TokenStoreKind,

    /// Refresh circuit breaker limits
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api/".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
            token_store: TokenStoreKind::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, or create default if not exists
    ///
    /// Environment overrides are applied on top of the file contents.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load the file contents only, ignoring environment overrides
    ///
    /// Used when the configuration is about to be edited and saved back.
    pub fn load_file() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&config_path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration file contents
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.circuit_breaker.max_failures == 0 {
            return Err(LookbookError::Config(
                "circuit_breaker.max_failures must be at least 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(LookbookError::Config(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(&config_path, contents)?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the configuration directory
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            if !dir.is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }

        let project_dirs = ProjectDirs::from("com", "lookbook-rs", "lookbook-rs")
            .ok_or_else(|| LookbookError::Config("Could not determine config directory".into()))?;

        Ok(project_dirs.config_dir().to_path_buf())
    }

    /// Parsed API base URL
    ///
    /// A trailing slash is enforced so relative paths join beneath it.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.api_base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Ok(Url::parse(&raw)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Set the API base URL after validating it
    pub fn set_api_base_url(&mut self, value: &str) -> Result<()> {
        Url::parse(value)?;
        self.api_base_url = value.to_string();
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.is_empty() {
                self.set_api_base_url(&url)?;
            }
        }

        if let Ok(kind) = std::env::var(TOKEN_STORE_ENV) {
            if !kind.is_empty() {
                self.token_store = TokenStoreKind::from_str(&kind).ok_or_else(|| {
                    LookbookError::Config(format!(
                        "{} has unknown token store '{}'",
                        TOKEN_STORE_ENV, kind
                    ))
                })?;
            }
        }

        Ok(())
    }
}
