use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for wsync
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Hosting API and authentication settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hosting API configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Authentication method
    #[serde(default = "default_auth_method")]
    pub auth_method: String, // "auto", "gh_cli", "token", "file"

    /// File holding a bearer token, used by the "file" and "auto" methods
    #[serde(default)]
    pub token_file: Option<String>,

    /// Entries requested per page
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Timeout for a single HTTP request in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout: u64,

    /// Mirror gists after repositories
    #[serde(default = "default_true")]
    pub include_gists: bool,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Maximum concurrent targets
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Timeout for git operations in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Remote name a working copy is expected to track
    #[serde(default = "default_expected_remote")]
    pub expected_remote: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_auth_method() -> String {
    "auto".to_string()
}
fn default_per_page() -> usize {
    100
}
fn default_http_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_max_parallel() -> usize {
    1
}
fn default_timeout() -> u64 {
    300
}
fn default_expected_remote() -> String {
    "origin".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            auth_method: default_auth_method(),
            token_file: None,
            per_page: default_per_page(),
            timeout: default_http_timeout(),
            include_gists: default_true(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            timeout: default_timeout(),
            expected_remote: default_expected_remote(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file, creating its directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("wsync").join("config.yml"))
    }

    /// Expand environment variables and `~` in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        if let Some(token_file) = &self.github.token_file {
            self.github.token_file = Some(
                shellexpand::full(token_file)
                    .context("Failed to expand token_file path")?
                    .into_owned(),
            );
        }

        Ok(())
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.timeout)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.github.timeout)
    }

    /// Concurrency bound, never below one
    pub fn max_parallel(&self) -> usize {
        self.sync.max_parallel.max(1)
    }
}
