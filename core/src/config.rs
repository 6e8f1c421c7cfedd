/// Configuration for scan and replace sessions
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://site-api.datocms.com";
pub const TOKEN_ENV_VAR: &str = "DATOCMS_API_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOptions {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Narrow each listing with the store's full-text search before matching.
    #[serde(default)]
    pub use_search_prefilter: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            environment: None,
            base_url: default_base_url(),
            page_size: default_page_size(),
            use_search_prefilter: false,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceOptions {
    /// Records rewritten concurrently; the next batch starts once this one drains.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    5
}

impl Default for ReplaceOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingOptions {
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplaceConfig {
    #[serde(default)]
    pub store: StoreOptions,
    #[serde(default)]
    pub replace: ReplaceOptions,
    #[serde(default)]
    pub logging: LoggingOptions,
}

impl ReplaceConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_json()?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads `path` when given, otherwise the default location if it exists,
    /// otherwise the defaults. The token env var wins over the file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => match default_config_path() {
                Some(default) if default.exists() => Self::from_json_file(default)?,
                _ => Self::default(),
            },
        };

        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            config.apply_token_override(&token);
        }
        Ok(config)
    }

    pub fn apply_token_override(&mut self, token: &str) {
        let trimmed = token.trim();
        if !trimmed.is_empty() {
            self.store.api_token = trimmed.to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replace.batch_size == 0 {
            return Err(ConfigError::Invalid("replace.batchSize must be at least 1".into()));
        }
        if self.store.page_size == 0 {
            return Err(ConfigError::Invalid("store.pageSize must be at least 1".into()));
        }
        if self.store.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("store.baseUrl must not be empty".into()));
        }
        Ok(())
    }
}

/// `<config dir>/bulk-replace/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bulk-replace").join("config.json"))
}
