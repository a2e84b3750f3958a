//! Configuration management
//!
//! This module handles loading, validation, and management of the Vane configuration.
//! Configuration is stored in TOML format at ~/.vane/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **storage**: Database file and project cache TTL
//! - **session**: Session expiry, history length and cache TTL
//! - **workers**: Where each analysis worker lives
//! - **retry**: Attempt budget and backoff base for worker calls
//! - **geocode**: Reverse geocoding used when naming new projects
//! - **naming**: Name uniqueness settings
//! - **server**: HTTP API host settings
//! - **chat**: Optional LLM collaborator for free-text questions
//! - **health**: Deployment health probing
//!
//! # Examples
//!
//! ```no_run
//! use vane_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Workers: {}", config.workers.base_url);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vane_sdk::errors::EngineError;
use vane_sdk::types::StepKind;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Project storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session context settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Worker endpoints
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Reverse geocoding
    #[serde(default)]
    pub geocode: GeocodeConfig,

    /// Project naming
    #[serde(default)]
    pub naming: NamingConfig,

    /// HTTP API host
    #[serde(default)]
    pub server: ServerConfig,

    /// Free-text answer collaborator
    #[serde(default)]
    pub chat: ChatConfig,

    /// Deployment health probe
    #[serde(default)]
    pub health: HealthConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Project storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file name, relative to the data directory unless absolute
    #[serde(default = "default_database_file")]
    pub database: PathBuf,

    /// Seconds a loaded project stays in the read cache
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

/// Session context configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Days of inactivity before a session expires
    #[serde(default = "default_session_ttl_days")]
    pub ttl_days: u64,

    /// Number of recently touched projects remembered per session
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Seconds a session record stays in the read cache
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

/// Worker endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Base URL; a worker named `terrain` is reached at `{base_url}/terrain`
    #[serde(default = "default_workers_base_url")]
    pub base_url: String,

    /// Per-attempt HTTP timeout in seconds
    #[serde(default = "default_worker_timeout_secs")]
    pub timeout_secs: u64,

    /// Explicit endpoint overrides keyed by worker name
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per invocation, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles for each further attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Reverse geocoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    /// Enable reverse lookups when naming projects from coordinates
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of a Nominatim-compatible service
    #[serde(default = "default_geocode_base_url")]
    pub base_url: String,

    /// User agent sent with each lookup
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Lookup timeout in seconds
    #[serde(default = "default_geocode_timeout_secs")]
    pub timeout_secs: u64,

    /// Hours a lookup result is cached
    #[serde(default = "default_geocode_cache_hours")]
    pub cache_ttl_hours: u64,
}

/// Project naming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Numeric suffixes tried before falling back to a timestamp suffix
    #[serde(default = "default_max_unique_attempts")]
    pub max_unique_attempts: u32,
}

/// HTTP API host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Request timeout budget in seconds; must cover the full retry sequence
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Free-text answer collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Answer free-text questions through an Ollama model
    #[serde(default)]
    pub enabled: bool,

    /// Base URL for the Ollama API
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_chat_model")]
    pub model: String,
}

/// Deployment health probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Probe workers and storage before handling each request
    #[serde(default)]
    pub enabled: bool,

    /// Probe timeout per component in seconds
    #[serde(default = "default_health_timeout_secs")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.vane")
}

fn default_database_file() -> PathBuf {
    PathBuf::from("vane.db")
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_session_ttl_days() -> u64 {
    7
}

fn default_history_limit() -> usize {
    10
}

fn default_workers_base_url() -> String {
    "http://localhost:8700/workers".to_string()
}

fn default_worker_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_geocode_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    format!("vane/{}", env!("CARGO_PKG_VERSION"))
}

fn default_geocode_timeout_secs() -> u64 {
    5
}

fn default_geocode_cache_hours() -> u64 {
    24
}

fn default_max_unique_attempts() -> u32 {
    1000
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_chat_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_chat_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_health_timeout_secs() -> u64 {
    3
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_file(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_session_ttl_days(),
            history_limit: default_history_limit(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            base_url: default_workers_base_url(),
            timeout_secs: default_worker_timeout_secs(),
            endpoints: HashMap::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_geocode_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_geocode_timeout_secs(),
            cache_ttl_hours: default_geocode_cache_hours(),
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            max_unique_attempts: default_max_unique_attempts(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_chat_base_url(),
            model: default_chat_model(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: default_health_timeout_secs(),
        }
    }
}

impl WorkersConfig {
    /// Endpoint URL for a worker, honoring explicit overrides
    pub fn endpoint(&self, worker: &str) -> String {
        match self.endpoints.get(worker) {
            Some(url) => url.clone(),
            None => format!("{}/{}", self.base_url.trim_end_matches('/'), worker),
        }
    }

    /// Endpoints of every step worker, in pipeline order
    pub fn step_endpoints(&self) -> Vec<(String, String)> {
        StepKind::ALL
            .iter()
            .map(|step| (step.as_str().to_string(), self.endpoint(step.as_str())))
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Config {
    /// Load configuration from the default location (~/.vane/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.vane/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".vane").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            storage: StorageConfig::default(),
            session: SessionConfig::default(),
            workers: WorkersConfig::default(),
            retry: RetryConfig::default(),
            geocode: GeocodeConfig::default(),
            naming: NamingConfig::default(),
            server: ServerConfig::default(),
            chat: ChatConfig::default(),
            health: HealthConfig::default(),
        }
    }

    /// Absolute path of the project database
    pub fn database_path(&self) -> PathBuf {
        if self.storage.database.is_absolute() {
            self.storage.database.clone()
        } else {
            self.core.data_dir.join(&self.storage.database)
        }
    }

    /// Validate and process configuration
    ///
    /// This method validates value ranges, expands ~ in the data directory
    /// and creates it when missing.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.retry.max_attempts == 0 || self.retry.max_attempts > 10 {
            return Err(EngineError::Config(
                "retry.max_attempts must be between 1 and 10".to_string(),
            ));
        }

        if self.session.history_limit == 0 {
            return Err(EngineError::Config(
                "session.history_limit must be at least 1".to_string(),
            ));
        }

        if self.session.ttl_days == 0 {
            return Err(EngineError::Config(
                "session.ttl_days must be at least 1".to_string(),
            ));
        }

        if self.naming.max_unique_attempts == 0 {
            return Err(EngineError::Config(
                "naming.max_unique_attempts must be at least 1".to_string(),
            ));
        }

        for (name, url) in self.workers.step_endpoints() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(EngineError::Config(format!(
                    "Worker '{}' endpoint must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }

        // The host must be able to wait out every backoff plus one worker timeout
        let backoff_budget_ms: u64 = (1..self.retry.max_attempts)
            .map(|n| self.retry.base_delay_ms.saturating_mul(1 << (n - 1)))
            .sum();
        if self.server.request_timeout_secs * 1000 < backoff_budget_ms {
            return Err(EngineError::Config(format!(
                "server.request_timeout_secs ({}) is shorter than the retry backoff budget ({}ms)",
                self.server.request_timeout_secs, backoff_budget_ms
            )));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
