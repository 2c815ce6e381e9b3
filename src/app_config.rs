use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::file_utils::FileManager;
use crate::translation::tokens::{DEFAULT_MAX_REQUEST_TOKENS, DEFAULT_OUTPUT_FACTOR};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Target language code (ISO) or name
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Batch service settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Request batching settings
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Job polling settings
    #[serde(default)]
    pub polling: PollingConfig,

    /// Ledger settings
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Maximum number of CSV files processed at once in folder mode
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Batch service configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServiceConfig {
    // @field: Service base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    // @field: Model name
    #[serde(default = "default_model")]
    pub model: String,

    // @field: Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    // @field: Timeout seconds for each HTTP call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Completion window requested for batch jobs
    #[serde(default = "default_completion_window")]
    pub completion_window: String,

    // @field: Max tokens per batch response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// System prompt template for translation
    /// Placeholders: {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            completion_window: default_completion_window(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Request batching configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BatchingConfig {
    /// Maximum number of records per batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Token budget per request, prompt and expected answer together; 0 disables it
    #[serde(default = "default_max_request_tokens")]
    pub max_request_tokens: usize,

    /// Expected answer tokens per prompt token
    #[serde(default = "default_expected_output_factor")]
    pub expected_output_factor: f64,

    /// Number of downloaded batches parsed concurrently
    #[serde(default = "default_parse_concurrency")]
    pub parse_concurrency: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_request_tokens: default_max_request_tokens(),
            expected_output_factor: default_expected_output_factor(),
            parse_concurrency: default_parse_concurrency(),
        }
    }
}

/// Job polling configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PollingConfig {
    /// Delay between status polls in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound of the backoff delay in seconds
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,

    /// Delay multiplier applied after each transient error
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Polls before giving up on a job
    #[serde(default = "default_max_polls")]
    pub max_polls: usize,

    /// Transient errors in a row before giving up
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_polls: default_max_polls(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

/// Ledger configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Path of the ledger CSV file
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_target_language() -> String {
    "hi".to_string()
}

fn default_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_completion_window() -> String {
    "24h".to_string()
}

fn default_max_tokens() -> u32 {
    16000
}

fn default_temperature() -> f32 {
    0.0
}

fn default_system_prompt() -> String {
    "You are a professional technical translator. Translate each numbered line into {target_language}. \
     Every line starts with an [ID:<id>] marker. Respond only with a JSON object mapping each id to its \
     translation, without the marker, and keep technical codes, numbers and units unchanged."
        .to_string()
}

fn default_max_batch_size() -> usize {
    100
}

fn default_max_request_tokens() -> usize {
    DEFAULT_MAX_REQUEST_TOKENS
}

fn default_expected_output_factor() -> f64 {
    DEFAULT_OUTPUT_FACTOR
}

fn default_parse_concurrency() -> usize {
    4
}

fn default_interval_secs() -> u64 {
    300 // 5 minutes between polls
}

fn default_max_interval_secs() -> u64 {
    1800
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_polls() -> usize {
    288 // 24 hours at the default interval
}

fn default_max_consecutive_errors() -> usize {
    5
}

fn default_ledger_path() -> String {
    "batch_tracking.csv".to_string()
}

fn default_max_concurrent_files() -> usize {
    3
}

impl Config {
    /// Load the configuration at `path`, writing a default one when it does not exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok(config);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config_json =
            serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        FileManager::write_to_file(path, &config_json)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.target_language.trim().is_empty() {
            return Err(anyhow!("Target language must not be empty"));
        }

        let endpoint = url::Url::parse(&self.service.endpoint)
            .with_context(|| format!("Invalid service endpoint: {}", self.service.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!("Service endpoint must use http or https: {}", endpoint));
        }

        if self.service.model.trim().is_empty() {
            return Err(anyhow!("Service model must not be empty"));
        }
        if self.service.api_key_env.trim().is_empty() {
            return Err(anyhow!("API key environment variable name must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.service.temperature) {
            return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
        }
        if self.service.max_tokens == 0 {
            return Err(anyhow!("max_tokens must be greater than 0"));
        }
        if !self.service.system_prompt.contains("{target_language}") {
            warn!("System prompt has no {{target_language}} placeholder");
        }

        if self.batching.max_batch_size == 0 {
            return Err(anyhow!("max_batch_size must be greater than 0"));
        }
        let factor = self.batching.expected_output_factor;
        if factor.is_nan() || factor < 0.0 {
            return Err(anyhow!("expected_output_factor must not be negative"));
        }
        if self.batching.parse_concurrency == 0 {
            return Err(anyhow!("parse_concurrency must be greater than 0"));
        }

        if self.polling.max_polls == 0 {
            return Err(anyhow!("max_polls must be greater than 0"));
        }
        if self.polling.backoff_multiplier < 1.0 {
            return Err(anyhow!("backoff_multiplier must be at least 1.0"));
        }

        if self.ledger.path.trim().is_empty() {
            return Err(anyhow!("Ledger path must not be empty"));
        }
        if self.max_concurrent_files == 0 {
            return Err(anyhow!("max_concurrent_files must be greater than 0"));
        }

        Ok(())
    }

    /// System prompt with the target language filled in
    pub fn system_prompt(&self) -> String {
        let language = crate::language_utils::resolve_target_language(&self.target_language);
        self.service.system_prompt.replace("{target_language}", &language)
    }

    /// Resolve the API key through `lookup`, which maps a variable name to its value
    pub fn resolve_api_key<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(&self.service.api_key_env)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "API key not found: set the {} environment variable or add it to .env",
                    self.service.api_key_env
                )
            })
    }

    /// Resolve the API key from the process environment, after loading `.env`
    pub fn api_key(&self) -> Result<String> {
        let _ = dotenvy::dotenv();
        self.resolve_api_key(|name| std::env::var(name).ok())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            target_language: default_target_language(),
            service: ServiceConfig::default(),
            batching: BatchingConfig::default(),
            polling: PollingConfig::default(),
            ledger: LedgerConfig::default(),
            max_concurrent_files: default_max_concurrent_files(),
            log_level: LogLevel::default(),
        }
    }
}
