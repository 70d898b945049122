//! Configuration loading, validation, and management for cachelm.
//!
//! Loads configuration from `~/.cachelm/config.toml` with environment
//! variable overrides. Validates all settings at startup; model settings are
//! resolved separately, only when a model-backed mode is selected.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Expert execution mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Deterministic placeholder answers, no model calls
    #[default]
    Stub,
    /// Experts stream from the configured model
    Llm,
}

/// How the router decides which experts answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    /// Keyword rules only
    Rules,
    /// Model-assisted, falling back to rules
    Llm,
}

/// How the routed experts are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpertExecution {
    #[default]
    Sequential,
    Parallel,
}

impl Mode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "stub" => Some(Self::Stub),
            "llm" => Some(Self::Llm),
            _ => None,
        }
    }
}

impl RouterMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "rules" => Some(Self::Rules),
            "llm" => Some(Self::Llm),
            _ => None,
        }
    }
}

impl ExpertExecution {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Some(Self::Sequential),
            "parallel" => Some(Self::Parallel),
            _ => None,
        }
    }
}

/// The root configuration structure.
///
/// Maps directly to `~/.cachelm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Expert execution mode
    #[serde(default)]
    pub mode: Mode,

    /// Explicit router mode; derived from `mode` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_mode: Option<RouterMode>,

    /// Sequential or parallel expert scheduling
    #[serde(default)]
    pub expert_execution: ExpertExecution,

    /// How many recent messages the model-assisted router sees
    #[serde(default = "default_router_history")]
    pub router_history: usize,

    /// Path of the reference manual
    #[serde(default = "default_manual_path")]
    pub manual_path: PathBuf,

    /// Model client configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Thread persistence configuration
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

fn default_router_history() -> usize {
    6
}
fn default_manual_path() -> PathBuf {
    PathBuf::from("data/operations_manual.md")
}
fn default_base_url() -> String {
    "http://localhost:8000/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    256
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// Model client settings as written in the config file.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Fully resolved model settings; every required value is present.
#[derive(Clone, PartialEq)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Where (and under which thread) turns are persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// SQLite file holding thread snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Default thread id for `run`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.cachelm/config.toml),
    /// then apply environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Blank values are ignored. Unknown mode names fall back to their
    /// defaults; unparseable numbers are rejected.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("CACHELM_MODE") {
            self.mode = Mode::parse(&v).unwrap_or_default();
        }
        if let Some(v) = get("CACHELM_ROUTER_MODE") {
            self.router_mode = RouterMode::parse(&v);
        }
        if let Some(v) = get("CACHELM_EXPERT_EXECUTION") {
            self.expert_execution = ExpertExecution::parse(&v).unwrap_or_default();
        }
        if let Some(v) = get("CACHELM_ROUTER_HISTORY") {
            self.router_history = parse_number("CACHELM_ROUTER_HISTORY", &v)?;
        }
        if let Some(v) = get("CACHELM_MANUAL_PATH") {
            self.manual_path = PathBuf::from(v);
        }
        if let Some(v) = get("CACHELM_CHECKPOINT_DB") {
            self.checkpoint.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CACHELM_THREAD_ID") {
            self.checkpoint.thread_id = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("OPENAI_TEMPERATURE") {
            self.llm.temperature = parse_number("OPENAI_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("OPENAI_MAX_TOKENS") {
            self.llm.max_tokens = parse_number("OPENAI_MAX_TOKENS", &v)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cachelm")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "llm.max_tokens must be > 0".into(),
            ));
        }

        if self.router_history == 0 {
            return Err(ConfigError::ValidationError(
                "router_history must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// The router mode in effect: explicit setting, else follows `mode`.
    pub fn effective_router_mode(&self) -> RouterMode {
        match (self.router_mode, self.mode) {
            (Some(explicit), _) => explicit,
            (None, Mode::Llm) => RouterMode::Llm,
            (None, Mode::Stub) => RouterMode::Rules,
        }
    }

    /// Whether any component needs the model client.
    pub fn needs_model(&self) -> bool {
        self.mode == Mode::Llm || self.effective_router_mode() == RouterMode::Llm
    }

    /// Resolve model settings, failing if a required value is missing.
    pub fn llm_settings(&self) -> Result<LlmSettings, ConfigError> {
        let api_key = self
            .llm
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingSetting("OPENAI_API_KEY"))?;

        if self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::MissingSetting("OPENAI_BASE_URL"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::MissingSetting("OPENAI_MODEL"));
        }

        Ok(LlmSettings {
            base_url: self.llm.base_url.trim().to_string(),
            api_key: api_key.to_string(),
            model: self.llm.model.trim().to_string(),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
        })
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            router_mode: None,
            expert_execution: ExpertExecution::default(),
            router_history: default_router_history(),
            manual_path: default_manual_path(),
            llm: LlmConfig::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} is not a valid number: {value:?}")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),
}

impl From<ConfigError> for cachelm_core::Error {
    fn from(err: ConfigError) -> Self {
        cachelm_core::Error::config(err.to_string())
    }
}
