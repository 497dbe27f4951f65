//! Configuration loading, validation, and management for Memoria.
//!
//! Loads configuration from `~/.memoria/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use memoria_core::model::{LatencyClass, ModelDescriptor, RamClass, ResourceCost};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.memoria/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Context window bounds
    #[serde(default)]
    pub context: ContextConfig,

    /// Invocation timeout / retry policy
    #[serde(default)]
    pub invoker: InvokerConfig,

    /// Routing policy
    #[serde(default)]
    pub router: RouterConfig,

    /// Background health probe
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Model catalog
    #[serde(default = "default_models")]
    pub models: Vec<ModelConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "in_memory", "file", or "sqlite"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Where file and sqlite backings keep their data. Defaults to `~/.memoria/data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Maximum turns retained per device
    #[serde(default = "default_retention_turns")]
    pub retention_turns: usize,
}

fn default_memory_backend() -> String {
    "file".into()
}
fn default_retention_turns() -> usize {
    500
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            data_dir: None,
            retention_turns: default_retention_turns(),
        }
    }
}

/// Bounds on the assembled context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum number of turns presented to a model (W)
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Maximum total characters presented to a model (C)
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_max_turns() -> usize {
    20
}
fn default_max_chars() -> usize {
    8_000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_chars: default_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokerConfig {
    /// Per-attempt timeout (T)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum attempts across the fallback chain (K)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// How long a failed model stays degraded
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Retry-after hint returned with terminal failures
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_max_attempts() -> usize {
    3
}
fn default_cooldown_secs() -> u64 {
    120
}
fn default_retry_after_secs() -> u64 {
    30
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            cooldown_secs: default_cooldown_secs(),
            retry_after_secs: default_retry_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// The designated always-available generic model
    #[serde(default = "default_generic_model")]
    pub generic_model: String,

    /// Exclude models above this RAM class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ram: Option<RamClass>,

    /// Exclude models above this latency class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<LatencyClass>,
}

fn default_generic_model() -> String {
    "llama3".into()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            generic_model: default_generic_model(),
            max_ram: None,
            max_latency: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_probe_interval")]
    pub interval_secs: u64,
}

fn default_probe_interval() -> u64 {
    30
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_probe_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// One entry in the model catalog.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Registry id
    pub id: String,

    /// Backend kind: "ollama", "openai_compat", or "echo"
    #[serde(default = "default_model_kind")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Remote model name, when it differs from `id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Capability tags (task categories this model serves)
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default = "default_ram")]
    pub ram: RamClass,

    #[serde(default = "default_latency")]
    pub latency: LatencyClass,

    /// Lower = preferred
    #[serde(default = "default_priority_rank")]
    pub priority_rank: u32,
}

fn default_model_kind() -> String {
    "ollama".into()
}
fn default_ram() -> RamClass {
    RamClass::Medium
}
fn default_latency() -> LatencyClass {
    LatencyClass::Moderate
}
fn default_priority_rank() -> u32 {
    100
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("tags", &self.tags)
            .field("ram", &self.ram)
            .field("latency", &self.latency)
            .field("priority_rank", &self.priority_rank)
            .finish()
    }
}

impl ModelConfig {
    /// Build the initial (healthy) registry descriptor for this model.
    pub fn descriptor(&self) -> ModelDescriptor {
        let mut descriptor = ModelDescriptor::new(&self.id, self.tags.iter().cloned(), self.priority_rank);
        descriptor.resource_cost = ResourceCost {
            ram: self.ram,
            latency: self.latency,
        };
        descriptor
    }

    /// The model name sent to the remote endpoint.
    pub fn remote_model(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.id)
    }

    fn ollama(id: &str, tags: &[&str], ram: RamClass, latency: LatencyClass, rank: u32) -> Self {
        Self {
            id: id.into(),
            kind: default_model_kind(),
            base_url: None,
            api_key: None,
            model: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ram,
            latency,
            priority_rank: rank,
        }
    }
}

fn default_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig::ollama("deepseek-coder", &["coding"], RamClass::Large, LatencyClass::Slow, 1),
        ModelConfig::ollama(
            "llama3",
            &["general", "complex_analysis", "coding"],
            RamClass::Large,
            LatencyClass::Moderate,
            2,
        ),
        ModelConfig::ollama(
            "mistral",
            &["general", "complex_analysis"],
            RamClass::Medium,
            LatencyClass::Moderate,
            3,
        ),
        ModelConfig::ollama("phi3", &["simple", "general"], RamClass::Small, LatencyClass::Fast, 4),
    ]
}

impl AppConfig {
    /// Load configuration from the default path (~/.memoria/config.toml).
    ///
    /// Environment overrides:
    /// - `MEMORIA_CONFIG`: alternate config file path
    /// - `MEMORIA_DATA_DIR`: storage directory
    /// - `MEMORIA_GENERIC_MODEL`: designated generic model
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("MEMORIA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;

        if let Ok(dir) = std::env::var("MEMORIA_DATA_DIR") {
            config.memory.data_dir = Some(PathBuf::from(dir));
        }

        if let Ok(model) = std::env::var("MEMORIA_GENERIC_MODEL") {
            config.router.generic_model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".memoria")
    }

    /// The storage directory for file and sqlite backings.
    pub fn data_dir(&self) -> PathBuf {
        self.memory
            .data_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("data"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "context.max_turns must be > 0".into(),
            ));
        }
        if self.context.max_chars == 0 {
            return Err(ConfigError::ValidationError(
                "context.max_chars must be > 0".into(),
            ));
        }
        if self.invoker.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "invoker.max_attempts must be > 0".into(),
            ));
        }
        if self.invoker.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "invoker.timeout_secs must be > 0".into(),
            ));
        }
        if self.memory.retention_turns < self.context.max_turns {
            return Err(ConfigError::ValidationError(
                "memory.retention_turns must be >= context.max_turns".into(),
            ));
        }
        if !matches!(self.memory.backend.as_str(), "in_memory" | "file" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "unknown memory backend '{}'",
                self.memory.backend
            )));
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if !seen.insert(model.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate model id '{}'",
                    model.id
                )));
            }
            match model.kind.as_str() {
                "ollama" | "echo" => {}
                "openai_compat" if model.base_url.is_none() => {
                    return Err(ConfigError::ValidationError(format!(
                        "model '{}' of kind openai_compat needs a base_url",
                        model.id
                    )));
                }
                "openai_compat" => {}
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "model '{}' has unknown kind '{other}'",
                        model.id
                    )));
                }
            }
        }

        if !self.models.is_empty() && !seen.contains(self.router.generic_model.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "router.generic_model '{}' is not declared in [[models]]",
                self.router.generic_model
            )));
        }

        Ok(())
    }

    /// Initial registry descriptors for every configured model.
    pub fn descriptors(&self) -> Vec<ModelDescriptor> {
        self.models.iter().map(ModelConfig::descriptor).collect()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            context: ContextConfig::default(),
            invoker: InvokerConfig::default(),
            router: RouterConfig::default(),
            probe: ProbeConfig::default(),
            gateway: GatewayConfig::default(),
            models: default_models(),
        }
    }
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
}
