//! Configuration management for the regret scoring service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub inference: InferenceConfig,
    pub storage: StorageConfig,
    pub scoring: ScoringConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8001".to_string(),
        }
    }
}

/// Toxicity classifier configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ONNX export of the multi-label toxicity model
    pub model_path: String,
    /// `tokenizer.json` matching the model
    pub tokenizer_path: String,
    /// Output labels, in the order of the model's logits
    pub labels: Vec<String>,
    /// Number of intra-op threads for ONNX inference
    pub onnx_threads: usize,
    /// Text is truncated to this many characters before inference
    pub max_input_chars: usize,
    /// Longest token sequence the model accepts
    pub max_tokens: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: "models/toxicity.onnx".to_string(),
            tokenizer_path: "models/tokenizer.json".to_string(),
            labels: default_labels(),
            onnx_threads: 1,
            max_input_chars: 2000,
            max_tokens: 512,
        }
    }
}

fn default_labels() -> Vec<String> {
    [
        "toxicity",
        "severe_toxicity",
        "obscene",
        "threat",
        "insult",
        "identity_attack",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Inference worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Maximum number of concurrent inference calls
    pub workers: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// PostgreSQL URL; the in-memory backend is used when unset or unreachable
    pub database_url: Option<String>,
    /// How long the startup probe may take
    pub probe_timeout_ms: u64,
    /// Connection pool size
    pub max_connections: u32,
    /// Capacity of the analysis write queue
    pub write_queue_capacity: usize,
}

impl StorageConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            probe_timeout_ms: 2000,
            max_connections: 5,
            write_queue_capacity: 1024,
        }
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Threshold for users without stored settings
    pub default_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.5,
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between periodic summaries (0 disables the reporter)
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config/config.toml` (optional) and the environment
    pub fn load() -> Result<Self> {
        Self::build(File::with_name("config/config").required(false))
    }

    /// Load configuration from a specific file, which must exist
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(File::from(path.as_ref()).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("REGRET_GUARD").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
