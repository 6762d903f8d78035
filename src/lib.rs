//! Regret Guard
//!
//! Scores how likely a message is to be regretted, using a multi-label
//! toxicity classifier, and keeps per-user thresholds and analysis history.

pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod service;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use error::{ServiceError, StorageError};
pub use models::{InferenceExecutor, ModelLoader, ScoreAggregator};
pub use service::RegretService;
pub use storage::StorageGateway;
pub use types::{AnalysisRequest, AnalysisResult, ToxicityProfile, UserSettings};
