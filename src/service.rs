//! Scoring service: model readiness, inference, aggregation and persistence

use crate::analytics::{AnalyticsAggregator, AnalyticsSummary};
use crate::error::ServiceError;
use crate::metrics::ServiceMetrics;
use crate::models::{InferenceExecutor, ModelLoader, ModelStatus, ScoreAggregator};
use crate::storage::{AnalysisWriter, StorageBackend, StorageGateway};
use crate::types::{AnalysisRequest, AnalysisResult, StatusCheck, UserSettings};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Analytics plus current model readiness
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    #[serde(flatten)]
    pub summary: AnalyticsSummary,
    pub model_loaded: bool,
}

/// Liveness report. Building one never fails.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_status: ModelStatus,
    /// Seconds spent loading the model, once known
    pub model_load_time: Option<f64>,
    pub storage_backend: StorageBackend,
    pub timestamp: DateTime<Utc>,
    pub api_version: &'static str,
}

/// Service banner
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub model_status: ModelStatus,
}

/// Ties the scoring pipeline to storage
pub struct RegretService {
    executor: InferenceExecutor,
    aggregator: ScoreAggregator,
    store: Arc<dyn StorageGateway>,
    writer: AnalysisWriter,
    analytics: AnalyticsAggregator,
    metrics: Arc<ServiceMetrics>,
    default_threshold: f64,
}

impl RegretService {
    pub fn new(
        executor: InferenceExecutor,
        store: Arc<dyn StorageGateway>,
        writer: AnalysisWriter,
        metrics: Arc<ServiceMetrics>,
        default_threshold: f64,
    ) -> Self {
        Self {
            executor,
            aggregator: ScoreAggregator::new(),
            analytics: AnalyticsAggregator::new(store.clone()),
            store,
            writer,
            metrics,
            default_threshold,
        }
    }

    fn loader(&self) -> &ModelLoader {
        self.executor.loader()
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }

    /// Validate and score a text
    pub async fn analyze_text(
        &self,
        text: impl Into<String>,
        threshold: f64,
    ) -> Result<AnalysisResult, ServiceError> {
        let request = AnalysisRequest::new(text, threshold)?;
        Ok(self.analyze(&request).await)
    }

    /// Score a validated request.
    ///
    /// The result is handed to the write queue and returned without waiting
    /// for storage.
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        let start = Instant::now();

        let profile = self.executor.score(request.text()).await;
        let regret_score = self.aggregator.aggregate(&profile);
        let result = AnalysisResult::new(request, regret_score, profile, start.elapsed());

        self.metrics
            .record_analysis(result.processing_time, result.regret_score, result.should_warn);
        debug!(
            regret_score = result.regret_score,
            should_warn = result.should_warn,
            processing_time_us = result.processing_time.as_micros(),
            "Text analyzed"
        );

        self.writer.submit(result.clone());
        result
    }

    /// Store a user's threshold, replacing any earlier record.
    ///
    /// A missing `user_id` gets a freshly generated one.
    pub async fn save_settings(
        &self,
        user_id: Option<String>,
        threshold: f64,
    ) -> Result<UserSettings, ServiceError> {
        let user_id = user_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let settings = UserSettings::new(user_id, threshold);
        self.store.upsert_settings(&settings).await?;
        Ok(settings)
    }

    /// Stored settings, or defaults when the user has none
    pub async fn get_settings(&self, user_id: &str) -> Result<UserSettings, ServiceError> {
        Ok(self
            .store
            .settings_or_default(user_id, self.default_threshold)
            .await?)
    }

    pub async fn analytics(&self) -> Result<AnalyticsReport, ServiceError> {
        Ok(AnalyticsReport {
            summary: self.analytics.summarize().await?,
            model_loaded: self.loader().is_ready(),
        })
    }

    pub async fn record_status(&self, client_name: impl Into<String>) -> Result<StatusCheck, ServiceError> {
        let check = StatusCheck::new(client_name);
        self.store.insert_status_check(&check).await?;
        Ok(check)
    }

    pub async fn list_status(&self) -> Result<Vec<StatusCheck>, ServiceError> {
        Ok(self.store.list_status_checks().await?)
    }

    pub fn health(&self) -> HealthReport {
        let loader = self.loader();
        HealthReport {
            status: "healthy",
            model_loaded: loader.is_ready(),
            model_status: loader.status(),
            model_load_time: loader.load_time().map(|d| d.as_secs_f64()),
            storage_backend: self.store.backend(),
            timestamp: Utc::now(),
            api_version: API_VERSION,
        }
    }

    pub fn root_info(&self) -> ServiceInfo {
        ServiceInfo {
            message: "Regret Guard API - Real-time Regret Prevention",
            version: API_VERSION,
            model_status: self.loader().status(),
        }
    }
}
