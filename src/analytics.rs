//! Summary statistics over stored analyses

use crate::error::StorageError;
use crate::storage::StorageGateway;
use crate::types::AnalysisSummary;
use serde::Serialize;
use std::sync::Arc;

/// Number of recent analyses included in a summary
pub const RECENT_LIMIT: usize = 10;

/// Read-side view over every stored analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub total_analyses: u64,
    pub warned_analyses: u64,
    /// `warned / max(total, 1)`
    pub warning_rate: f64,
    /// Mean processing time in seconds, 0 when nothing is stored
    pub avg_processing_time: f64,
    /// Newest first
    pub recent_analyses: Vec<AnalysisSummary>,
}

/// Computes [`AnalyticsSummary`] from whichever backend is active
pub struct AnalyticsAggregator {
    store: Arc<dyn StorageGateway>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn StorageGateway>) -> Self {
        Self { store }
    }

    pub async fn summarize(&self) -> Result<AnalyticsSummary, StorageError> {
        let totals = self.store.analysis_totals().await?;
        let recent = self.store.recent_analyses(RECENT_LIMIT).await?;

        let avg_processing_time = if totals.total > 0 {
            totals.processing_time_sum / totals.total as f64
        } else {
            0.0
        };

        Ok(AnalyticsSummary {
            total_analyses: totals.total,
            warned_analyses: totals.warned,
            warning_rate: totals.warned as f64 / totals.total.max(1) as f64,
            avg_processing_time,
            recent_analyses: recent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{AnalysisRequest, AnalysisResult, ToxicityProfile};
    use std::time::Duration;

    async fn store_with(scores: &[(f64, f64)]) -> Arc<dyn StorageGateway> {
        let store: Arc<dyn StorageGateway> = Arc::new(MemoryStore::new());
        for (i, &(score, secs)) in scores.iter().enumerate() {
            let request = AnalysisRequest::new(format!("message {i}"), 0.5).unwrap();
            let result = AnalysisResult::new(
                &request,
                score,
                ToxicityProfile::neutral(),
                Duration::from_secs_f64(secs),
            );
            store.insert_analysis(&result).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_empty_summary_has_no_division_by_zero() {
        let aggregator = AnalyticsAggregator::new(store_with(&[]).await);
        let summary = aggregator.summarize().await.unwrap();

        assert_eq!(summary.total_analyses, 0);
        assert_eq!(summary.warned_analyses, 0);
        assert_eq!(summary.warning_rate, 0.0);
        assert_eq!(summary.avg_processing_time, 0.0);
        assert!(summary.recent_analyses.is_empty());
    }

    #[tokio::test]
    async fn test_rates_and_averages() {
        let aggregator =
            AnalyticsAggregator::new(store_with(&[(0.9, 0.2), (0.1, 0.4), (0.6, 0.6), (0.0, 0.8)]).await);
        let summary = aggregator.summarize().await.unwrap();

        assert_eq!(summary.total_analyses, 4);
        assert_eq!(summary.warned_analyses, 2);
        assert!((summary.warning_rate - 0.5).abs() < 1e-12);
        assert!((summary.avg_processing_time - 0.5).abs() < 1e-9);
        assert_eq!(summary.recent_analyses.len(), 4);
    }

    #[tokio::test]
    async fn test_recent_capped_at_ten() {
        let scores: Vec<(f64, f64)> = (0..14).map(|_| (0.2, 0.01)).collect();
        let aggregator = AnalyticsAggregator::new(store_with(&scores).await);
        let summary = aggregator.summarize().await.unwrap();

        assert_eq!(summary.total_analyses, 14);
        assert_eq!(summary.recent_analyses.len(), RECENT_LIMIT);
        for pair in summary.recent_analyses.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }
}
