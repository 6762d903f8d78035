//! In-process storage used when no database is reachable

use super::{StorageBackend, StorageGateway};
use crate::error::StorageError;
use crate::types::{AnalysisResult, AnalysisSummary, AnalysisTotals, StatusCheck, UserSettings};
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::RwLock;

/// Unbounded, non-persistent store with one lock per collection
#[derive(Default)]
pub struct MemoryStore {
    analyses: RwLock<Vec<AnalysisResult>>,
    settings: RwLock<HashMap<String, UserSettings>>,
    status_checks: RwLock<Vec<StatusCheck>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageGateway for MemoryStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Memory
    }

    async fn insert_analysis(&self, result: &AnalysisResult) -> Result<(), StorageError> {
        self.analyses
            .write()
            .map_err(|_| StorageError::LockPoisoned("analyses"))?
            .push(result.clone());
        Ok(())
    }

    async fn analysis_totals(&self) -> Result<AnalysisTotals, StorageError> {
        let analyses = self
            .analyses
            .read()
            .map_err(|_| StorageError::LockPoisoned("analyses"))?;

        Ok(AnalysisTotals {
            total: analyses.len() as u64,
            warned: analyses.iter().filter(|a| a.should_warn).count() as u64,
            processing_time_sum: analyses
                .iter()
                .map(|a| a.processing_time.as_secs_f64())
                .sum(),
        })
    }

    async fn recent_analyses(&self, limit: usize) -> Result<Vec<AnalysisSummary>, StorageError> {
        let analyses = self
            .analyses
            .read()
            .map_err(|_| StorageError::LockPoisoned("analyses"))?;

        if limit == 0 {
            return Ok(Vec::new());
        }

        // Min-heap of the `limit` newest (timestamp, insertion index) keys
        let mut newest = BinaryHeap::with_capacity(limit.min(analyses.len()) + 1);
        for (idx, analysis) in analyses.iter().enumerate() {
            newest.push(Reverse((analysis.timestamp, idx)));
            if newest.len() > limit {
                newest.pop();
            }
        }

        Ok(newest
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse((_, idx))| analyses[idx].summary())
            .collect())
    }

    async fn upsert_settings(&self, settings: &UserSettings) -> Result<(), StorageError> {
        self.settings
            .write()
            .map_err(|_| StorageError::LockPoisoned("settings"))?
            .insert(settings.user_id.clone(), settings.clone());
        Ok(())
    }

    async fn find_settings(&self, user_id: &str) -> Result<Option<UserSettings>, StorageError> {
        Ok(self
            .settings
            .read()
            .map_err(|_| StorageError::LockPoisoned("settings"))?
            .get(user_id)
            .cloned())
    }

    async fn insert_status_check(&self, check: &StatusCheck) -> Result<(), StorageError> {
        self.status_checks
            .write()
            .map_err(|_| StorageError::LockPoisoned("status_checks"))?
            .push(check.clone());
        Ok(())
    }

    async fn list_status_checks(&self) -> Result<Vec<StatusCheck>, StorageError> {
        Ok(self
            .status_checks
            .read()
            .map_err(|_| StorageError::LockPoisoned("status_checks"))?
            .clone())
    }
}
