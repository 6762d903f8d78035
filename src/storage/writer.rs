//! Best-effort persistence of analysis results.
//!
//! Results are pushed onto a bounded queue and written by one drain task, so
//! a request never waits on storage. A record is dropped (and counted) when
//! the queue is full or already closed; write failures are logged and not
//! retried. On shutdown the queue is closed and whatever is already queued
//! is flushed before the task exits.

use super::StorageGateway;
use crate::metrics::ServiceMetrics;
use crate::types::AnalysisResult;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Cheap handle used to enqueue results
#[derive(Clone)]
pub struct AnalysisWriter {
    tx: mpsc::Sender<AnalysisResult>,
    metrics: Arc<ServiceMetrics>,
}

/// Owns the drain task; used to shut it down
pub struct WriterTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AnalysisWriter {
    /// Spawn the drain task. Must be called from within a Tokio runtime.
    pub fn spawn(
        store: Arc<dyn StorageGateway>,
        capacity: usize,
        metrics: Arc<ServiceMetrics>,
    ) -> (Self, WriterTask) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(drain(store, rx, shutdown_rx, metrics.clone()));

        (Self { tx, metrics }, WriterTask { shutdown_tx, handle })
    }

    /// Enqueue a result without waiting. Never fails the caller.
    pub fn submit(&self, result: AnalysisResult) {
        match self.tx.try_send(result) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Analysis write queue full, dropping record");
                self.metrics.record_write_dropped();
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Analysis write queue closed, dropping record");
                self.metrics.record_write_dropped();
            }
        }
    }
}

impl WriterTask {
    /// Close the queue, flush queued records and wait for the task to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "Analysis writer task failed");
        }
    }
}

async fn drain(
    store: Arc<dyn StorageGateway>,
    mut rx: mpsc::Receiver<AnalysisResult>,
    mut shutdown_rx: watch::Receiver<bool>,
    metrics: Arc<ServiceMetrics>,
) {
    info!(backend = ?store.backend(), "Analysis writer started");
    let mut closing = false;

    loop {
        tokio::select! {
            maybe_result = rx.recv() => {
                match maybe_result {
                    Some(result) => persist(store.as_ref(), &metrics, result).await,
                    None => break,
                }
            }
            Ok(()) = shutdown_rx.changed(), if !closing => {
                if *shutdown_rx.borrow() {
                    info!("Analysis writer closing, flushing queued records");
                    closing = true;
                    rx.close();
                }
            }
        }
    }

    info!("Analysis writer stopped");
}

async fn persist(store: &dyn StorageGateway, metrics: &ServiceMetrics, result: AnalysisResult) {
    match store.insert_analysis(&result).await {
        Ok(()) => {
            metrics.record_write_persisted();
            debug!(regret_score = result.regret_score, "Analysis stored");
        }
        Err(e) => {
            metrics.record_write_failed();
            error!(error = %e, "Failed to store analysis");
        }
    }
}
