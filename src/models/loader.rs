//! Background loader for the toxicity classifier

use crate::models::classifier::ToxicityClassifier;
use anyhow::Result;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Handle to a loaded classifier, shared with inference workers
pub type SharedClassifier = Arc<dyn ToxicityClassifier>;

/// Readiness of the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// Load still in progress
    Loading,
    /// Model available for inference
    Ready,
    /// Load failed; not retried
    Unavailable,
}

enum LoadOutcome {
    Ready {
        model: SharedClassifier,
        load_time: Duration,
    },
    Unavailable,
}

/// Owns the classifier lifecycle.
///
/// The load runs exactly once on a blocking worker started by [`ModelLoader::spawn`].
/// Its outcome is published once into a `OnceLock`, so readers never block and
/// never observe a partially initialised model.
pub struct ModelLoader {
    slot: OnceLock<LoadOutcome>,
}

impl ModelLoader {
    /// Start loading in the background and return the loader immediately.
    ///
    /// The returned handle completes when the load attempt has finished,
    /// successfully or not. Must be called from within a Tokio runtime.
    pub fn spawn<F>(load: F) -> (Arc<Self>, JoinHandle<()>)
    where
        F: FnOnce() -> Result<SharedClassifier> + Send + 'static,
    {
        let loader = Arc::new(Self {
            slot: OnceLock::new(),
        });

        let task_loader = loader.clone();
        let handle = tokio::task::spawn_blocking(move || task_loader.run_load(load));

        (loader, handle)
    }

    fn run_load<F>(&self, load: F)
    where
        F: FnOnce() -> Result<SharedClassifier>,
    {
        let start = Instant::now();

        let outcome = match panic::catch_unwind(AssertUnwindSafe(load)) {
            Ok(Ok(model)) => {
                let load_time = start.elapsed();
                info!(
                    model = %model.name(),
                    load_time_secs = load_time.as_secs_f64(),
                    "Toxicity model loaded successfully"
                );
                LoadOutcome::Ready { model, load_time }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to load toxicity model");
                LoadOutcome::Unavailable
            }
            Err(_) => {
                error!("Toxicity model loader panicked");
                LoadOutcome::Unavailable
            }
        };

        // Only this task ever writes the slot.
        let _ = self.slot.set(outcome);
    }

    /// The loaded model, or `None` while loading or after a failed load
    pub fn current(&self) -> Option<SharedClassifier> {
        match self.slot.get() {
            Some(LoadOutcome::Ready { model, .. }) => Some(model.clone()),
            _ => None,
        }
    }

    pub fn status(&self) -> ModelStatus {
        match self.slot.get() {
            None => ModelStatus::Loading,
            Some(LoadOutcome::Ready { .. }) => ModelStatus::Ready,
            Some(LoadOutcome::Unavailable) => ModelStatus::Unavailable,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ModelStatus::Ready
    }

    /// How long the successful load took
    pub fn load_time(&self) -> Option<Duration> {
        match self.slot.get() {
            Some(LoadOutcome::Ready { load_time, .. }) => Some(*load_time),
            _ => None,
        }
    }
}
