//! Inference executor that keeps classifier calls off the request path

use crate::metrics::ServiceMetrics;
use crate::models::loader::ModelLoader;
use crate::types::analysis::ToxicityProfile;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// Runs classifier calls on the blocking thread pool, at most `workers` at a time.
///
/// Never fails: a missing model, a classifier error or a panicking worker all
/// yield the neutral profile.
pub struct InferenceExecutor {
    loader: Arc<ModelLoader>,
    /// Limits concurrent inference calls
    permits: Arc<Semaphore>,
    workers: usize,
    max_input_chars: usize,
    metrics: Arc<ServiceMetrics>,
}

impl InferenceExecutor {
    pub fn new(
        loader: Arc<ModelLoader>,
        workers: usize,
        max_input_chars: usize,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        let workers = workers.max(1);
        Self {
            loader,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            max_input_chars,
            metrics,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn loader(&self) -> &Arc<ModelLoader> {
        &self.loader
    }

    /// Score `text`, suspending only on the offloaded work.
    ///
    /// Text longer than the configured limit is truncated before it reaches
    /// the classifier. Every returned value is in [0, 1].
    pub async fn score(&self, text: &str) -> ToxicityProfile {
        let Some(model) = self.loader.current() else {
            self.metrics.record_neutral_fallback();
            return ToxicityProfile::neutral();
        };

        let input = truncate_chars(text, self.max_input_chars).to_string();
        let model_name = model.name().to_string();

        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(error = %e, "Inference pool closed");
                self.metrics.record_inference_failure();
                return ToxicityProfile::neutral();
            }
        };

        let start = Instant::now();
        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            model.predict(&input)
        })
        .await;

        match joined {
            Ok(Ok(scores)) => {
                let elapsed = start.elapsed();
                self.metrics.record_inference(elapsed);
                debug!(
                    model = %model_name,
                    inference_us = elapsed.as_micros(),
                    "Inference complete"
                );
                ToxicityProfile::from_scores(&scores)
            }
            Ok(Err(e)) => {
                error!(model = %model_name, error = %e, "Toxicity inference failed");
                self.metrics.record_inference_failure();
                ToxicityProfile::neutral()
            }
            Err(e) => {
                error!(model = %model_name, error = %e, "Inference worker panicked");
                self.metrics.record_inference_failure();
                ToxicityProfile::neutral()
            }
        }
    }
}

/// First `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classifier::testing::{FailingClassifier, FixedClassifier, PanickingClassifier};
    use crate::models::classifier::ToxicityClassifier;
    use crate::models::loader::SharedClassifier;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn ready_loader(model: SharedClassifier) -> Arc<ModelLoader> {
        let (loader, handle) = ModelLoader::spawn(move || Ok(model));
        handle.await.unwrap();
        loader
    }

    fn executor(loader: Arc<ModelLoader>) -> (InferenceExecutor, Arc<ServiceMetrics>) {
        let metrics = Arc::new(ServiceMetrics::new());
        (InferenceExecutor::new(loader, 4, 2000, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_pool_has_at_least_one_worker() {
        let loader = ready_loader(Arc::new(FixedClassifier::new(&[]))).await;
        let metrics = Arc::new(ServiceMetrics::new());

        assert_eq!(InferenceExecutor::new(loader.clone(), 4, 2000, metrics.clone()).workers(), 4);
        assert_eq!(InferenceExecutor::new(loader, 0, 2000, metrics).workers(), 1);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 2), "");
    }

    #[tokio::test]
    async fn test_scores_with_ready_model() {
        let model = Arc::new(FixedClassifier::new(&[("toxicity", 0.8), ("insult", 1.3)]));
        let (executor, _) = executor(ready_loader(model.clone()).await);

        let profile = executor.score("you are awful").await;

        assert_eq!(profile.toxicity, 0.8);
        assert_eq!(profile.insult, 1.0);
        assert_eq!(profile.threat, 0.0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_long_text_truncated_before_inference() {
        let model = Arc::new(FixedClassifier::new(&[]));
        let (executor, _) = executor(ready_loader(model.clone()).await);

        let text = "x".repeat(3500);
        executor.score(&text).await;

        let seen = model.last_input.lock().unwrap().clone().unwrap();
        assert_eq!(seen.chars().count(), 2000);
    }

    #[tokio::test]
    async fn test_neutral_while_loading() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (loader, handle) = ModelLoader::spawn(move || {
            release_rx.recv().ok();
            Ok(Arc::new(FixedClassifier::new(&[("toxicity", 1.0)])) as SharedClassifier)
        });
        let (executor, metrics) = executor(loader);

        let profile = executor.score("anything").await;
        assert_eq!(profile, ToxicityProfile::neutral());
        assert_eq!(metrics.neutral_fallbacks.load(Ordering::Relaxed), 1);

        release_tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(executor.score("anything").await.toxicity, 1.0);
    }

    #[tokio::test]
    async fn test_neutral_when_unavailable() {
        let (loader, handle) = ModelLoader::spawn(|| anyhow::bail!("no weights"));
        handle.await.unwrap();
        let (executor, _) = executor(loader);

        assert_eq!(executor.score("anything").await, ToxicityProfile::neutral());
    }

    #[tokio::test]
    async fn test_inference_error_downgraded() {
        let (executor, metrics) = executor(ready_loader(Arc::new(FailingClassifier)).await);

        assert_eq!(executor.score("anything").await, ToxicityProfile::neutral());
        assert_eq!(metrics.inference_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_inference_panic_downgraded() {
        let (executor, metrics) = executor(ready_loader(Arc::new(PanickingClassifier)).await);

        assert_eq!(executor.score("anything").await, ToxicityProfile::neutral());
        assert_eq!(metrics.inference_failures.load(Ordering::Relaxed), 1);

        // Permit was released despite the panic
        assert_eq!(executor.permits.available_permits(), 4);
    }

    struct SlowClassifier {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ToxicityClassifier for SlowClassifier {
        fn predict(&self, _text: &str) -> anyhow::Result<HashMap<String, f64>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(HashMap::new())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrency_bounded_by_workers() {
        let model = Arc::new(SlowClassifier {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let loader = ready_loader(model.clone()).await;
        let executor = Arc::new(InferenceExecutor::new(
            loader,
            4,
            2000,
            Arc::new(ServiceMetrics::new()),
        ));

        let tasks: Vec<_> = (0..12)
            .map(|i| {
                let executor = executor.clone();
                tokio::spawn(async move { executor.score(&format!("text {i}")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let peak = model.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 4, "peak concurrency was {peak}");
    }
}
