//! Performance metrics and statistics tracking for the scoring service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const MAX_SAMPLES: usize = 10_000;

/// Metrics collector for the scoring service
pub struct ServiceMetrics {
    /// Total analyses served
    pub analyses_processed: AtomicU64,
    /// Analyses whose score crossed the requested threshold
    pub warnings_issued: AtomicU64,
    /// Requests answered with the neutral profile because no model was ready
    pub neutral_fallbacks: AtomicU64,
    /// Classifier calls that failed and were downgraded to the neutral profile
    pub inference_failures: AtomicU64,
    /// Analyses written to storage
    pub writes_persisted: AtomicU64,
    /// Analyses the backend failed to store
    pub writes_failed: AtomicU64,
    /// Analyses dropped because the write queue was full or closed
    pub writes_dropped: AtomicU64,
    /// End-to-end processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Classifier call times (in microseconds)
    inference_times: RwLock<Vec<u64>>,
    /// Regret score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            analyses_processed: AtomicU64::new(0),
            warnings_issued: AtomicU64::new(0),
            neutral_fallbacks: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            writes_persisted: AtomicU64::new(0),
            writes_failed: AtomicU64::new(0),
            writes_dropped: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            inference_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a served analysis
    pub fn record_analysis(&self, processing_time: Duration, regret_score: f64, warned: bool) {
        self.analyses_processed.fetch_add(1, Ordering::Relaxed);
        if warned {
            self.warnings_issued.fetch_add(1, Ordering::Relaxed);
        }

        push_sample(&self.processing_times, processing_time);

        let bucket = (regret_score * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record one classifier call
    pub fn record_inference(&self, duration: Duration) {
        push_sample(&self.inference_times, duration);
    }

    pub fn record_neutral_fallback(&self) {
        self.neutral_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_persisted(&self) {
        self.writes_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failed(&self) {
        self.writes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_dropped(&self) {
        self.writes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// End-to-end processing time statistics
    pub fn get_processing_stats(&self) -> LatencyStats {
        LatencyStats::from_samples(&self.processing_times)
    }

    /// Classifier call time statistics
    pub fn get_inference_stats(&self) -> LatencyStats {
        LatencyStats::from_samples(&self.inference_times)
    }

    /// Requests per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.analyses_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let processed = self.analyses_processed.load(Ordering::Relaxed);
        let warned = self.warnings_issued.load(Ordering::Relaxed);
        let warn_rate = if processed > 0 {
            (warned as f64 / processed as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let inference = self.get_inference_stats();

        info!(
            processed,
            warned,
            warn_rate = format!("{:.1}%", warn_rate),
            throughput = format!("{:.2} req/s", self.get_throughput()),
            "Scoring summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            inference_mean_us = inference.mean_us,
            inference_p99_us = inference.p99_us,
            "Latency summary"
        );
        info!(
            neutral_fallbacks = self.neutral_fallbacks.load(Ordering::Relaxed),
            inference_failures = self.inference_failures.load(Ordering::Relaxed),
            writes_persisted = self.writes_persisted.load(Ordering::Relaxed),
            writes_failed = self.writes_failed.load(Ordering::Relaxed),
            writes_dropped = self.writes_dropped.load(Ordering::Relaxed),
            "Degradation summary"
        );

        let distribution = self.get_score_distribution();
        let total: u64 = distribution.iter().sum();
        if total > 0 {
            for (i, &count) in distribution.iter().enumerate() {
                let pct = (count as f64 / total as f64) * 100.0;
                let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
                info!(
                    "  score {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct,
                    bar
                );
            }
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn push_sample(samples: &RwLock<Vec<u64>>, duration: Duration) {
    if let Ok(mut times) = samples.write() {
        times.push(duration.as_micros() as u64);
        // Keep only the most recent half once full
        if times.len() > MAX_SAMPLES {
            times.drain(0..MAX_SAMPLES / 2);
        }
    }
}

/// Latency statistics over recent samples
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl LatencyStats {
    fn from_samples(samples: &RwLock<Vec<u64>>) -> Self {
        let mut sorted = match samples.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return Self::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();

        Self {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }
}

/// Periodically logs a metrics summary
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Run the reporting loop. Never returns.
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
