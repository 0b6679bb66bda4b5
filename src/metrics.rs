//! Throughput and accuracy tracking for the scoring pipeline.

use crate::types::result::BatchOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Micro-batches that consumed at least one record
    pub batches: AtomicU64,
    /// Raw records pulled from the source
    pub records_received: AtomicU64,
    /// Records dropped by the parser
    pub records_dropped: AtomicU64,
    /// Results appended to the sink
    pub results_emitted: AtomicU64,
    /// Batch processing times (in microseconds)
    batch_times: RwLock<Vec<u64>>,
    /// Running deviation totals: (sum, max)
    deviation: RwLock<(f64, f64)>,
    /// Start time for rate calculation
    start_time: Instant,
}

/// Batch latency summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub count: usize,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            batches: AtomicU64::new(0),
            records_received: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            results_emitted: AtomicU64::new(0),
            batch_times: RwLock::new(Vec::with_capacity(1000)),
            deviation: RwLock::new((0.0, 0.0)),
            start_time: Instant::now(),
        }
    }

    /// Record one appended micro-batch
    pub fn record_batch(&self, outcome: &BatchOutcome, processing_time: Duration) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.records_received
            .fetch_add(outcome.received() as u64, Ordering::Relaxed);
        self.records_dropped
            .fetch_add(outcome.dropped as u64, Ordering::Relaxed);
        self.results_emitted
            .fetch_add(outcome.results.len() as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.batch_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Ok(mut deviation) = self.deviation.write() {
            for result in &outcome.results {
                deviation.0 += result.deviation;
                deviation.1 = deviation.1.max(result.deviation);
            }
        }
    }

    /// Mean absolute deviation over every emitted result
    pub fn mean_absolute_deviation(&self) -> f64 {
        let emitted = self.results_emitted.load(Ordering::Relaxed);
        if emitted == 0 {
            return 0.0;
        }
        self.deviation
            .read()
            .map(|d| d.0 / emitted as f64)
            .unwrap_or(0.0)
    }

    pub fn max_deviation(&self) -> f64 {
        self.deviation.read().map(|d| d.1).unwrap_or(0.0)
    }

    pub fn get_batch_stats(&self) -> BatchStats {
        let Ok(times) = self.batch_times.read() else {
            return BatchStats::default();
        };
        if times.is_empty() {
            return BatchStats::default();
        }

        let mut sorted = times.clone();
        sorted.sort_unstable();
        let count = sorted.len();
        let percentile = |p: usize| sorted[(count * p / 100).min(count - 1)];

        BatchStats {
            count,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: percentile(50),
            p99_us: percentile(99),
            max_us: sorted[count - 1],
        }
    }

    /// Scored results per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.results_emitted.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        let stats = self.get_batch_stats();
        info!(
            batches = self.batches.load(Ordering::Relaxed),
            received = self.records_received.load(Ordering::Relaxed),
            dropped = self.records_dropped.load(Ordering::Relaxed),
            scored = self.results_emitted.load(Ordering::Relaxed),
            throughput = format!("{:.1} rides/s", self.get_throughput()),
            mean_abs_deviation = self.mean_absolute_deviation(),
            max_deviation = self.max_deviation(),
            batch_p50_us = stats.p50_us,
            batch_p99_us = stats.p99_us,
            "Pipeline metrics"
        );
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Log a summary every interval, forever
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.log_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::result::ScoringResult;

    fn outcome(deviations: &[f64], dropped: usize) -> BatchOutcome {
        BatchOutcome {
            results: deviations
                .iter()
                .enumerate()
                .map(|(i, &deviation)| ScoringResult {
                    id: format!("r{i}"),
                    distance_km: 1.0,
                    fare_amount: 3.0,
                    prediction: 3.0 - deviation,
                    deviation,
                })
                .collect(),
            dropped,
        }
    }

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_batch(&outcome(&[1.0, 0.0], 1), Duration::from_micros(100));
        metrics.record_batch(&outcome(&[2.0], 0), Duration::from_micros(300));

        assert_eq!(metrics.batches.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.records_received.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.records_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.results_emitted.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.mean_absolute_deviation(), 1.0);
        assert_eq!(metrics.max_deviation(), 2.0);
    }

    #[test]
    fn test_batch_stats() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.get_batch_stats(), BatchStats::default());

        for us in [100, 200, 300, 400] {
            metrics.record_batch(&outcome(&[], 0), Duration::from_micros(us));
        }
        let stats = metrics.get_batch_stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_us, 250);
        assert_eq!(stats.max_us, 400);
        assert_eq!(stats.p50_us, 300);
    }

    #[test]
    fn test_empty_deviation() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.mean_absolute_deviation(), 0.0);
    }
}
