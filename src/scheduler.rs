//! Micro-batch scheduling of the scoring pipeline
//!
//! One task owns the source, the sink and the loaded model. On every
//! trigger it drains the records that have arrived, scores them in arrival
//! order and appends the batch to the sink. Stop requests are honored only
//! between batches, so a batch is either fully appended or never started.

use crate::config::AppConfig;
use crate::consumer::StreamSource;
use crate::error::{PipelineError, SourceError};
use crate::feature_extractor::{DistanceFeatures, FeatureVectorizer};
use crate::metrics::PipelineMetrics;
use crate::models::inference::ScoringEngine;
use crate::models::store::ModelStore;
use crate::parser::RecordParser;
use crate::producer::ResultSink;
use crate::types::result::BatchOutcome;
use crate::types::RawRecord;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Upper bound on the wait between reconnect attempts
pub const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// Lifecycle of a scheduler run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Requests a cooperative stop of a running scheduler
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Finish the in-flight batch, then stop
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Counters for a completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: u64,
    pub received: u64,
    pub dropped: u64,
    pub scored: u64,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub trigger_interval: Duration,
    /// 0 makes any connection loss fatal
    pub reconnect_attempts: u32,
    pub reconnect_backoff: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            trigger_interval: config.pipeline.trigger_interval(),
            reconnect_attempts: config.source.reconnect_attempts,
            reconnect_backoff: config.source.reconnect_backoff(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Parse → vectorize → score → deviation for one batch of raw records
pub struct ScoringPipeline<V = DistanceFeatures> {
    parser: RecordParser,
    vectorizer: V,
    engine: ScoringEngine,
}

impl<V: FeatureVectorizer> ScoringPipeline<V> {
    /// Fails if the vectorizer's output does not fit the model
    pub fn new(engine: ScoringEngine, vectorizer: V) -> Result<Self, PipelineError> {
        if vectorizer.dimension() != engine.feature_count() {
            return Err(PipelineError::FeatureDimension {
                vectorizer: vectorizer.dimension(),
                model: engine.feature_count(),
            });
        }
        Ok(Self {
            parser: RecordParser::new(),
            vectorizer,
            engine,
        })
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    /// Score `records` in order; malformed records are dropped and counted
    pub fn process_batch(&self, records: &[RawRecord]) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            results: Vec::with_capacity(records.len()),
            dropped: 0,
        };

        for raw in records {
            let event = match self.parser.parse(raw) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Dropped malformed ride record");
                    outcome.dropped += 1;
                    continue;
                }
            };

            let features = self.vectorizer.vectorize(&event);
            match self.engine.score_event(&event, &features) {
                Ok(result) => outcome.results.push(result),
                Err(e) => {
                    warn!(ride_id = %event.id, error = %e, "Dropped unscorable ride");
                    outcome.dropped += 1;
                }
            }
        }

        outcome
    }
}

/// Drives the scoring pipeline over a [`StreamSource`] until stopped
pub struct MicroBatchScheduler<S, K, V = DistanceFeatures> {
    source: S,
    sink: K,
    vectorizer: Arc<V>,
    settings: SchedulerSettings,
    metrics: Arc<PipelineMetrics>,
    state_tx: watch::Sender<PipelineState>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl<S: StreamSource, K: ResultSink> MicroBatchScheduler<S, K> {
    /// Scheduler scoring distance-only feature vectors
    pub fn new(source: S, sink: K, settings: SchedulerSettings) -> Self {
        Self::with_vectorizer(source, sink, DistanceFeatures::new(), settings)
    }
}

impl<S, K, V> MicroBatchScheduler<S, K, V>
where
    S: StreamSource,
    K: ResultSink,
    V: FeatureVectorizer,
{
    pub fn with_vectorizer(source: S, sink: K, vectorizer: V, settings: SchedulerSettings) -> Self {
        let (state_tx, _) = watch::channel(PipelineState::Starting);
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            source,
            sink,
            vectorizer: Arc::new(vectorizer),
            settings,
            metrics: Arc::new(PipelineMetrics::new()),
            state_tx,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        }
    }

    /// Share a metrics collector with the caller
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions from another task
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: PipelineState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "Pipeline state changed");
        }
    }

    /// Load `model_name` from `store`, then score batches until stopped.
    ///
    /// A model that cannot be loaded ends the run in `Failed` without ever
    /// reaching `Running`.
    pub async fn run(
        mut self,
        store: &ModelStore,
        model_name: &str,
    ) -> Result<RunSummary, PipelineError> {
        match store.load(model_name) {
            Ok(model) => self.serve(ScoringEngine::new(model)).await,
            Err(e) => {
                error!(model = %model_name, error = %e, "Failed to load model");
                self.fail().await;
                Err(e.into())
            }
        }
    }

    /// Score batches with an already loaded model until stopped
    pub async fn serve(mut self, engine: ScoringEngine) -> Result<RunSummary, PipelineError> {
        let pipeline = match ScoringPipeline::new(engine, self.vectorizer.clone()) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!(error = %e, "Feature layout does not match model");
                self.fail().await;
                return Err(e);
            }
        };

        info!(
            endpoint = %self.source.endpoint(),
            model_version = %pipeline.engine().model().version,
            trigger_ms = self.settings.trigger_interval.as_millis() as u64,
            "Starting micro-batch scoring"
        );
        self.set_state(PipelineState::Running);

        match self.run_loop(&pipeline).await {
            Ok(summary) => {
                self.set_state(PipelineState::Stopping);
                self.source.close().await;
                self.set_state(PipelineState::Stopped);
                info!(
                    batches = summary.batches,
                    scored = summary.scored,
                    dropped = summary.dropped,
                    "Micro-batch scoring stopped"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "Micro-batch scoring failed");
                self.fail().await;
                Err(e)
            }
        }
    }

    async fn fail(&mut self) {
        self.source.close().await;
        self.set_state(PipelineState::Failed);
    }

    async fn run_loop<W: FeatureVectorizer>(
        &mut self,
        pipeline: &ScoringPipeline<W>,
    ) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();
        let period = self.settings.trigger_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *self.stop_rx.borrow() {
                return Ok(summary);
            }

            tokio::select! {
                biased;
                changed = self.stop_rx.changed() => {
                    // The sender lives in `self`, so this only fires on a stop request
                    if changed.is_ok() {
                        continue;
                    }
                }
                _ = ticker.tick() => {}
            }

            let records = self.poll_source().await?;
            if records.is_empty() {
                continue;
            }

            let started = Instant::now();
            let outcome = pipeline.process_batch(&records);
            self.sink.append(&outcome.results).await?;

            let elapsed = started.elapsed();
            self.metrics.record_batch(&outcome, elapsed);
            summary.batches += 1;
            summary.received += outcome.received() as u64;
            summary.dropped += outcome.dropped as u64;
            summary.scored += outcome.results.len() as u64;

            debug!(
                batch = summary.batches,
                received = outcome.received(),
                scored = outcome.results.len(),
                dropped = outcome.dropped,
                elapsed_us = elapsed.as_micros() as u64,
                "Batch appended"
            );
        }
    }

    async fn poll_source(&mut self) -> Result<Vec<RawRecord>, SourceError> {
        match self.source.poll().await {
            Ok(records) => Ok(records),
            Err(e) if self.settings.reconnect_attempts == 0 => Err(e),
            Err(e) => {
                warn!(error = %e, "Ride event feed dropped, reconnecting");
                self.reconnect(e).await?;
                Ok(Vec::new())
            }
        }
    }

    /// Retry the source with exponential backoff.
    ///
    /// A stop request during a backoff wait abandons the retries and returns
    /// `Ok`, leaving `run_loop` to shut down normally.
    async fn reconnect(&mut self, mut last: SourceError) -> Result<(), SourceError> {
        let mut backoff = self.settings.reconnect_backoff;
        let max_backoff = MAX_RECONNECT_BACKOFF.max(backoff);

        for attempt in 1..=self.settings.reconnect_attempts {
            if self.stopped_within(backoff).await {
                info!(attempt, "Stop requested while reconnecting");
                return Ok(());
            }
            match self.source.reconnect().await {
                Ok(()) => {
                    info!(attempt, endpoint = %self.source.endpoint(), "Reconnected to ride event feed");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.settings.reconnect_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                    last = e;
                    backoff = next_backoff(backoff, max_backoff);
                }
            }
        }

        Err(last)
    }

    /// Wait up to `delay`; true if a stop was requested
    async fn stopped_within(&mut self, delay: Duration) -> bool {
        if *self.stop_rx.borrow() {
            return true;
        }
        tokio::select! {
            biased;
            // Only a stop request changes the value
            changed = self.stop_rx.changed() => changed.is_ok(),
            _ = tokio::time::sleep(delay) => false,
        }
    }
}
