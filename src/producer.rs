//! Append-only outputs for scoring results

use crate::config::{AppConfig, SinkKind};
use crate::error::SinkError;
use crate::types::result::ScoringResult;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Ordered, append-only destination for scoring results.
///
/// A batch is written in the order given; earlier output is never revisited.
pub trait ResultSink: Send {
    fn append(
        &mut self,
        batch: &[ScoringResult],
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Console table rows, one block per micro-batch
pub struct ConsoleSink<W = tokio::io::Stdout> {
    out: W,
    batch_id: u64,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, batch_id: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(batch_id: u64, batch: &[ScoringResult]) -> String {
        let rule = "-".repeat(96);
        let mut text = format!(
            "{rule}\nBatch: {batch_id}\n{rule}\n| {:<36} | {:>11} | {:>11} | {:>12} | {:>11} |\n",
            "ride_id", "distance_km", "fare_amount", "prediction", "deviation"
        );
        for r in batch {
            text.push_str(&format!(
                "| {:<36} | {:>11.3} | {:>11.2} | {:>12.4} | {:>11.4} |\n",
                r.id, r.distance_km, r.fare_amount, r.prediction, r.deviation
            ));
        }
        text
    }
}

impl<W: AsyncWrite + Unpin + Send> ResultSink for ConsoleSink<W> {
    async fn append(&mut self, batch: &[ScoringResult]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        let text = Self::render(self.batch_id, batch);
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await?;
        self.batch_id += 1;
        Ok(())
    }
}

/// JSON lines file opened in append mode
pub struct JsonLinesSink {
    path: PathBuf,
    file: File,
}

impl JsonLinesSink {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonLinesSink {
    async fn append(&mut self, batch: &[ScoringResult]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut payload = Vec::with_capacity(batch.len() * 128);
        for result in batch {
            serde_json::to_writer(&mut payload, result)?;
            payload.push(b'\n');
        }
        self.file.write_all(&payload).await?;
        self.file.flush().await?;

        debug!(path = %self.path.display(), count = batch.len(), "Appended results");
        Ok(())
    }
}

/// Shared in-memory result log
#[derive(Clone, Default)]
pub struct MemorySink {
    results: Arc<Mutex<Vec<ScoringResult>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far
    pub fn snapshot(&self) -> Vec<ScoringResult> {
        self.results
            .lock()
            .map(|results| results.clone())
            .unwrap_or_default()
    }
}

impl ResultSink for MemorySink {
    async fn append(&mut self, batch: &[ScoringResult]) -> Result<(), SinkError> {
        let mut results = self
            .results
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        results.extend_from_slice(batch);
        Ok(())
    }
}

/// Sink selected by configuration
pub enum ConfiguredSink {
    Console(ConsoleSink),
    Jsonl(JsonLinesSink),
}

impl ConfiguredSink {
    pub async fn from_config(config: &AppConfig) -> Result<Self, SinkError> {
        match (&config.sink.kind, &config.sink.path) {
            (SinkKind::Console, _) => Ok(Self::Console(ConsoleSink::stdout())),
            (SinkKind::Jsonl, Some(path)) => Ok(Self::Jsonl(JsonLinesSink::open(path).await?)),
            (SinkKind::Jsonl, None) => Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "jsonl sink requires sink.path",
            ))),
        }
    }
}

impl ResultSink for ConfiguredSink {
    async fn append(&mut self, batch: &[ScoringResult]) -> Result<(), SinkError> {
        match self {
            Self::Console(sink) => sink.append(batch).await,
            Self::Jsonl(sink) => sink.append(batch).await,
        }
    }
}
