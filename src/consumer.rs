//! Raw ride event feeds
//!
//! A [`StreamSource`] hands the scheduler whatever complete records have
//! arrived since the previous poll. The TCP source reads newline-delimited
//! records from one long-lived connection; the channel source feeds records
//! from inside the process.

use crate::config::AppConfig;
use crate::error::SourceError;
use crate::types::RawRecord;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Ordered, at-least-once feed of raw records
pub trait StreamSource: Send {
    /// Records available since the last poll, in arrival order.
    ///
    /// An empty batch is a normal quiet period, not an error.
    fn poll(&mut self) -> impl Future<Output = Result<Vec<RawRecord>, SourceError>> + Send;

    /// Re-establish a dropped link
    fn reconnect(&mut self) -> impl Future<Output = Result<(), SourceError>> + Send;

    /// Release the underlying connection
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    /// Human-readable endpoint for logs
    fn endpoint(&self) -> String;
}

/// Newline-delimited records from a TCP endpoint
pub struct TcpStreamSource {
    endpoint: String,
    reader: Option<BufReader<TcpStream>>,
    /// Bytes of a record whose terminating newline has not arrived yet
    pending: Vec<u8>,
    poll_timeout: Duration,
    max_batch_size: usize,
}

impl TcpStreamSource {
    /// Connect to `endpoint` (`host:port`)
    pub async fn connect(
        endpoint: impl Into<String>,
        poll_timeout: Duration,
        max_batch_size: usize,
    ) -> Result<Self, SourceError> {
        let mut source = Self {
            endpoint: endpoint.into(),
            reader: None,
            pending: Vec::new(),
            poll_timeout,
            max_batch_size: max_batch_size.max(1),
        };
        source.open().await?;
        Ok(source)
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self, SourceError> {
        Self::connect(
            config.source.endpoint(),
            config.source.poll_timeout(),
            config.pipeline.max_batch_size,
        )
        .await
    }

    async fn open(&mut self) -> Result<(), SourceError> {
        let stream = TcpStream::connect(&self.endpoint)
            .await
            .map_err(|source| SourceError::Connect {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        stream.set_nodelay(true).ok();

        info!(endpoint = %self.endpoint, "Connected to ride event feed");
        self.reader = Some(BufReader::new(stream));
        self.pending.clear();
        Ok(())
    }

    fn lost(&self, reason: impl Into<String>) -> SourceError {
        SourceError::ConnectionLost {
            endpoint: self.endpoint.clone(),
            reason: reason.into(),
        }
    }

    /// Read until the next newline into `pending`.
    ///
    /// Returns `Ok(Some(record))` for a complete line and `Ok(None)` on EOF.
    /// Partial input stays in `pending`, so a timed-out read loses nothing.
    async fn read_record(
        reader: &mut BufReader<TcpStream>,
        pending: &mut Vec<u8>,
    ) -> std::io::Result<Option<RawRecord>> {
        let n = reader.read_until(b'\n', pending).await?;
        if n == 0 || pending.last() != Some(&b'\n') {
            return Ok(None);
        }
        let mut record = std::mem::take(pending);
        record.pop();
        if record.last() == Some(&b'\r') {
            record.pop();
        }
        Ok(Some(record))
    }
}

impl StreamSource for TcpStreamSource {
    async fn poll(&mut self) -> Result<Vec<RawRecord>, SourceError> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(self.lost("connection closed"));
        };
        let mut records = Vec::new();

        // Wait a bounded time for the first record
        let first = match tokio::time::timeout(
            self.poll_timeout,
            Self::read_record(reader, &mut self.pending),
        )
        .await
        {
            Err(_elapsed) => return Ok(records),
            Ok(result) => result,
        };
        match first {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {
                self.reader = None;
                return Err(self.lost("peer closed the connection"));
            }
            Err(e) => {
                self.reader = None;
                return Err(self.lost(e.to_string()));
            }
        }

        // Drain further complete records already buffered, without blocking
        while records.len() < self.max_batch_size && reader.buffer().contains(&b'\n') {
            match Self::read_record(reader, &mut self.pending).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => break,
                Err(e) => {
                    self.reader = None;
                    return Err(self.lost(e.to_string()));
                }
            }
        }

        records.retain(|r| !r.iter().all(u8::is_ascii_whitespace));
        debug!(endpoint = %self.endpoint, count = records.len(), "Polled records");
        Ok(records)
    }

    async fn reconnect(&mut self) -> Result<(), SourceError> {
        self.reader = None;
        self.open().await
    }

    async fn close(&mut self) {
        if self.reader.take().is_some() {
            info!(endpoint = %self.endpoint, "Closed ride event feed");
        }
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

/// In-process feed backed by a tokio channel.
///
/// Each message is one raw record. Once every sender is dropped and the
/// buffered records are consumed, polling reports a lost connection.
pub struct ChannelSource {
    receiver: mpsc::Receiver<RawRecord>,
    poll_timeout: Duration,
    max_batch_size: usize,
}

impl ChannelSource {
    pub fn new(
        receiver: mpsc::Receiver<RawRecord>,
        poll_timeout: Duration,
        max_batch_size: usize,
    ) -> Self {
        Self {
            receiver,
            poll_timeout,
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Create a bounded channel and the source reading from it
    pub fn channel(capacity: usize, poll_timeout: Duration) -> (mpsc::Sender<RawRecord>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx, poll_timeout, capacity))
    }

    fn lost() -> SourceError {
        SourceError::ConnectionLost {
            endpoint: "channel".to_string(),
            reason: "all senders dropped".to_string(),
        }
    }
}

impl StreamSource for ChannelSource {
    async fn poll(&mut self) -> Result<Vec<RawRecord>, SourceError> {
        let mut records = Vec::new();

        match tokio::time::timeout(self.poll_timeout, self.receiver.recv()).await {
            Err(_elapsed) => return Ok(records),
            Ok(None) => return Err(Self::lost()),
            Ok(Some(record)) => records.push(record),
        }

        while records.len() < self.max_batch_size {
            match self.receiver.try_recv() {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
        }
        Ok(records)
    }

    async fn reconnect(&mut self) -> Result<(), SourceError> {
        Err(Self::lost())
    }

    async fn close(&mut self) {
        self.receiver.close();
    }

    fn endpoint(&self) -> String {
        "channel".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_millis(200);

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_tcp_poll_in_order() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"one\ntwo\r\n\nthree\n").await.unwrap();
            socket
        });

        let mut source = TcpStreamSource::connect(addr, TIMEOUT, 16).await.unwrap();
        let _socket = server.await.unwrap();

        let mut received = Vec::new();
        while received.len() < 3 {
            received.extend(source.poll().await.unwrap());
        }
        assert_eq!(
            received,
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_tcp_quiet_period_is_empty() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let mut source = TcpStreamSource::connect(addr, TIMEOUT, 16).await.unwrap();
        let _socket = server.await.unwrap();

        assert!(source.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tcp_partial_line_survives_timeout() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let mut source = TcpStreamSource::connect(addr, TIMEOUT, 16).await.unwrap();
        let mut socket = server.await.unwrap();

        socket.write_all(b"{\"ride_").await.unwrap();
        assert!(source.poll().await.unwrap().is_empty());

        socket.write_all(b"id\":\"A1\"}\n").await.unwrap();
        let records = source.poll().await.unwrap();
        assert_eq!(records, vec![b"{\"ride_id\":\"A1\"}".to_vec()]);
    }

    #[tokio::test]
    async fn test_tcp_batch_size_cap() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"1\n2\n3\n4\n5\n").await.unwrap();
            socket
        });

        let mut source = TcpStreamSource::connect(addr, TIMEOUT, 2).await.unwrap();
        let _socket = server.await.unwrap();

        let mut batches = Vec::new();
        let mut total = 0;
        while total < 5 {
            let batch = source.poll().await.unwrap();
            assert!(batch.len() <= 2);
            total += batch.len();
            batches.push(batch);
        }
        let flat: Vec<RawRecord> = batches.into_iter().flatten().collect();
        assert_eq!(flat.first(), Some(&b"1".to_vec()));
        assert_eq!(flat.last(), Some(&b"5".to_vec()));
    }

    #[tokio::test]
    async fn test_tcp_peer_close_is_connection_error() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut source = TcpStreamSource::connect(addr, TIMEOUT, 16).await.unwrap();
        server.await.unwrap();

        let mut result = source.poll().await;
        while matches!(&result, Ok(records) if records.is_empty()) {
            result = source.poll().await;
        }
        assert!(matches!(result, Err(SourceError::ConnectionLost { .. })));
    }

    #[tokio::test]
    async fn test_tcp_connect_refused() {
        let (listener, addr) = listener().await;
        drop(listener);

        let result = TcpStreamSource::connect(addr, TIMEOUT, 16).await;
        assert!(matches!(result, Err(SourceError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_channel_source() {
        let (tx, mut source) = ChannelSource::channel(8, TIMEOUT);

        assert!(source.poll().await.unwrap().is_empty());

        tx.send(b"a".to_vec()).await.unwrap();
        tx.send(b"b".to_vec()).await.unwrap();
        assert_eq!(source.poll().await.unwrap(), vec![b"a".to_vec(), b"b".to_vec()]);

        drop(tx);
        assert!(source.poll().await.is_err());
        assert!(source.reconnect().await.is_err());
    }
}
