//! Statsite (statsd line protocol over TCP) sink.
//!
//! Metrics are queued and written by a background task so callers never
//! block on the network. When the queue is full new metrics are dropped.

use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::observability::metrics::{MetricSink, TelemetrySinkError};

const QUEUE_SIZE: usize = 4096;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Sink that streams metrics to a statsite server.
#[derive(Debug)]
pub struct StatsiteSink {
    addr: String,
    tx: mpsc::Sender<String>,
}

impl StatsiteSink {
    /// Connect to `addr`. Failure to connect is returned, not retried.
    pub async fn connect(addr: &str) -> Result<Self, TelemetrySinkError> {
        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(TelemetrySinkError {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(TelemetrySinkError {
                    addr: addr.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };

        let (tx, rx) = mpsc::channel(QUEUE_SIZE);
        tokio::spawn(flush_metrics(addr.to_string(), stream, rx));

        tracing::info!(addr = %addr, "Statsite sink connected");
        Ok(Self {
            addr: addr.to_string(),
            tx,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn push(&self, key: &str, value: f64, kind: &str) {
        let line = format_line(key, value, kind);
        if self.tx.try_send(line).is_err() {
            tracing::trace!(key = %key, "Statsite queue full, dropping metric");
        }
    }
}

impl MetricSink for StatsiteSink {
    fn set_gauge(&self, key: &str, value: f64) {
        self.push(key, value, "g");
    }

    fn incr_counter(&self, key: &str, value: f64) {
        self.push(key, value, "c");
    }

    fn add_sample(&self, key: &str, value: f64) {
        self.push(key, value, "ms");
    }
}

fn format_line(key: &str, value: f64, kind: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| if c == ':' || c == ' ' || c == '|' { '_' } else { c })
        .collect();
    format!("{}:{}|{}\n", key, value, kind)
}

async fn flush_metrics(addr: String, stream: TcpStream, mut rx: mpsc::Receiver<String>) {
    let mut writer = Some(BufWriter::new(stream));

    while let Some(line) = rx.recv().await {
        let mut batch = vec![line];
        while let Ok(line) = rx.try_recv() {
            batch.push(line);
        }

        if writer.is_none() {
            match TcpStream::connect(&addr).await {
                Ok(stream) => writer = Some(BufWriter::new(stream)),
                Err(e) => {
                    tracing::warn!(addr = %addr, error = %e, "Statsite reconnect failed, dropping metrics");
                    continue;
                }
            }
        }

        let Some(w) = writer.as_mut() else {
            continue;
        };

        let mut result = Ok(());
        for line in &batch {
            result = w.write_all(line.as_bytes()).await;
            if result.is_err() {
                break;
            }
        }
        if result.is_ok() {
            result = w.flush().await;
        }

        if let Err(e) = result {
            tracing::warn!(addr = %addr, error = %e, "Statsite write failed, reconnecting");
            writer = None;
        }
    }
}
