//! Metrics collection and telemetry wiring.
//!
//! # Responsibilities
//! - Build the in-memory aggregator (10s intervals, 1 minute retention)
//! - Optionally fan out to a statsite sink
//! - Dump the in-memory aggregate whenever a dump is requested
//!
//! # Metrics
//! - `agent.join.success` / `agent.join.failure` (counter): join attempts
//! - `agent.catalog.services` / `agent.catalog.checks` (gauge): local catalog size
//! - `agent.rpc.connections` (counter): accepted internal RPC connections
//! - `agent.http.request` (sample, ms): HTTP API latency
//!
//! # Design Decisions
//! - No global recorder: the sink is built here and passed down as [`Telemetry`]
//! - The `metrics` crate's `Recorder` is the sink seam, so anything that speaks
//!   `metrics` can record into the agent's sinks
//! - Hostname tagging only when metrics leave the process
//! - Handles are registered once per name and reused, so gauge state persists

use dashmap::DashMap;
use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Label, Level,
    Metadata, Recorder, SharedString, Unit,
};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::observability::inmem::InmemSink;
use crate::observability::statsite::StatsiteSink;

/// Aggregation interval of the in-memory sink.
pub const INMEM_INTERVAL: Duration = Duration::from_secs(10);

/// Retention horizon of the in-memory sink.
pub const INMEM_RETAIN: Duration = Duration::from_secs(60);

/// The remote metrics sink could not be started.
#[derive(Debug, thiserror::Error)]
#[error("failed to start statsite sink at {addr}: {source}")]
pub struct TelemetrySinkError {
    pub addr: String,
    #[source]
    pub source: std::io::Error,
}

/// Destination for metric values.
pub trait MetricSink: Send + Sync {
    fn set_gauge(&self, key: &str, value: f64);
    fn incr_counter(&self, key: &str, value: f64);
    fn add_sample(&self, key: &str, value: f64);
}

/// Duplicates every write to each inner sink.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MetricSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn MetricSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricSink for FanoutSink {
    fn set_gauge(&self, key: &str, value: f64) {
        for sink in &self.sinks {
            sink.set_gauge(key, value);
        }
    }

    fn incr_counter(&self, key: &str, value: f64) {
        for sink in &self.sinks {
            sink.incr_counter(key, value);
        }
    }

    fn add_sample(&self, key: &str, value: f64) {
        for sink in &self.sinks {
            sink.add_sample(key, value);
        }
    }
}

/// Render a `metrics` key as a flat sink key (`name;label=value`).
pub fn flatten_key(key: &Key) -> String {
    let mut out = key.name().to_string();
    for label in key.labels() {
        out.push(';');
        out.push_str(label.key());
        out.push('=');
        out.push_str(label.value());
    }
    out
}

struct CounterHandle {
    sink: Arc<dyn MetricSink>,
    key: String,
}

impl CounterFn for CounterHandle {
    fn increment(&self, value: u64) {
        self.sink.incr_counter(&self.key, value as f64);
    }

    fn absolute(&self, value: u64) {
        self.sink.set_gauge(&self.key, value as f64);
    }
}

struct GaugeHandle {
    sink: Arc<dyn MetricSink>,
    key: String,
    bits: AtomicU64,
}

impl GaugeHandle {
    fn update(&self, f: impl Fn(f64) -> f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = f(f64::from_bits(current));
            match self.bits.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.sink.set_gauge(&self.key, next);
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }
}

impl GaugeFn for GaugeHandle {
    fn increment(&self, value: f64) {
        self.update(|v| v + value);
    }

    fn decrement(&self, value: f64) {
        self.update(|v| v - value);
    }

    fn set(&self, value: f64) {
        self.update(|_| value);
    }
}

struct HistogramHandle {
    sink: Arc<dyn MetricSink>,
    key: String,
}

impl HistogramFn for HistogramHandle {
    fn record(&self, value: f64) {
        self.sink.add_sample(&self.key, value);
    }
}

/// Adapts a [`MetricSink`] to the `metrics` crate's `Recorder`.
#[derive(Clone)]
pub struct SinkRecorder {
    sink: Arc<dyn MetricSink>,
}

impl SinkRecorder {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self { sink }
    }
}

impl Recorder for SinkRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CounterHandle {
            sink: self.sink.clone(),
            key: flatten_key(key),
        }))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(GaugeHandle {
            sink: self.sink.clone(),
            key: flatten_key(key),
            bits: AtomicU64::new(0f64.to_bits()),
        }))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(HistogramHandle {
            sink: self.sink.clone(),
            key: flatten_key(key),
        }))
    }
}

/// Registered handles, keyed by metric name.
#[derive(Default)]
struct Handles {
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
    histograms: DashMap<String, Histogram>,
}

/// The wired telemetry pipeline, passed to every component that emits metrics.
#[derive(Clone)]
pub struct Telemetry {
    recorder: SinkRecorder,
    inmem: Arc<InmemSink>,
    hostname: Option<String>,
    fanout: bool,
    handles: Arc<Handles>,
}

impl Telemetry {
    /// Telemetry that only aggregates in memory, without hostname tags.
    pub fn inmem_only(inmem: Arc<InmemSink>) -> Self {
        Self {
            recorder: SinkRecorder::new(inmem.clone()),
            inmem,
            hostname: None,
            fanout: false,
            handles: Arc::default(),
        }
    }

    /// Telemetry writing to the in-memory sink and `remote`, tagged with `hostname`.
    pub fn fanout(inmem: Arc<InmemSink>, remote: Arc<dyn MetricSink>, hostname: String) -> Self {
        let inmem_sink: Arc<dyn MetricSink> = inmem.clone();
        let sink = FanoutSink::new(vec![inmem_sink, remote]);
        Self {
            recorder: SinkRecorder::new(Arc::new(sink)),
            inmem,
            hostname: Some(hostname),
            fanout: true,
            handles: Arc::default(),
        }
    }

    /// The in-memory aggregator.
    pub fn inmem(&self) -> &Arc<InmemSink> {
        &self.inmem
    }

    /// The `metrics` recorder backed by the installed sink.
    pub fn recorder(&self) -> &SinkRecorder {
        &self.recorder
    }

    /// Whether metrics are duplicated to a remote sink.
    pub fn is_fanout(&self) -> bool {
        self.fanout
    }

    /// Whether keys are tagged with the host name.
    pub fn hostname_tagging(&self) -> bool {
        self.hostname.is_some()
    }

    fn key(&self, name: &str) -> Key {
        match &self.hostname {
            Some(host) => Key::from_parts(name.to_string(), vec![Label::new("host", host.clone())]),
            None => Key::from_name(name.to_string()),
        }
    }

    fn metadata() -> Metadata<'static> {
        Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
    }

    fn counter(&self, name: &str) -> Counter {
        if let Some(counter) = self.handles.counters.get(name) {
            return counter.clone();
        }
        self.handles
            .counters
            .entry(name.to_string())
            .or_insert_with(|| self.recorder.register_counter(&self.key(name), &Self::metadata()))
            .clone()
    }

    fn gauge(&self, name: &str) -> Gauge {
        if let Some(gauge) = self.handles.gauges.get(name) {
            return gauge.clone();
        }
        self.handles
            .gauges
            .entry(name.to_string())
            .or_insert_with(|| self.recorder.register_gauge(&self.key(name), &Self::metadata()))
            .clone()
    }

    fn histogram(&self, name: &str) -> Histogram {
        if let Some(histogram) = self.handles.histograms.get(name) {
            return histogram.clone();
        }
        self.handles
            .histograms
            .entry(name.to_string())
            .or_insert_with(|| {
                self.recorder
                    .register_histogram(&self.key(name), &Self::metadata())
            })
            .clone()
    }

    pub fn incr_counter(&self, name: &str, value: u64) {
        self.counter(name).increment(value);
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.gauge(name).set(value);
    }

    /// Move a gauge by `delta` from its last value.
    pub fn incr_gauge(&self, name: &str, delta: f64) {
        if delta < 0.0 {
            self.gauge(name).decrement(-delta);
        } else {
            self.gauge(name).increment(delta);
        }
    }

    pub fn add_sample(&self, name: &str, value: f64) {
        self.histogram(name).record(value);
    }

    /// Record the milliseconds elapsed since `start`.
    pub fn measure_since(&self, name: &str, start: Instant) {
        self.add_sample(name, start.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Requests a dump of the in-memory metrics. Cheap to clone, repeatable.
#[derive(Debug, Clone)]
pub struct DumpTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl DumpTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

/// Receiving side of [`DumpTrigger`].
#[derive(Debug)]
pub struct DumpRequests {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Create a linked dump trigger and request stream.
pub fn dump_channel() -> (DumpTrigger, DumpRequests) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DumpTrigger { tx }, DumpRequests { rx })
}

/// Dump `inmem` to `out` for every request until all triggers are dropped.
pub fn spawn_dump_listener(
    inmem: Arc<InmemSink>,
    mut requests: DumpRequests,
    mut out: Box<dyn Write + Send>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while requests.rx.recv().await.is_some() {
            if let Err(e) = inmem.dump(&mut out) {
                tracing::warn!(error = %e, "Failed to dump metrics");
            }
        }
    })
}

/// Wire the telemetry pipeline for `config`.
///
/// The dump listener writes to stderr.
pub async fn wire_telemetry(
    config: &Config,
    requests: DumpRequests,
) -> Result<Telemetry, TelemetrySinkError> {
    let inmem = Arc::new(InmemSink::new(INMEM_INTERVAL, INMEM_RETAIN));

    let telemetry = if config.statsite_addr.is_empty() {
        Telemetry::inmem_only(inmem.clone())
    } else {
        let remote = StatsiteSink::connect(&config.statsite_addr).await?;
        Telemetry::fanout(inmem.clone(), Arc::new(remote), config.node_name.clone())
    };

    spawn_dump_listener(inmem, requests, Box::new(std::io::stderr()));

    Ok(telemetry)
}
