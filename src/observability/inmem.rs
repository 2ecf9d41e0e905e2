//! In-memory metrics aggregation.
//!
//! Metrics are aggregated into fixed intervals; only the intervals covering
//! the retention horizon are kept. The aggregate can be dumped on demand.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::observability::metrics::MetricSink;

/// Running aggregate of observed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateSample {
    pub count: u64,
    pub sum: f64,
    pub sum_sq: f64,
    pub min: f64,
    pub max: f64,
}

impl AggregateSample {
    /// Fold one observation into the aggregate.
    pub fn ingest(&mut self, value: f64) {
        if self.count == 0 || value < self.min {
            self.min = value;
        }
        if self.count == 0 || value > self.max {
            self.max = value;
        }
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Sample standard deviation.
    pub fn stddev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let variance = (self.sum_sq - (self.sum * self.sum) / n) / (n - 1.0);
        variance.max(0.0).sqrt()
    }
}

impl fmt::Display for AggregateSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Count: {} Min: {:.3} Mean: {:.3} Max: {:.3} Stddev: {:.3} Sum: {:.3}",
            self.count,
            self.min,
            self.mean(),
            self.max,
            self.stddev(),
            self.sum
        )
    }
}

/// Everything recorded during one interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntervalMetrics {
    /// Interval start in milliseconds since the Unix epoch.
    pub start_unix_ms: u64,
    pub gauges: BTreeMap<String, f64>,
    pub counters: BTreeMap<String, AggregateSample>,
    pub samples: BTreeMap<String, AggregateSample>,
}

/// Sink that aggregates metrics in memory.
#[derive(Debug)]
pub struct InmemSink {
    interval_ms: u64,
    retain: Duration,
    max_intervals: usize,
    intervals: Mutex<VecDeque<IntervalMetrics>>,
}

impl InmemSink {
    /// Aggregate over `interval`, keeping enough intervals to cover `retain`.
    pub fn new(interval: Duration, retain: Duration) -> Self {
        let interval_ms = (interval.as_millis() as u64).max(1);
        let retain_ms = retain.as_millis() as u64;
        let max_intervals = retain_ms.div_ceil(interval_ms).max(1) as usize;
        Self {
            interval_ms,
            retain,
            max_intervals,
            intervals: Mutex::new(VecDeque::with_capacity(max_intervals)),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retain(&self) -> Duration {
        self.retain
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<IntervalMetrics>> {
        match self.intervals.lock() {
            Ok(intervals) => intervals,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn record_at(&self, now_ms: u64, apply: impl FnOnce(&mut IntervalMetrics)) {
        let start = now_ms - now_ms % self.interval_ms;
        let mut intervals = self.lock();

        let current = intervals.back().map(|i| i.start_unix_ms);
        if current != Some(start) {
            intervals.push_back(IntervalMetrics {
                start_unix_ms: start,
                ..Default::default()
            });
            while intervals.len() > self.max_intervals {
                intervals.pop_front();
            }
        }
        self.prune(&mut intervals, now_ms);

        if let Some(interval) = intervals.back_mut() {
            apply(interval);
        }
    }

    /// Drop intervals that ended before the retention horizon.
    fn prune(&self, intervals: &mut VecDeque<IntervalMetrics>, now_ms: u64) {
        let horizon = now_ms.saturating_sub(self.retain.as_millis() as u64);
        while intervals
            .front()
            .is_some_and(|i| i.start_unix_ms + self.interval_ms <= horizon)
        {
            intervals.pop_front();
        }
    }

    fn data_at(&self, now_ms: u64) -> Vec<IntervalMetrics> {
        let mut intervals = self.lock();
        self.prune(&mut intervals, now_ms);
        intervals.iter().cloned().collect()
    }

    /// Snapshot of every retained interval, oldest first.
    pub fn data(&self) -> Vec<IntervalMetrics> {
        self.data_at(Self::now_ms())
    }

    /// Snapshot of the most recent retained interval.
    pub fn latest(&self) -> Option<IntervalMetrics> {
        let mut intervals = self.lock();
        self.prune(&mut intervals, Self::now_ms());
        intervals.back().cloned()
    }

    /// Write every retained interval in a human readable form.
    pub fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        self.dump_at(Self::now_ms(), out)
    }

    fn dump_at(&self, now_ms: u64, out: &mut dyn Write) -> io::Result<()> {
        for interval in self.data_at(now_ms) {
            let start = interval.start_unix_ms / 1000;
            for (name, value) in &interval.gauges {
                writeln!(out, "[{}][G] '{}': {:.3}", start, name, value)?;
            }
            for (name, agg) in &interval.counters {
                writeln!(out, "[{}][C] '{}': {}", start, name, agg)?;
            }
            for (name, agg) in &interval.samples {
                writeln!(out, "[{}][S] '{}': {}", start, name, agg)?;
            }
        }
        out.flush()
    }
}

impl MetricSink for InmemSink {
    fn set_gauge(&self, key: &str, value: f64) {
        self.record_at(Self::now_ms(), |i| {
            i.gauges.insert(key.to_string(), value);
        });
    }

    fn incr_counter(&self, key: &str, value: f64) {
        self.record_at(Self::now_ms(), |i| {
            i.counters.entry(key.to_string()).or_default().ingest(value);
        });
    }

    fn add_sample(&self, key: &str, value: f64) {
        self.record_at(Self::now_ms(), |i| {
            i.samples.entry(key.to_string()).or_default().ingest(value);
        });
    }
}
