//! Metric primitives owned by the action executor.
//!
//! The checkpoint path maintains three figures: a rate meter, a one-second
//! sliding reservoir of checkpoint sizes, and a one-day history of bytes
//! written per second. The history is fed at most once per real second by
//! whichever writer wins a compare-exchange on the last sample timestamp;
//! reporting on every write would double-count a rate.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Checkpoint write rate
pub const CHECKPOINTING_RATE: &str = "Flows.Checkpointing Rate";

/// History of checkpoint bytes written per second
pub const CHECKPOINT_VOLUME_BYTES_PER_SECOND_HIST: &str =
    "Flows.CheckpointVolumeBytesPerSecondHist";

/// Checkpoint bytes written over the last second
pub const CHECKPOINT_VOLUME_BYTES_PER_SECOND_CURRENT: &str =
    "Flows.CheckpointVolumeBytesPerSecondCurrent";

const NANOS_PER_SECOND: u64 = 1_000_000_000;

fn unix_nanos(instant: DateTime<Utc>) -> u64 {
    let seconds = instant.timestamp().max(0) as u64;
    seconds * NANOS_PER_SECOND + u64::from(instant.timestamp_subsec_nanos())
}

/// A recorded metric observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricValue {
    /// Monotonic count
    Counter(u64),
    /// Point-in-time reading
    Gauge(u64),
    /// One sample of a distribution
    Histogram(u64),
}

/// Sink metrics are reported into, keyed by metric name
pub trait MetricsCollector: Send + Sync {
    /// Record one observation
    fn record(&self, name: &'static str, value: MetricValue);
}

/// Default collector that emits metrics as structured tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCollector;

impl MetricsCollector for TracingCollector {
    fn record(&self, name: &'static str, value: MetricValue) {
        match value {
            MetricValue::Counter(value) => {
                tracing::info!(target: "metrics", metric = name, counter = value);
            }
            MetricValue::Gauge(value) => {
                tracing::info!(target: "metrics", metric = name, gauge = value);
            }
            MetricValue::Histogram(value) => {
                tracing::info!(target: "metrics", metric = name, sample = value);
            }
        }
    }
}

/// Thread-safe event-rate meter
#[derive(Debug, Default)]
pub struct Meter {
    count: AtomicU64,
}

impl Meter {
    /// A meter that has seen nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence
    pub fn mark(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Total occurrences recorded
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Reservoir keeping every sample observed within a sliding time window
#[derive(Debug)]
pub struct SlidingTimeWindowReservoir {
    window_nanos: u64,
    samples: Mutex<VecDeque<(u64, u64)>>,
}

impl SlidingTimeWindowReservoir {
    /// Reservoir covering the given window
    pub fn new(window: Duration) -> Self {
        Self {
            window_nanos: window.as_nanos() as u64,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    fn trim(&self, samples: &mut VecDeque<(u64, u64)>, now_nanos: u64) {
        let horizon = now_nanos.saturating_sub(self.window_nanos);
        while samples.front().is_some_and(|(at, _)| *at < horizon) {
            samples.pop_front();
        }
    }

    /// Record a sample observed at `now_nanos`
    pub fn update(&self, now_nanos: u64, value: u64) {
        let mut samples = self.samples.lock();
        self.trim(&mut samples, now_nanos);
        samples.push_back((now_nanos, value));
    }

    /// Samples still inside the window at `now_nanos`
    pub fn values(&self, now_nanos: u64) -> Vec<u64> {
        let mut samples = self.samples.lock();
        self.trim(&mut samples, now_nanos);
        samples.iter().map(|(_, value)| *value).collect()
    }

    /// Sum of the samples still inside the window at `now_nanos`
    pub fn sum(&self, now_nanos: u64) -> u64 {
        let mut samples = self.samples.lock();
        self.trim(&mut samples, now_nanos);
        samples.iter().map(|(_, value)| *value).sum()
    }
}

/// The executor's checkpoint metrics: rate meter, one-second size
/// reservoir, one-day bandwidth history, and the CAS-guarded sample
/// timestamp that throttles the history to one sample per second
#[derive(Debug)]
pub struct FlowMetrics {
    checkpointing_rate: Meter,
    checkpoint_sizes: SlidingTimeWindowReservoir,
    checkpoint_bandwidth: SlidingTimeWindowReservoir,
    last_bandwidth_update: AtomicU64,
}

impl Default for FlowMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowMetrics {
    const SAMPLE_INTERVAL_NANOS: u64 = NANOS_PER_SECOND;

    /// Fresh metrics with empty windows
    pub fn new() -> Self {
        Self {
            checkpointing_rate: Meter::new(),
            checkpoint_sizes: SlidingTimeWindowReservoir::new(Duration::from_secs(1)),
            checkpoint_bandwidth: SlidingTimeWindowReservoir::new(Duration::from_secs(24 * 60 * 60)),
            last_bandwidth_update: AtomicU64::new(0),
        }
    }

    /// Record one persisted checkpoint of `size_bytes` serialized bytes
    pub fn record_checkpoint(&self, now: DateTime<Utc>, size_bytes: u64) {
        let now_nanos = unix_nanos(now);
        self.checkpointing_rate.mark();
        self.checkpoint_sizes.update(now_nanos, size_bytes);
        self.sample_bandwidth(now_nanos);
    }

    // One winner per second: whoever moves last_bandwidth_update forward
    // produces the sample, everyone else observes the moved timestamp and
    // leaves. Losing the CAS re-reads rather than sampling anyway.
    fn sample_bandwidth(&self, now_nanos: u64) {
        loop {
            let last = self.last_bandwidth_update.load(Ordering::Acquire);
            if now_nanos.saturating_sub(last) < Self::SAMPLE_INTERVAL_NANOS {
                return;
            }
            if self
                .last_bandwidth_update
                .compare_exchange(last, now_nanos, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let volume = self.checkpoint_sizes.sum(now_nanos);
                self.checkpoint_bandwidth.update(now_nanos, volume);
                return;
            }
        }
    }

    /// Total checkpoints recorded
    pub fn checkpointing_rate_count(&self) -> u64 {
        self.checkpointing_rate.count()
    }

    /// Serialized sizes observed within the last second
    pub fn checkpoint_size_samples(&self, now: DateTime<Utc>) -> Vec<u64> {
        self.checkpoint_sizes.values(unix_nanos(now))
    }

    /// Bytes written over the last second
    pub fn current_bandwidth_bytes_per_second(&self, now: DateTime<Utc>) -> u64 {
        self.checkpoint_sizes.sum(unix_nanos(now))
    }

    /// The one-day bytes-per-second history
    pub fn bandwidth_samples(&self, now: DateTime<Utc>) -> Vec<u64> {
        self.checkpoint_bandwidth.values(unix_nanos(now))
    }

    /// Report a snapshot of all checkpoint metrics into a collector
    pub fn report_to(&self, collector: &dyn MetricsCollector, now: DateTime<Utc>) {
        collector.record(
            CHECKPOINTING_RATE,
            MetricValue::Counter(self.checkpointing_rate_count()),
        );
        collector.record(
            CHECKPOINT_VOLUME_BYTES_PER_SECOND_CURRENT,
            MetricValue::Gauge(self.current_bandwidth_bytes_per_second(now)),
        );
        if let Some(latest) = self.bandwidth_samples(now).last() {
            collector.record(
                CHECKPOINT_VOLUME_BYTES_PER_SECOND_HIST,
                MetricValue::Histogram(*latest),
            );
        }
    }
}
