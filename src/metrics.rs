use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-stage counters, shared between the stage thread and observers
#[derive(Debug, Clone)]
pub struct StageMetrics {
    /// Values taken from the input link
    received: Arc<AtomicU64>,
    /// Values handed to the output link
    forwarded: Arc<AtomicU64>,
    /// Timer-driven flushes that produced data
    flushes: Arc<AtomicU64>,
    /// Values held or mid-send when the stage terminated
    discarded: Arc<AtomicU64>,
    start_time: Instant,
}

impl StageMetrics {
    /// Create a new metrics collector for a stage
    pub fn new() -> Self {
        Self {
            received: Arc::new(AtomicU64::new(0)),
            forwarded: Arc::new(AtomicU64::new(0)),
            flushes: Arc::new(AtomicU64::new(0)),
            discarded: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Record a value taken from the input link
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a value handed to the output link
    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a flush that produced data
    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record values dropped at shutdown
    pub fn record_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the total number of values received
    pub fn total_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Get the total number of values forwarded
    pub fn total_forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Get the total number of flushes that produced data
    pub fn total_flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Get the total number of values dropped at shutdown
    pub fn total_discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Forwarded values per second since the stage was created
    pub fn throughput_vps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_forwarded() as f64 / elapsed
        }
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_received: self.total_received(),
            total_forwarded: self.total_forwarded(),
            total_flushes: self.total_flushes(),
            total_discarded: self.total_discarded(),
            throughput_vps: self.throughput_vps(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_received: u64,
    pub total_forwarded: u64,
    pub total_flushes: u64,
    pub total_discarded: u64,
    pub throughput_vps: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Received: {}, Forwarded: {}, Flushes: {}, Discarded: {}, \
             Throughput: {:.2} values/s, Elapsed: {:.2}s",
            self.total_received,
            self.total_forwarded,
            self.total_flushes,
            self.total_discarded,
            self.throughput_vps,
            self.elapsed.as_secs_f64()
        )
    }
}
