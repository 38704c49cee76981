use crate::error::{PipelineError, Result};
use std::time::Duration;

/// Default number of values the buffer stage holds between flushes
pub const DEFAULT_RING_CAPACITY: usize = 7;

/// Default period of the buffer stage flush timer
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Settings for the standard number pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Capacity of the buffer stage ring
    pub ring_capacity: usize,
    /// How often the buffer stage drains its ring
    pub flush_interval: Duration,
    /// Slots per link between stages; 0 means every send waits for the receiver
    pub link_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            link_capacity: 0,
        }
    }
}

impl PipelineConfig {
    /// Set the buffer stage ring capacity
    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }

    /// Set the buffer stage flush period
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the number of slots per link
    pub fn with_link_capacity(mut self, capacity: usize) -> Self {
        self.link_capacity = capacity;
        self
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ring_capacity == 0 {
            return Err(PipelineError::Config(
                "ring capacity must be at least 1".into(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(PipelineError::Config(
                "flush interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
