use crate::buffer::BoundedRing;
use crate::cancel::CancelToken;
use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crossbeam::channel::{never, select, tick, Receiver, Sender};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Trait for a processing stage in the pipeline
pub trait Stage<T>: Send + 'static {
    /// Process an input item and produce output(s)
    /// Can produce 0, 1, or multiple outputs
    fn process(&mut self, input: T) -> Result<Vec<T>>;

    /// Period of the flush timer, if the stage wants one.
    ///
    /// The timer runs on a fixed cadence from the moment the stage starts;
    /// incoming values do not rearm it.
    fn flush_interval(&self) -> Option<Duration> {
        None
    }

    /// Called each time the flush timer fires; returned values are sent
    /// downstream in order
    fn on_flush(&mut self) -> Vec<T> {
        Vec::new()
    }

    /// Number of values held inside the stage that have not been sent yet
    fn pending(&self) -> usize {
        0
    }

    /// Called before the stage starts processing
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when the stage is shutting down
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get a human-readable name for this stage
    fn name(&self) -> &str {
        "stage"
    }
}

/// Why a stage loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExit {
    /// The shared cancellation signal was observed
    Cancelled,
    /// Every upstream sender is gone and nothing is left to receive
    InputClosed,
    /// The downstream receiver is gone
    OutputClosed,
}

/// Runs a stage by receiving from its input link and sending to its output link
/// until cancellation or disconnection
pub struct StageRunner<T> {
    input: Receiver<T>,
    output: Sender<T>,
    cancel: CancelToken,
    metrics: StageMetrics,
}

impl<T: Send + 'static> StageRunner<T> {
    /// Create a new stage runner
    pub fn new(input: Receiver<T>, output: Sender<T>, cancel: CancelToken) -> Self {
        Self {
            input,
            output,
            cancel,
            metrics: StageMetrics::new(),
        }
    }

    /// Replace the metrics collector, so an observer can keep a shared clone
    pub fn with_metrics(mut self, metrics: StageMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get a reference to the metrics
    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    /// Run the stage with the provided implementation.
    /// This method blocks until the stage terminates.
    ///
    /// Each iteration is one blocking wait on whichever is ready first: the
    /// next input value, the flush timer or the cancellation signal. Values
    /// still pending in the stage, or taken out but not yet sent, are dropped
    /// at termination and counted as discarded.
    pub fn run(&mut self, mut stage: Box<dyn Stage<T>>) -> Result<StageExit> {
        let name = stage.name().to_owned();
        stage.on_start()?;
        debug!(stage = %name, "stage started");

        let ticker = match stage.flush_interval() {
            Some(interval) => tick(interval),
            None => never(),
        };

        // Values taken out of the stage but never delivered downstream.
        let mut unsent = 0;
        let exit = loop {
            if self.cancel.is_cancelled() {
                break StageExit::Cancelled;
            }

            let step = select! {
                recv(self.cancel.receiver()) -> _ => Some(StageExit::Cancelled),
                recv(self.input) -> msg => match msg {
                    Ok(item) => {
                        self.metrics.record_received();
                        match stage.process(item) {
                            Ok(outputs) => self.forward(outputs).err().map(|(exit, lost)| {
                                unsent = lost;
                                exit
                            }),
                            Err(e) => {
                                warn!(stage = %name, error = %e, "dropping value after stage error");
                                None
                            }
                        }
                    }
                    Err(_) => Some(StageExit::InputClosed),
                },
                recv(ticker) -> _ => {
                    let batch = stage.on_flush();
                    if batch.is_empty() {
                        None
                    } else {
                        self.metrics.record_flush();
                        debug!(stage = %name, values = batch.len(), "flushing");
                        self.forward(batch).err().map(|(exit, lost)| {
                            unsent = lost;
                            exit
                        })
                    }
                },
            };

            if let Some(exit) = step {
                break exit;
            }
        };

        let pending = stage.pending();
        let discarded = pending + unsent;
        if discarded > 0 {
            warn!(stage = %name, pending, unsent, "discarding undelivered values on shutdown");
            self.metrics.record_discarded(discarded as u64);
        }

        stage.on_shutdown()?;
        debug!(stage = %name, ?exit, "stage stopped");
        Ok(exit)
    }

    /// Send values downstream in order, giving up as soon as cancellation is observed.
    ///
    /// On failure returns why, along with how many values were not sent.
    fn forward(&self, items: Vec<T>) -> std::result::Result<(), (StageExit, usize)> {
        let total = items.len();
        for (sent, item) in items.into_iter().enumerate() {
            select! {
                send(self.output, item) -> res => {
                    if res.is_err() {
                        return Err((StageExit::OutputClosed, total - sent));
                    }
                    self.metrics.record_forwarded();
                    trace!("value forwarded");
                },
                recv(self.cancel.receiver()) -> _ => {
                    return Err((StageExit::Cancelled, total - sent));
                },
            }
        }
        Ok(())
    }
}

/// A filtering stage that passes through items matching a predicate
pub struct FilterStage<F> {
    name: String,
    predicate: F,
}

impl<F> FilterStage<F> {
    /// Create a new filter stage
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<T, F> Stage<T> for FilterStage<F>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + 'static,
{
    fn process(&mut self, input: T) -> Result<Vec<T>> {
        if (self.predicate)(&input) {
            Ok(vec![input])
        } else {
            Ok(vec![])
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A stage that collects values into a [`BoundedRing`] and releases them
/// as one batch each time its flush timer fires
pub struct BufferStage<T> {
    name: String,
    ring: BoundedRing<T>,
    interval: Duration,
}

impl<T> BufferStage<T> {
    /// Create a new buffer stage
    pub fn new(name: impl Into<String>, capacity: usize, interval: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(PipelineError::Config(
                "buffer capacity must be at least 1".into(),
            ));
        }
        if interval.is_zero() {
            return Err(PipelineError::Config(
                "flush interval must be greater than zero".into(),
            ));
        }
        Ok(Self {
            name: name.into(),
            ring: BoundedRing::new(capacity),
            interval,
        })
    }

    /// Get a shared handle to the underlying ring
    pub fn ring(&self) -> BoundedRing<T> {
        self.ring.clone()
    }
}

impl<T: Send + 'static> Stage<T> for BufferStage<T> {
    fn process(&mut self, input: T) -> Result<Vec<T>> {
        self.ring.push(input);
        Ok(vec![])
    }

    fn flush_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn on_flush(&mut self) -> Vec<T> {
        match self.ring.drain() {
            Some(batch) => batch,
            None => {
                trace!(stage = %self.name, "nothing to flush");
                Vec::new()
            }
        }
    }

    fn pending(&self) -> usize {
        self.ring.len()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
