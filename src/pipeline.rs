use crate::cancel::{cancel_pair, CancelHandle, CancelToken};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::filters::{is_not_multiple_of_three, is_positive};
use crate::metrics::StageMetrics;
use crate::stage::{BufferStage, FilterStage, Stage, StageExit, StageRunner};
use crate::Value;
use crossbeam::channel::{bounded, select, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// A stage configuration in the pipeline builder
enum StageSpec<T> {
    Ready(Box<dyn Stage<T>>),
    Buffer {
        name: String,
        capacity: usize,
        interval: Duration,
    },
}

/// Builder for constructing pipelines
pub struct PipelineBuilder<T> {
    stages: Vec<StageSpec<T>>,
    link_capacity: usize,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            link_capacity: 0,
        }
    }

    /// Append an arbitrary stage
    pub fn add_stage(mut self, stage: impl Stage<T>) -> Self {
        self.stages.push(StageSpec::Ready(Box::new(stage)));
        self
    }

    /// Append a stage that forwards only values matching `predicate`
    pub fn filter<F>(self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + 'static,
    {
        self.add_stage(FilterStage::new(name, predicate))
    }

    /// Append a buffer stage that batches values and flushes every `interval`
    pub fn buffer(mut self, name: impl Into<String>, capacity: usize, interval: Duration) -> Self {
        self.stages.push(StageSpec::Buffer {
            name: name.into(),
            capacity,
            interval,
        });
        self
    }

    /// Set how many values each link can hold; 0 makes every send a direct handoff
    pub fn with_link_capacity(mut self, capacity: usize) -> Self {
        self.link_capacity = capacity;
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Result<Pipeline<T>> {
        if self.stages.is_empty() {
            return Err(PipelineError::NoStages);
        }

        let stages = self
            .stages
            .into_iter()
            .map(|spec| match spec {
                StageSpec::Ready(stage) => Ok(stage),
                StageSpec::Buffer {
                    name,
                    capacity,
                    interval,
                } => BufferStage::new(name, capacity, interval)
                    .map(|stage| Box::new(stage) as Box<dyn Stage<T>>),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Pipeline {
            stages,
            link_capacity: self.link_capacity,
        })
    }
}

impl PipelineBuilder<Value> {
    /// The standard chain: positivity filter, multiple-of-three filter, buffer
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new()
            .with_link_capacity(config.link_capacity)
            .filter("positive", is_positive)
            .filter("not_multiple_of_three", is_not_multiple_of_three)
            .buffer("buffer", config.ring_capacity, config.flush_interval)
    }
}

impl<T: Send + 'static> Default for PipelineBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated chain of stages that has not been started yet
pub struct Pipeline<T> {
    stages: Vec<Box<dyn Stage<T>>>,
    link_capacity: usize,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Get the stage names in order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Spawn one thread per stage and wire adjacent stages with links.
    ///
    /// The returned pipeline owns the only [`CancelHandle`], inside its
    /// [`Producer`]; every stage gets an observe-only [`CancelToken`].
    pub fn start(self) -> Result<RunningPipeline<T>> {
        let (cancel_handle, cancel) = cancel_pair();
        let (input, mut upstream) = bounded(self.link_capacity);
        let mut stage_names = Vec::with_capacity(self.stages.len());
        let mut metrics = Vec::with_capacity(self.stages.len());
        let mut handles = Vec::with_capacity(self.stages.len());

        for stage in self.stages {
            let (tx, rx) = bounded(self.link_capacity);
            let name = stage.name().to_owned();
            let stage_metrics = StageMetrics::new();
            let mut runner =
                StageRunner::new(upstream, tx, cancel.clone()).with_metrics(stage_metrics.clone());

            // A failed spawn drops `cancel_handle`, which stops the stages already running.
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || runner.run(stage))
                .map_err(|e| PipelineError::ThreadError(e.to_string()))?;
            debug!(stage = %name, "stage thread spawned");

            stage_names.push(name);
            metrics.push(stage_metrics);
            handles.push(handle);
            upstream = rx;
        }

        Ok(RunningPipeline {
            producer: Some(Producer {
                input,
                cancel: cancel_handle,
            }),
            output: upstream,
            cancel,
            stage_names,
            metrics,
            handles,
        })
    }
}

/// The upstream end of a running pipeline and its sole shutdown origin
pub struct Producer<T> {
    input: Sender<T>,
    cancel: CancelHandle,
}

impl<T> Producer<T> {
    /// Hand a value to the first stage, blocking until it is accepted
    pub fn send(&self, value: T) -> Result<()> {
        self.input
            .send(value)
            .map_err(|_| PipelineError::Disconnected)
    }

    /// Close the cancellation signal; every stage terminates at its next wait.
    ///
    /// Dropping the producer has the same effect.
    pub fn stop(self) {
        debug!("producer requested shutdown");
        self.cancel.cancel();
    }
}

/// A running pipeline that can be fed, read and monitored
pub struct RunningPipeline<T> {
    producer: Option<Producer<T>>,
    output: Receiver<T>,
    cancel: CancelToken,
    stage_names: Vec<String>,
    metrics: Vec<StageMetrics>,
    handles: Vec<JoinHandle<Result<StageExit>>>,
}

impl<T> RunningPipeline<T> {
    /// Take the producer so another thread can feed the pipeline
    pub fn take_producer(&mut self) -> Option<Producer<T>> {
        self.producer.take()
    }

    /// Send through the producer still held by this pipeline
    pub fn send(&self, value: T) -> Result<()> {
        match &self.producer {
            Some(producer) => producer.send(value),
            None => Err(PipelineError::Disconnected),
        }
    }

    /// Stop the pipeline if the producer is still held here
    pub fn stop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.stop();
        }
    }

    /// Wait for the next output value.
    ///
    /// Returns `None` once the cancellation signal is observed or the last
    /// stage has gone away.
    pub fn recv(&self) -> Option<T> {
        if self.cancel.is_cancelled() {
            return None;
        }
        select! {
            recv(self.output) -> msg => msg.ok(),
            recv(self.cancel.receiver()) -> _ => None,
        }
    }

    /// Like [`recv`](Self::recv), but also gives up after `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        if self.cancel.is_cancelled() {
            return None;
        }
        select! {
            recv(self.output) -> msg => msg.ok(),
            recv(self.cancel.receiver()) -> _ => None,
            default(timeout) => None,
        }
    }

    /// Get the receiving end of the last link
    pub fn output(&self) -> &Receiver<T> {
        &self.output
    }

    /// Get an observe-only view of the cancellation signal
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Check whether the cancellation signal has been closed
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Get metrics for a stage
    pub fn stage_metrics(&self, index: usize) -> Option<&StageMetrics> {
        self.metrics.get(index)
    }

    /// Get a summary of all metrics
    pub fn metrics_summary(&self) -> String {
        let mut summary = String::from("Pipeline Metrics Summary:\n");
        for (i, (name, metrics)) in self.stage_names.iter().zip(&self.metrics).enumerate() {
            summary.push_str(&format!(
                "  Stage {} ({}): {}\n",
                i,
                name,
                metrics.snapshot().format()
            ));
        }
        summary
    }

    /// Wait for every stage thread to finish.
    ///
    /// If the producer was never taken out it is stopped first, otherwise
    /// this blocks until whoever holds it calls [`Producer::stop`].
    pub fn wait(mut self) -> Result<()> {
        self.stop();

        let mut first_error = None;
        for (name, handle) in self.stage_names.iter().zip(self.handles.drain(..)) {
            match handle.join() {
                Ok(Ok(exit)) => debug!(stage = %name, ?exit, "stage joined"),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    first_error.get_or_insert(PipelineError::ThreadError(format!(
                        "stage {} panicked",
                        name
                    )));
                }
            }
        }

        info!("{}", self.metrics_summary().trim_end());
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
