//! A staged concurrent pipeline that filters a stream of integers and smooths
//! bursts through a time-flushed bounded ring.
//!
//! Every stage runs on its own thread and waits on its input link, its flush
//! timer and a shared cancellation signal in one `select!`. The signal has a
//! single owner, the [`Producer`], so shutdown always starts in one place and
//! fans out to every stage.
//!
//! # Features
//!
//! - Fixed-capacity ring with oldest-first eviction and atomic drain
//! - Generic predicate-driven filter stage
//! - Buffer stage flushing on a fixed wall-clock cadence
//! - Close-once cancellation handle with observe-only tokens
//! - Per-stage metrics: received, forwarded, flushes, discarded
//!
//! # Example
//!
//! ```ignore
//! use ring_pipeline::{PipelineBuilder, PipelineConfig};
//!
//! let mut running = PipelineBuilder::from_config(&PipelineConfig::default())
//!     .build()?
//!     .start()?;
//!
//! let producer = running.take_producer().unwrap();
//! producer.send(5)?;
//! producer.stop();
//!
//! while let Some(value) = running.recv() {
//!     println!("{value}");
//! }
//! running.wait()?;
//! ```
//!
//! Values still buffered when the signal closes are dropped, not flushed.

pub mod buffer;
pub mod cancel;
pub mod config;
pub mod error;
pub mod filters;
pub mod metrics;
pub mod pipeline;
pub mod source;
pub mod stage;

/// The token carried between stages
pub type Value = i64;

// Re-exports for convenience
pub use buffer::BoundedRing;
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use config::PipelineConfig;
pub use error::{InputError, PipelineError, Result};
pub use metrics::{MetricsSnapshot, StageMetrics};
pub use pipeline::{Pipeline, PipelineBuilder, Producer, RunningPipeline};
pub use source::{parse_line, run_source, Command, SourceSummary};
pub use stage::{BufferStage, FilterStage, Stage, StageExit, StageRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
