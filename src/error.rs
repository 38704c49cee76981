use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No stages in pipeline
    #[error("Cannot start pipeline with no stages")]
    NoStages,

    /// Invalid capacity, interval or other setting
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stage lifecycle hook failed
    #[error("Stage execution failed: {0}")]
    StageError(String),

    /// Thread spawn or join error
    #[error("Thread error: {0}")]
    ThreadError(String),

    /// The first stage is gone, so nothing more can be sent
    #[error("Pipeline input is disconnected")]
    Disconnected,
}

/// Rejections produced by the line source before a value reaches the pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("only integers are accepted, got {0:?}")]
    NotAnInteger(String),
}
