//! Error types shared across the pipeline.
//!
//! Two failure domains with very different handling:
//!
//! * [`ConfigError`] — raised while assembling the pipeline at startup and
//!   returned to the caller. Nothing is half-built after one of these.
//! * [`TraceError`] — raised by the running pipeline. These never reach the
//!   instrumented application's control flow; they degrade to counted data
//!   loss and internal log records.

use std::time::Duration;
use thiserror::Error;

/// Errors detected while validating or applying startup configuration.
#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The service name option was empty or whitespace.
    #[error("service name must not be empty")]
    EmptyServiceName,

    /// A batching or queueing threshold was zero.
    #[error("{0} must be greater than zero")]
    ZeroThreshold(&'static str),

    /// The export batch size cannot exceed the queue capacity.
    #[error("batch size {batch} exceeds queue size {queue}")]
    BatchLargerThanQueue {
        /// Configured maximum export batch size.
        batch: usize,
        /// Configured maximum queue size.
        queue: usize,
    },

    /// The exporter kind string did not name a known exporter.
    #[error("unknown exporter kind {0:?}")]
    UnknownExporterKind(String),

    /// The selected exporter requires an endpoint but none was given.
    #[error("the {0} exporter requires an endpoint")]
    MissingEndpoint(&'static str),

    /// A sampling ratio outside the closed interval [0.0, 1.0].
    #[error("sampling ratio {0} is outside [0.0, 1.0]")]
    InvalidSamplingRatio(f64),
}

/// Errors raised by the running trace pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The exporter could not deliver a batch.
    #[error("export failed: {0}")]
    ExportFailed(String),

    /// A flush or shutdown did not complete within its deadline.
    #[error("export timed out after {0:?}")]
    ExportTimedOut(Duration),

    /// Shutdown was already performed on this component.
    #[error("trace pipeline is already shut down")]
    AlreadyShutdown,

    /// Any other failure internal to the pipeline.
    #[error("{0}")]
    Internal(String),
}

/// Result type for fallible pipeline operations.
pub type TraceResult<T> = Result<T, TraceError>;
