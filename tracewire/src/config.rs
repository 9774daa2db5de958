//! Static agent configuration.
//!
//! The options struct is constructed explicitly at startup, validated once,
//! and then consumed while assembling the pipeline. There is no runtime
//! mutation and no environment lookup; whoever embeds the agent owns the
//! mapping from their config source to this struct.

use crate::trace::BatchConfig;
use crate::{ConfigError, Resource};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The exporter the agent ships spans through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExporterKind {
    /// One human-diffable line per span on standard output.
    Stdout,
    /// OTLP-style JSON over HTTP to a collector endpoint.
    OtlpHttp,
}

impl FromStr for ExporterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(ExporterKind::Stdout),
            "otlp" | "otlp-http" | "http" => Ok(ExporterKind::OtlpHttp),
            other => Err(ConfigError::UnknownExporterKind(other.to_string())),
        }
    }
}

impl fmt::Display for ExporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExporterKind::Stdout => f.write_str("stdout"),
            ExporterKind::OtlpHttp => f.write_str("otlp-http"),
        }
    }
}

/// The static options an embedding application supplies at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    /// Logical name of the instrumented service.
    pub service_name: String,
    /// Version of the instrumented service, if known.
    pub service_version: Option<String>,
    /// Which exporter to ship spans through.
    pub exporter_kind: ExporterKind,
    /// Collector endpoint, required for network exporters.
    pub endpoint: Option<String>,
    /// Batch size that triggers an immediate export.
    pub batch_max_size: usize,
    /// Maximum delay between the first span of a batch and its export.
    pub batch_max_delay: Duration,
    /// Maximum number of spans buffered before new spans are dropped.
    pub queue_max_size: usize,
}

impl AgentConfig {
    /// An `AgentConfig` with default batching thresholds.
    pub fn new(service_name: impl Into<String>, exporter_kind: ExporterKind) -> Self {
        AgentConfig {
            service_name: service_name.into(),
            service_version: None,
            exporter_kind,
            endpoint: None,
            batch_max_size: 512,
            batch_max_delay: Duration::from_secs(5),
            queue_max_size: 2048,
        }
    }

    /// Check every option, returning the first violation.
    ///
    /// Validation failures are fatal at initialization: callers are expected
    /// to surface the error and refuse to start the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        if self.batch_max_size == 0 {
            return Err(ConfigError::ZeroThreshold("batch_max_size"));
        }
        if self.queue_max_size == 0 {
            return Err(ConfigError::ZeroThreshold("queue_max_size"));
        }
        if self.batch_max_delay.is_zero() {
            return Err(ConfigError::ZeroThreshold("batch_max_delay"));
        }
        if self.batch_max_size > self.queue_max_size {
            return Err(ConfigError::BatchLargerThanQueue {
                batch: self.batch_max_size,
                queue: self.queue_max_size,
            });
        }
        if self.exporter_kind == ExporterKind::OtlpHttp
            && self.endpoint.as_deref().map_or(true, |e| e.trim().is_empty())
        {
            return Err(ConfigError::MissingEndpoint("otlp-http"));
        }
        Ok(())
    }

    /// The [`Resource`] describing the service named by this config.
    pub fn resource(&self) -> Resource {
        let mut builder = Resource::builder().with_service_name(self.service_name.clone());
        if let Some(version) = &self.service_version {
            builder = builder.with_service_version(version.clone());
        }
        builder.build()
    }

    /// The [`BatchConfig`] derived from this config's thresholds.
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::builder()
            .with_max_queue_size(self.queue_max_size)
            .with_max_export_batch_size(self.batch_max_size)
            .with_scheduled_delay(self.batch_max_delay)
            .build()
    }
}
