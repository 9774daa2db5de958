use crate::retry::{self, RetryErrorType, RetryPolicy};
use crate::wire;
use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracewire::trace::{ExportResult, SpanData};
use tracewire::TraceError;

/// The collector endpoint used when the builder is not given one.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4318/v1/traces";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A span exporter that POSTs OTLP-style JSON batches to a collector.
pub struct SpanExporter {
    client: reqwest::blocking::Client,
    endpoint: String,
    retry_policy: RetryPolicy,
    is_shutdown: AtomicBool,
}

impl fmt::Debug for SpanExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanExporter")
            .field("endpoint", &self.endpoint)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl SpanExporter {
    /// Start building a `SpanExporter`.
    pub fn builder() -> SpanExporterBuilder {
        SpanExporterBuilder::default()
    }

    fn send_batch(&self, batch: &[SpanData]) -> ExportResult {
        let request = wire::build_request(batch);
        let body = serde_json::to_vec(&request)
            .map_err(|err| TraceError::ExportFailed(err.to_string()))?;

        retry::retry_with_exponential_backoff(self.retry_policy, "export_spans", || {
            self.attempt(&body)
        })
    }

    // One HTTP attempt, classified for the retry loop.
    fn attempt(&self, body: &[u8]) -> Result<(), (RetryErrorType, TraceError)> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .body(body.to_vec())
            .send()
            .map_err(|err| {
                (
                    RetryErrorType::Retryable,
                    TraceError::ExportFailed(err.to_string()),
                )
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let error_type = retry::classify_http_status(status.as_u16(), retry_after.as_deref());
        Err((
            error_type,
            TraceError::ExportFailed(format!("collector returned {status}")),
        ))
    }
}

impl tracewire::trace::SpanExporter for SpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = if self.is_shutdown.load(Ordering::SeqCst) {
            Err(TraceError::AlreadyShutdown)
        } else {
            tracing::debug!(name: "otlp_export", spans = batch.len(), endpoint = %self.endpoint);
            self.send_batch(&batch)
        };
        Box::pin(std::future::ready(result))
    }

    fn shutdown(&mut self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
    }
}

/// Builder for [`SpanExporter`].
#[derive(Clone, Debug)]
pub struct SpanExporterBuilder {
    endpoint: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl Default for SpanExporterBuilder {
    fn default() -> Self {
        SpanExporterBuilder {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl SpanExporterBuilder {
    /// POST batches to `endpoint` instead of [`DEFAULT_ENDPOINT`].
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Per-request timeout covering connect, write, and read.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override how transient failures are retried.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Build the exporter, constructing the HTTP client.
    pub fn build(self) -> Result<SpanExporter, TraceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| TraceError::Internal(err.to_string()))?;
        Ok(SpanExporter {
            client,
            endpoint: self.endpoint,
            retry_policy: self.retry_policy,
            is_shutdown: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracewire::trace::SpanExporter as _;

    #[test]
    fn builder_defaults() {
        let exporter = SpanExporter::builder().build().unwrap();
        assert_eq!(exporter.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(exporter.retry_policy, RetryPolicy::default());
    }

    #[test]
    fn builder_overrides() {
        let policy = RetryPolicy {
            max_retries: 1,
            ..RetryPolicy::default()
        };
        let exporter = SpanExporter::builder()
            .with_endpoint("http://collector:4318/v1/traces")
            .with_timeout(Duration::from_secs(2))
            .with_retry_policy(policy)
            .build()
            .unwrap();
        assert_eq!(exporter.endpoint, "http://collector:4318/v1/traces");
        assert_eq!(exporter.retry_policy.max_retries, 1);
    }

    #[test]
    fn export_after_shutdown_fails() {
        let mut exporter = SpanExporter::builder().build().unwrap();
        exporter.shutdown();
        let result = futures_executor::block_on(exporter.export(vec![]));
        assert!(matches!(result, Err(TraceError::AlreadyShutdown)));
    }
}
