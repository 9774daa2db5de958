use std::thread;
use std::time::{Duration, SystemTime};

/// How export attempts are retried after transient failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt before the batch is failed.
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Random extra delay added to each retry, in milliseconds.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 1_600,
            jitter_ms: 100,
        }
    }
}

/// How a failed attempt should be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RetryErrorType {
    /// Retry after the policy's backoff delay.
    Retryable,
    /// Retry after the delay the server asked for.
    Throttled(Duration),
    /// Fail the batch immediately.
    NonRetryable,
}

/// Classifies an HTTP response status, honoring a `Retry-After` hint.
pub(crate) fn classify_http_status(
    status_code: u16,
    retry_after_header: Option<&str>,
) -> RetryErrorType {
    match status_code {
        429 => match retry_after_header.and_then(parse_retry_after) {
            Some(delay) => RetryErrorType::Throttled(delay),
            None => RetryErrorType::Retryable,
        },
        500..=599 => RetryErrorType::Retryable,
        400..=499 => RetryErrorType::NonRetryable,
        _ => RetryErrorType::Retryable,
    }
}

// Delay-seconds form only; an HTTP-date Retry-After falls back to the
// policy's own backoff. Capped at ten minutes.
fn parse_retry_after(retry_after: &str) -> Option<Duration> {
    retry_after
        .trim()
        .parse::<u64>()
        .ok()
        .map(|seconds| Duration::from_secs(seconds.min(600)))
}

fn generate_jitter(max_jitter: u64) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    nanos as u64 % (max_jitter + 1)
}

/// Runs `operation` until it succeeds, the error is non-retryable, or the
/// retry budget is exhausted. Sleeps on the calling thread between attempts.
pub(crate) fn retry_with_exponential_backoff<F, T, E>(
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, (RetryErrorType, E)>,
    E: std::fmt::Debug,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay_ms;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err((RetryErrorType::NonRetryable, err)) => return Err(err),
            Err((error_type, err)) if attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(
                    name: "otlp_export_retry",
                    operation = operation_name,
                    attempt,
                    error = format!("{err:?}"),
                );
                let backoff = match error_type {
                    RetryErrorType::Throttled(server_delay) => server_delay,
                    _ => {
                        let jitter = generate_jitter(policy.jitter_ms);
                        Duration::from_millis((delay + jitter).min(policy.max_delay_ms))
                    }
                };
                thread::sleep(backoff);
                delay = (delay * 2).min(policy.max_delay_ms);
            }
            Err((_, err)) => return Err(err),
        }
    }
}
