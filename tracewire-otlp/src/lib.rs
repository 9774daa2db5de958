//! A span exporter that ships OTLP-style JSON over HTTP.
//!
//! Batches are serialized as `resourceSpans -> scopeSpans -> spans` with hex
//! identifiers and unix-nano string timestamps, then POSTed to a collector
//! endpoint with a blocking client. Transient failures (HTTP 429, 5xx, and
//! transport errors) are retried with bounded exponential backoff and jitter;
//! other client errors fail the batch immediately.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

mod exporter;
mod retry;
mod wire;

pub use exporter::{SpanExporter, SpanExporterBuilder, DEFAULT_ENDPOINT};
pub use retry::RetryPolicy;
