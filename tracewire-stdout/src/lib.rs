//! A span exporter that writes one human-diffable line per span.
//!
//! Intended for local development and for pipeline smoke tests; the output
//! is stable enough to diff between runs. Production deployments should use
//! a network exporter instead.
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

pub use exporter::{SpanExporter, SpanExporterBuilder};
