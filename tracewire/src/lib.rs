//! An application performance monitoring agent core: create spans around
//! units of work, sample them, batch them off the hot path, and export them
//! to a backend.
//!
//! # Getting started
//!
//! Build a [`trace::TracerProvider`] once at startup, hand processors an
//! exporter, and create spans through a [`trace::Tracer`]:
//!
//! ```
//! use tracewire::trace::{InMemorySpanExporter, SimpleSpanProcessor, TracerProvider};
//! use tracewire::KeyValue;
//!
//! let exporter = InMemorySpanExporter::default();
//! let provider = TracerProvider::builder()
//!     .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
//!     .build();
//!
//! let tracer = provider.tracer();
//! tracer.in_span("handle-request", |span| {
//!     span.set_attribute(KeyValue::new("http.route", "/checkout"));
//!     // real work happens here; child spans pick this one up as parent
//! });
//!
//! assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
//! provider.shutdown().unwrap();
//! ```
//!
//! Production deployments swap [`trace::SimpleSpanProcessor`] for
//! [`trace::BatchSpanProcessor`] and the in-memory exporter for a real one;
//! the static [`config::AgentConfig`] struct carries those choices from the
//! embedding application.
//!
//! Telemetry never alters application control flow: queue overflow, export
//! failure, and propagation of malformed headers all degrade to counted data
//! loss, reported through this crate's own [`tracing`] events.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

mod attributes;
mod error;

pub mod config;
pub mod context;
pub mod propagation;
pub mod resource;
pub mod trace;

pub use attributes::{Array, Key, KeyValue, Value};
pub use error::{ConfigError, TraceError, TraceResult};
pub use resource::Resource;
