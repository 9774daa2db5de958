//! The exporter contract and the frozen span form handed to exporters.

use crate::trace::{Event, Link, SpanContext, SpanId, SpanKind, Status};
use crate::{KeyValue, Resource, TraceError};
use futures_util::future::BoxFuture;
use std::borrow::Cow;
use std::fmt::Debug;
use std::time::SystemTime;

/// Describes the result of an export.
pub type ExportResult = Result<(), TraceError>;

/// The interface protocol-specific exporters implement to plug into the
/// processing pipeline.
///
/// An exporter is primarily a batch encoder and transmitter.
pub trait SpanExporter: Send + Sync + Debug {
    /// Export a batch of ended, sampled spans.
    ///
    /// This function is never called concurrently for the same exporter
    /// instance; the next call happens only after the current one resolves.
    /// It must not block indefinitely — any retry logic, including its
    /// deadline, is the exporter's responsibility.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult>;

    /// Called exactly once when the pipeline shuts down. Subsequent `export`
    /// calls are not allowed.
    fn shutdown(&mut self) {}
}

/// The immutable record of an ended span.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Exportable `SpanContext`.
    pub span_context: SpanContext,
    /// The id of this span's parent, or [`SpanId::INVALID`] for roots.
    pub parent_span_id: SpanId,
    /// Span kind.
    pub span_kind: SpanKind,
    /// Operation name.
    pub name: Cow<'static, str>,
    /// Wall clock start time.
    pub start_time: SystemTime,
    /// Wall clock end time, never before `start_time`.
    pub end_time: SystemTime,
    /// Span attributes.
    pub attributes: Vec<KeyValue>,
    /// Attributes rejected by the per-span cap.
    pub dropped_attributes_count: u32,
    /// Span events in arrival order.
    pub events: Vec<Event>,
    /// Events evicted by the per-span cap.
    pub dropped_events_count: u32,
    /// Links fixed at span creation.
    pub links: Vec<Link>,
    /// Links rejected by the per-span cap.
    pub dropped_links_count: u32,
    /// Span status.
    pub status: Status,
    /// The entity that produced this span, shared across all spans of the
    /// provider.
    pub resource: Resource,
}
