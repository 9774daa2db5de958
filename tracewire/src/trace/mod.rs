//! The trace pipeline: identifiers, spans, sampling, and export.
//!
//! The shape of the pipeline:
//!
//! ```text
//! Tracer --start--> Span --end--> SpanProcessor --batch--> SpanExporter
//!    ^                                                          |
//!    +-- TracerProvider (sampler, ids, limits, resource) -------+
//! ```
//!
//! A [`TracerProvider`] is built once at startup and owns the processors.
//! [`Tracer`]s create [`Span`]s, consulting the provider's sampler and id
//! generator. Ended, sampled spans freeze into [`SpanData`] and flow through
//! the registered [`SpanProcessor`]s to a [`SpanExporter`].

mod export;
mod id_generator;
mod ids;
mod in_memory_exporter;
mod provider;
mod sampler;
mod span;
mod span_context;
mod span_processor;
mod tracer;

pub use export::{ExportResult, SpanData, SpanExporter};
pub use id_generator::{IdGenerator, RandomIdGenerator, SequentialIdGenerator};
pub use ids::{SpanId, TraceFlags, TraceId};
pub use in_memory_exporter::InMemorySpanExporter;
pub use provider::{Builder, TracerProvider};
pub use sampler::{
    CloneShouldSample, Sampler, SamplingDecision, SamplingResult, ShouldSample,
};
pub use span::{Event, Link, Span, SpanKind, SpanLimits, Status};
pub use span_context::{SpanContext, TraceState, TraceStateError};
pub use span_processor::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, SimpleSpanProcessor, SpanProcessor,
};
pub use tracer::{SpanBuilder, Tracer};
