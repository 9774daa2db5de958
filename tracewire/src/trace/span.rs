//! The in-flight span and its recording state.
//!
//! A [`Span`] owns its mutable recording while open. Ending the span takes
//! the recording out, freezes it into a [`SpanData`](crate::trace::SpanData)
//! and hands it to the provider's processors exactly once. Every operation
//! after that point is a quiet no-op, and dropping an un-ended span ends it
//! implicitly, so a span can never be lost or exported twice.

use crate::context::{self, ContextGuard};
use crate::trace::{SpanContext, SpanId, Tracer};
use crate::KeyValue;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::time::SystemTime;

/// Describes the relationship between the span and its caller.
#[derive(Clone, Debug, PartialEq)]
pub enum SpanKind {
    /// Outgoing synchronous remote call, e.g. an HTTP request issued by
    /// this service.
    Client,
    /// Incoming synchronous remote call being handled.
    Server,
    /// Message sent to a broker, answered (if at all) asynchronously.
    Producer,
    /// Message received from a broker.
    Consumer,
    /// Operation internal to the service.
    Internal,
}

impl Default for SpanKind {
    fn default() -> Self {
        SpanKind::Internal
    }
}

/// The outcome a span reports once it is known.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation failed.
    Error {
        /// A developer-facing description of the failure.
        description: Cow<'static, str>,
    },
}

impl Status {
    /// Create an error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// A point-in-time annotation on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,
    /// The wall clock time at which the event occurred.
    pub timestamp: SystemTime,
    /// Attributes describing the event.
    pub attributes: Vec<KeyValue>,
    /// Event attributes dropped because of the per-event cap.
    pub dropped_attributes_count: u32,
}

impl Event {
    /// Create a new event.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
        dropped_attributes_count: u32,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
            dropped_attributes_count,
        }
    }
}

/// A causal reference to a span in this or another trace, fixed at creation.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// The context of the linked span.
    pub span_context: SpanContext,
    /// Attributes describing the link.
    pub attributes: Vec<KeyValue>,
    /// Link attributes dropped because of the per-link cap.
    pub dropped_attributes_count: u32,
}

impl Link {
    /// Create a new link to `span_context`.
    pub fn new(span_context: SpanContext, attributes: Vec<KeyValue>) -> Self {
        Link {
            span_context,
            attributes,
            dropped_attributes_count: 0,
        }
    }
}

/// Caps applied to every span's recording state.
///
/// Each cap counts what it rejects, so exported spans always carry an honest
/// record of how much was dropped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpanLimits {
    /// Maximum number of attributes per span.
    pub max_attributes_per_span: u32,
    /// Maximum number of events per span. When exceeded, the oldest event is
    /// evicted.
    pub max_events_per_span: u32,
    /// Maximum number of links per span.
    pub max_links_per_span: u32,
    /// Maximum number of attributes per event or link.
    pub max_attributes_per_event: u32,
    /// Maximum byte length of a string attribute value before truncation.
    pub max_attribute_value_length: u32,
}

impl Default for SpanLimits {
    fn default() -> Self {
        SpanLimits {
            max_attributes_per_span: 128,
            max_events_per_span: 128,
            max_links_per_span: 128,
            max_attributes_per_event: 128,
            max_attribute_value_length: 4096,
        }
    }
}

/// A single operation within a trace.
///
/// While the span is open its recording can be amended; once ended the data
/// is frozen and handed to the processors. The span's [`SpanContext`] stays
/// available for propagation for the whole lifetime of the value, even for
/// spans the sampler decided not to record.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    recording: Option<SpanRecording>,
    tracer: Tracer,
}

/// The mutable state of an open span.
#[derive(Debug)]
pub(crate) struct SpanRecording {
    pub(crate) parent_span_id: SpanId,
    pub(crate) kind: SpanKind,
    pub(crate) name: Cow<'static, str>,
    pub(crate) start_time: SystemTime,
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) dropped_attributes_count: u32,
    pub(crate) events: VecDeque<Event>,
    pub(crate) dropped_events_count: u32,
    pub(crate) links: Vec<Link>,
    pub(crate) dropped_links_count: u32,
    pub(crate) status: Status,
    pub(crate) limits: SpanLimits,
}

impl SpanRecording {
    pub(crate) fn set_attribute(&mut self, mut attribute: KeyValue) {
        attribute
            .value
            .truncate(self.limits.max_attribute_value_length as usize);
        if let Some(existing) = self.attributes.iter_mut().find(|a| a.key == attribute.key) {
            existing.value = attribute.value;
        } else if self.attributes.len() < self.limits.max_attributes_per_span as usize {
            self.attributes.push(attribute);
        } else {
            self.dropped_attributes_count = self.dropped_attributes_count.saturating_add(1);
        }
    }

    pub(crate) fn add_event(
        &mut self,
        name: Cow<'static, str>,
        timestamp: SystemTime,
        mut attributes: Vec<KeyValue>,
    ) {
        let mut dropped_attributes_count = 0;
        let event_cap = self.limits.max_attributes_per_event as usize;
        if attributes.len() > event_cap {
            dropped_attributes_count = (attributes.len() - event_cap) as u32;
            attributes.truncate(event_cap);
        }
        for attribute in attributes.iter_mut() {
            attribute
                .value
                .truncate(self.limits.max_attribute_value_length as usize);
        }

        self.events
            .push_back(Event::new(name, timestamp, attributes, dropped_attributes_count));
        if self.events.len() > self.limits.max_events_per_span as usize {
            self.events.pop_front();
            self.dropped_events_count = self.dropped_events_count.saturating_add(1);
        }
    }

    pub(crate) fn add_link(&mut self, mut link: Link) {
        let link_cap = self.limits.max_attributes_per_event as usize;
        if link.attributes.len() > link_cap {
            link.dropped_attributes_count = (link.attributes.len() - link_cap) as u32;
            link.attributes.truncate(link_cap);
        }
        if self.links.len() < self.limits.max_links_per_span as usize {
            self.links.push(link);
        } else {
            self.dropped_links_count = self.dropped_links_count.saturating_add(1);
        }
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        // unset never overwrites a terminal code; ok and error may replace
        // each other as later information arrives
        if matches!(status, Status::Unset) && !matches!(self.status, Status::Unset) {
            return;
        }
        self.status = status;
    }
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        recording: Option<SpanRecording>,
        tracer: Tracer,
    ) -> Self {
        Span {
            span_context,
            recording,
            tracer,
        }
    }

    /// The immutable, propagatable part of this span.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns `true` while the span is open and recording.
    ///
    /// Spans the sampler decided to drop, and spans that have already ended,
    /// return `false`.
    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Set an attribute, replacing any previous value for the same key.
    ///
    /// New keys beyond the configured cap are counted as dropped instead.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if let Some(recording) = self.recording.as_mut() {
            recording.set_attribute(attribute);
        }
    }

    /// Set multiple attributes at once.
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        if let Some(recording) = self.recording.as_mut() {
            for attribute in attributes {
                recording.set_attribute(attribute);
            }
        }
    }

    /// Record an event at the current time.
    pub fn add_event(&mut self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        self.add_event_with_timestamp(name, SystemTime::now(), attributes)
    }

    /// Record an event at the given time.
    pub fn add_event_with_timestamp(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) {
        if let Some(recording) = self.recording.as_mut() {
            recording.add_event(name.into(), timestamp, attributes);
        }
    }

    /// Set the status of this span.
    pub fn set_status(&mut self, status: Status) {
        if let Some(recording) = self.recording.as_mut() {
            recording.set_status(status);
        }
    }

    /// Make this span's context the ambient context on the current thread
    /// until the returned guard drops.
    pub fn make_active(&self) -> ContextGuard {
        context::attach(self.span_context.clone())
    }

    /// End the span, fixing the end time to now.
    ///
    /// Only the first call has any effect.
    pub fn end(&mut self) {
        self.end_internal(None)
    }

    /// End the span with an explicit end time.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.end_internal(Some(timestamp))
    }

    fn end_internal(&mut self, timestamp: Option<SystemTime>) {
        let Some(recording) = self.recording.take() else {
            return;
        };
        let end_time = timestamp
            .unwrap_or_else(SystemTime::now)
            .max(recording.start_time);
        self.tracer
            .finish_span(&self.span_context, recording, end_time);
    }
}

impl Drop for Span {
    /// An un-ended span ends implicitly when it goes out of scope.
    fn drop(&mut self) {
        self.end_internal(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{
        InMemorySpanExporter, Sampler, SequentialIdGenerator, SimpleSpanProcessor, SpanData,
        TracerProvider,
    };
    use crate::{Key, Value};
    use std::time::Duration;

    fn test_pipeline() -> (TracerProvider, InMemorySpanExporter) {
        test_pipeline_with_limits(SpanLimits::default())
    }

    fn test_pipeline_with_limits(limits: SpanLimits) -> (TracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
            .with_sampler(Sampler::AlwaysOn)
            .with_id_generator(SequentialIdGenerator::default())
            .with_span_limits(limits)
            .build();
        (provider, exporter)
    }

    fn exported(exporter: &InMemorySpanExporter) -> Vec<SpanData> {
        exporter.get_finished_spans().unwrap()
    }

    #[test]
    fn end_only_once() {
        let (provider, exporter) = test_pipeline();
        let tracer = provider.tracer();
        let mut span = tracer.start("operation");
        span.end();
        span.end();
        drop(span);
        assert_eq!(exported(&exporter).len(), 1);
    }

    #[test]
    fn drop_ends_span() {
        let (provider, exporter) = test_pipeline();
        let tracer = provider.tracer();
        {
            let _span = tracer.start("dropped");
        }
        let spans = exported(&exporter);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "dropped");
        assert!(spans[0].end_time >= spans[0].start_time);
    }

    #[test]
    fn noop_after_end() {
        let (provider, exporter) = test_pipeline();
        let tracer = provider.tracer();
        let mut span = tracer.start("operation");
        span.set_attribute(KeyValue::new("before", true));
        span.end();
        assert!(!span.is_recording());
        span.set_attribute(KeyValue::new("after", true));
        span.add_event("too-late", vec![]);
        span.set_status(Status::Ok);

        let spans = exported(&exporter);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].attributes, vec![KeyValue::new("before", true)]);
        assert!(spans[0].events.is_empty());
        assert_eq!(spans[0].status, Status::Unset);
    }

    #[test]
    fn attribute_last_write_wins() {
        let (provider, exporter) = test_pipeline();
        let tracer = provider.tracer();
        let mut span = tracer.start("operation");
        span.set_attribute(KeyValue::new("http.status_code", 200));
        span.set_attribute(KeyValue::new("http.status_code", 503));
        span.end();

        let spans = exported(&exporter);
        assert_eq!(
            spans[0].attributes,
            vec![KeyValue::new("http.status_code", 503)]
        );
        assert_eq!(spans[0].dropped_attributes_count, 0);
    }

    #[test]
    fn exceed_span_attributes_limit() {
        let limits = SpanLimits {
            max_attributes_per_span: 2,
            ..Default::default()
        };
        let (provider, exporter) = test_pipeline_with_limits(limits);
        let tracer = provider.tracer();
        let mut span = tracer.start("operation");
        for i in 0..5 {
            span.set_attribute(KeyValue::new(format!("key{}", i), i as i64));
        }
        // updates to existing keys are not drops
        span.set_attribute(KeyValue::new("key0".to_string(), 42i64));
        span.end();

        let spans = exported(&exporter);
        assert_eq!(spans[0].attributes.len(), 2);
        assert_eq!(spans[0].dropped_attributes_count, 3);
        assert_eq!(
            spans[0].attributes[0],
            KeyValue::new("key0".to_string(), 42i64)
        );
    }

    #[test]
    fn exceed_event_limit_evicts_oldest() {
        let limits = SpanLimits {
            max_events_per_span: 2,
            ..Default::default()
        };
        let (provider, exporter) = test_pipeline_with_limits(limits);
        let tracer = provider.tracer();
        let mut span = tracer.start("operation");
        span.add_event("first", vec![]);
        span.add_event("second", vec![]);
        span.add_event("third", vec![]);
        span.end();

        let spans = exported(&exporter);
        let names: Vec<&str> = spans[0].events.iter().map(|e| e.name.as_ref()).collect();
        assert_eq!(names, vec!["second", "third"]);
        assert_eq!(spans[0].dropped_events_count, 1);
    }

    #[test]
    fn exceed_event_attributes_limit() {
        let limits = SpanLimits {
            max_attributes_per_event: 2,
            ..Default::default()
        };
        let (provider, exporter) = test_pipeline_with_limits(limits);
        let tracer = provider.tracer();
        let mut span = tracer.start("operation");
        span.add_event(
            "event",
            (0..4)
                .map(|i| KeyValue::new(format!("key{}", i), i as i64))
                .collect(),
        );
        span.end();

        let spans = exported(&exporter);
        assert_eq!(spans[0].events[0].attributes.len(), 2);
        assert_eq!(spans[0].events[0].dropped_attributes_count, 2);
    }

    #[test]
    fn oversized_attribute_value_truncated() {
        let limits = SpanLimits {
            max_attribute_value_length: 8,
            ..Default::default()
        };
        let (provider, exporter) = test_pipeline_with_limits(limits);
        let tracer = provider.tracer();
        let mut span = tracer.start("operation");
        span.set_attribute(KeyValue::new("query", "select * from spans"));
        span.end();

        let spans = exported(&exporter);
        assert_eq!(
            spans[0].attributes[0].value,
            Value::from("select *".to_string())
        );
    }

    #[test]
    fn status_transitions() {
        let (provider, exporter) = test_pipeline();
        let tracer = provider.tracer();

        // unset never overwrites a terminal code
        let mut span = tracer.start("a");
        span.set_status(Status::Ok);
        span.set_status(Status::Unset);
        span.end();

        // ok and error may replace each other
        let mut span = tracer.start("b");
        span.set_status(Status::error("boom"));
        span.set_status(Status::Ok);
        span.end();

        let mut span = tracer.start("c");
        span.set_status(Status::Ok);
        span.set_status(Status::error("late failure"));
        span.end();

        let spans = exported(&exporter);
        assert_eq!(spans[0].status, Status::Ok);
        assert_eq!(spans[1].status, Status::Ok);
        assert_eq!(spans[2].status, Status::error("late failure"));
    }

    #[test]
    fn explicit_timestamps() {
        let (provider, exporter) = test_pipeline();
        let tracer = provider.tracer();
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let end = start + Duration::from_millis(250);
        let mut span = tracer.span_builder("timed").with_start_time(start).start();
        span.end_with_timestamp(end);

        let spans = exported(&exporter);
        assert_eq!(spans[0].start_time, start);
        assert_eq!(spans[0].end_time, end);
    }

    #[test]
    fn end_time_never_precedes_start_time() {
        let (provider, exporter) = test_pipeline();
        let tracer = provider.tracer();
        let start = SystemTime::now() + Duration::from_secs(60);
        let mut span = tracer.span_builder("skewed").with_start_time(start).start();
        span.end();

        let spans = exported(&exporter);
        assert_eq!(spans[0].end_time, spans[0].start_time);
    }

    #[test]
    fn non_sampled_span_not_exported() {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
            .with_sampler(Sampler::AlwaysOff)
            .build();
        let tracer = provider.tracer();
        let mut span = tracer.start("invisible");
        assert!(!span.is_recording());
        assert!(span.span_context().is_valid());
        assert!(!span.span_context().is_sampled());
        span.end();
        assert!(exported(&exporter).is_empty());
    }

    #[test]
    fn resource_attached_to_exported_span() {
        let exporter = InMemorySpanExporter::default();
        let resource = crate::Resource::builder().with_service_name("checkout").build();
        let provider = TracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
            .with_resource(resource.clone())
            .build();
        provider.tracer().start("op").end();

        let spans = exported(&exporter);
        assert_eq!(
            spans[0].resource.get(&Key::from("service.name")),
            Some(&Value::from("checkout"))
        );
    }
}
