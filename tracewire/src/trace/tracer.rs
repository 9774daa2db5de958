//! Span creation.

use crate::context;
use crate::trace::span::SpanRecording;
use crate::trace::{
    Link, SamplingDecision, Span, SpanContext, SpanData, SpanId, SpanKind, Status, TraceFlags,
    TracerProvider,
};
use crate::KeyValue;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::time::SystemTime;

/// The entry point for creating spans.
///
/// Tracers are cheap clones of a handle onto their provider; create as many
/// as convenient.
#[derive(Clone, Debug)]
pub struct Tracer {
    provider: TracerProvider,
}

impl Tracer {
    pub(crate) fn new(provider: TracerProvider) -> Self {
        Tracer { provider }
    }

    /// The provider this tracer belongs to.
    pub fn provider(&self) -> &TracerProvider {
        &self.provider
    }

    /// Start a span with default options.
    ///
    /// The parent is resolved from the ambient context of the current
    /// thread; use [`span_builder`](Self::span_builder) to set one
    /// explicitly.
    pub fn start(&self, name: impl Into<Cow<'static, str>>) -> Span {
        self.span_builder(name).start()
    }

    /// Start describing a span with explicit options.
    pub fn span_builder(&self, name: impl Into<Cow<'static, str>>) -> SpanBuilder {
        SpanBuilder {
            tracer: self.clone(),
            name: name.into(),
            kind: SpanKind::default(),
            parent: None,
            attributes: Vec::new(),
            links: Vec::new(),
            start_time: None,
        }
    }

    /// Run `f` inside a span named `name`.
    ///
    /// The span is the ambient context while `f` runs and is guaranteed to
    /// end on every exit path, including panics.
    pub fn in_span<T, F>(&self, name: impl Into<Cow<'static, str>>, f: F) -> T
    where
        F: FnOnce(&mut Span) -> T,
    {
        let mut span = self.start(name);
        let guard = span.make_active();
        let result = f(&mut span);
        drop(guard);
        span.end();
        result
    }

    /// Decide sampling, allocate ids, and assemble the span.
    pub(crate) fn build_span(&self, builder: SpanBuilder) -> Span {
        let settings = self.provider.settings();

        let parent = builder
            .parent
            .filter(|cx| cx.is_valid())
            .or_else(|| context::current().filter(|cx| cx.is_valid()));

        let trace_id = parent
            .as_ref()
            .map(|cx| cx.trace_id())
            .unwrap_or_else(|| settings.id_generator.new_trace_id());
        let span_id = settings.id_generator.new_span_id();

        if self.provider.is_shutdown() {
            let span_context =
                SpanContext::new(trace_id, span_id, TraceFlags::NOT_SAMPLED, false, Default::default());
            return Span::new(span_context, None, self.clone());
        }

        let sampling = settings.sampler.should_sample(
            parent.as_ref(),
            trace_id,
            &builder.name,
            &builder.kind,
            &builder.attributes,
        );

        let parent_flags = parent
            .as_ref()
            .map(|cx| cx.trace_flags())
            .unwrap_or_default();
        let trace_flags =
            parent_flags.with_sampled(sampling.decision == SamplingDecision::RecordAndSample);
        let span_context =
            SpanContext::new(trace_id, span_id, trace_flags, false, sampling.trace_state);

        if sampling.decision == SamplingDecision::Drop {
            return Span::new(span_context, None, self.clone());
        }

        let mut recording = SpanRecording {
            parent_span_id: parent
                .as_ref()
                .map(|cx| cx.span_id())
                .unwrap_or(SpanId::INVALID),
            kind: builder.kind,
            name: builder.name,
            start_time: builder.start_time.unwrap_or_else(SystemTime::now),
            attributes: Vec::new(),
            dropped_attributes_count: 0,
            events: VecDeque::new(),
            dropped_events_count: 0,
            links: Vec::new(),
            dropped_links_count: 0,
            status: Status::Unset,
            limits: settings.span_limits,
        };
        for attribute in builder.attributes {
            recording.set_attribute(attribute);
        }
        for link in builder.links {
            recording.add_link(link);
        }

        Span::new(span_context, Some(recording), self.clone())
    }

    /// Freeze an ended recording and hand it to the processors.
    pub(crate) fn finish_span(
        &self,
        span_context: &SpanContext,
        recording: SpanRecording,
        end_time: SystemTime,
    ) {
        if !span_context.is_sampled() || self.provider.is_shutdown() {
            return;
        }

        let data = SpanData {
            span_context: span_context.clone(),
            parent_span_id: recording.parent_span_id,
            span_kind: recording.kind,
            name: recording.name,
            start_time: recording.start_time,
            end_time,
            attributes: recording.attributes,
            dropped_attributes_count: recording.dropped_attributes_count,
            events: recording.events.into(),
            dropped_events_count: recording.dropped_events_count,
            links: recording.links,
            dropped_links_count: recording.dropped_links_count,
            status: recording.status,
            resource: self.provider.settings().resource.clone(),
        };

        match self.provider.processors() {
            [] => {}
            [processor] => processor.on_end(data),
            processors => {
                for processor in processors {
                    processor.on_end(data.clone());
                }
            }
        }
    }
}

/// Options for a span, applied when [`start`](SpanBuilder::start) is called.
#[derive(Debug)]
pub struct SpanBuilder {
    tracer: Tracer,
    name: Cow<'static, str>,
    kind: SpanKind,
    parent: Option<SpanContext>,
    attributes: Vec<KeyValue>,
    links: Vec<Link>,
    start_time: Option<SystemTime>,
}

impl SpanBuilder {
    /// Set the span kind.
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set an explicit parent, overriding the ambient context.
    pub fn with_parent(mut self, parent: SpanContext) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set initial attributes.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Add links to spans in this or other traces. Links cannot be added
    /// after the span starts.
    pub fn with_links(mut self, links: impl IntoIterator<Item = Link>) -> Self {
        self.links.extend(links);
        self
    }

    /// Set an explicit start time.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Start the span.
    pub fn start(self) -> Span {
        let tracer = self.tracer.clone();
        tracer.build_span(self)
    }
}
