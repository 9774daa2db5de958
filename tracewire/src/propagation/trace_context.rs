//! W3C Trace Context propagator.

use crate::propagation::{Extractor, Injector, TextMapPropagator};
use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use std::str::FromStr;

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;
const TRACEPARENT_HEADER: &str = "traceparent";
const TRACESTATE_HEADER: &str = "tracestate";
/// Carriers may cap header sizes; longer tracestate values are truncated
/// from the least-recently-updated end on inject.
const MAX_TRACESTATE_LEN: usize = 512;

const TRACE_CONTEXT_HEADER_FIELDS: &[&str] = &[TRACEPARENT_HEADER, TRACESTATE_HEADER];

/// Propagator for the [W3C Trace Context] `traceparent` and `tracestate`
/// headers.
///
/// `traceparent` is four lowercase-hex fields separated by dashes:
/// `{version:2}-{trace_id:32}-{span_id:16}-{flags:2}`.
///
/// [W3C Trace Context]: https://www.w3.org/TR/trace-context/
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator::default()
    }

    fn extract_span_context(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let header_value = extractor.get(TRACEPARENT_HEADER).unwrap_or("").trim();
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        // Ensure parts are not out of range.
        if parts.len() < 4 {
            return Err(());
        }

        // Ensure version is within range, for version 0 there must be 4 parts.
        let version = u8::from_str_radix(parts[0], 16).map_err(|_| ())?;
        if version > MAX_VERSION || version == 0 && parts.len() != 4 {
            return Err(());
        }

        // All fields are fixed-width lowercase hex.
        if parts[0].len() != 2
            || parts[1].len() != 32
            || parts[2].len() != 16
            || parts[3].len() != 2
            || parts[..4].iter().any(|part| !is_lowercase_hex(part))
        {
            return Err(());
        }

        let trace_id = TraceId::from_hex(parts[1]).map_err(|_| ())?;
        let span_id = SpanId::from_hex(parts[2]).map_err(|_| ())?;
        let opts = u8::from_str_radix(parts[3], 16).map_err(|_| ())?;
        // Only the sampled flag is defined; other bits are ignored.
        let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        // A malformed tracestate must not invalidate the traceparent.
        let trace_state = extractor
            .get(TRACESTATE_HEADER)
            .and_then(|state| TraceState::from_str(state).ok())
            .unwrap_or_default();

        let span_context = SpanContext::new(trace_id, span_id, trace_flags, true, trace_state);
        if span_context.is_valid() {
            Ok(span_context)
        } else {
            Err(())
        }
    }
}

fn is_lowercase_hex(part: &str) -> bool {
    part.bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl TextMapPropagator for TraceContextPropagator {
    fn inject(&self, cx: &SpanContext, injector: &mut dyn Injector) {
        if !cx.is_valid() {
            return;
        }

        let flags = cx.trace_flags() & TraceFlags::SAMPLED;
        let header_value = format!(
            "{:02x}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            cx.trace_id(),
            cx.span_id(),
            flags,
        );
        injector.set(TRACEPARENT_HEADER, header_value);

        let trace_state = cx.trace_state().trimmed_header(MAX_TRACESTATE_LEN);
        if !trace_state.is_empty() {
            injector.set(TRACESTATE_HEADER, trace_state);
        }
    }

    fn extract(&self, extractor: &dyn Extractor) -> SpanContext {
        self.extract_span_context(extractor)
            .unwrap_or(SpanContext::NONE)
    }

    fn fields(&self) -> &'static [&'static str] {
        TRACE_CONTEXT_HEADER_FIELDS
    }
}
