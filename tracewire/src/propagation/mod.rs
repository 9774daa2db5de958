//! Carrying span context across process boundaries.
//!
//! A propagator reads and writes a [`SpanContext`] on a text carrier such as
//! HTTP headers. Extraction is deliberately tolerant: a missing or malformed
//! carrier yields [`SpanContext::NONE`] and the receiver simply starts a new
//! trace, because telemetry must never fail a request.

use crate::trace::SpanContext;
use std::collections::HashMap;
use std::fmt;

mod trace_context;

pub use trace_context::TraceContextPropagator;

/// Mutation interface over a text carrier, e.g. outgoing HTTP headers.
pub trait Injector {
    /// Add a key and value to the carrier.
    fn set(&mut self, key: &str, value: String);
}

/// Read interface over a text carrier, e.g. incoming HTTP headers.
pub trait Extractor {
    /// Get a value for a key from the carrier.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys in the carrier.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value. Keys are lowercased to match HTTP header
    /// case-insensitivity.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key. Keys are matched case-insensitively.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }
}

/// Writes and reads span context on text carriers.
///
/// Implementations must satisfy the round-trip law: extracting what was
/// injected from a valid context yields the same trace id, span id, flags,
/// and trace state, with the remote marker set.
pub trait TextMapPropagator: fmt::Debug {
    /// Write `cx` into the carrier. Invalid contexts write nothing.
    fn inject(&self, cx: &SpanContext, injector: &mut dyn Injector);

    /// Read a span context from the carrier.
    ///
    /// Returns [`SpanContext::NONE`] when the carrier holds no usable
    /// context; never fails.
    fn extract(&self, extractor: &dyn Extractor) -> SpanContext;

    /// The carrier keys this propagator reads and writes.
    fn fields(&self) -> &'static [&'static str];
}
