//! An exporter that collects spans in memory, for tests and debugging.

use crate::trace::{ExportResult, SpanData, SpanExporter};
use crate::{TraceError, TraceResult};
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A span exporter that stores finished spans in a shared `Vec`.
///
/// Clones share storage, so a test can keep one handle and give another to
/// the pipeline. Shutting the exporter down stops it accepting batches but
/// keeps everything collected so far available for inspection.
///
/// ```
/// use tracewire::trace::{InMemorySpanExporter, SimpleSpanProcessor, TracerProvider};
///
/// let exporter = InMemorySpanExporter::default();
/// let provider = TracerProvider::builder()
///     .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
///     .build();
///
/// provider.tracer().start("say hello").end();
///
/// let spans = exporter.get_finished_spans().unwrap();
/// assert_eq!(spans.len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    is_shutdown: Arc<AtomicBool>,
}

impl InMemorySpanExporter {
    /// Returns a copy of the finished spans received so far.
    pub fn get_finished_spans(&self) -> TraceResult<Vec<SpanData>> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .map_err(|_| TraceError::Internal("in-memory exporter lock poisoned".into()))
    }

    /// Clears the stored spans.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, mut batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = if self.is_shutdown.load(Ordering::SeqCst) {
            Err(TraceError::AlreadyShutdown)
        } else {
            self.spans
                .lock()
                .map(|mut spans| spans.append(&mut batch))
                .map_err(|_| TraceError::Internal("in-memory exporter lock poisoned".into()))
        };
        Box::pin(std::future::ready(result))
    }

    fn shutdown(&mut self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
    }
}
