//! The process-wide owner of the trace pipeline.

use crate::trace::{
    IdGenerator, RandomIdGenerator, Sampler, ShouldSample, SpanExporter, SpanLimits, SpanProcessor,
};
use crate::trace::{BatchConfig, BatchSpanProcessor, SimpleSpanProcessor, Tracer};
use crate::{Resource, TraceError, TraceResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-provider settings shared by every tracer and span.
pub(crate) struct TracerSettings {
    pub(crate) sampler: Box<dyn ShouldSample>,
    pub(crate) id_generator: Box<dyn IdGenerator>,
    pub(crate) span_limits: SpanLimits,
    pub(crate) resource: Resource,
}

impl fmt::Debug for TracerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerSettings")
            .field("span_limits", &self.span_limits)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Creator and registry of the pipeline: sampler, id generator, limits,
/// resource, and the span processors.
///
/// Built once at startup through [`TracerProvider::builder`] and immutable
/// afterwards; configuration changes require building a new provider.
/// Cloning is cheap and all clones share state. The pipeline shuts down when
/// [`shutdown`](TracerProvider::shutdown) is called or when the last clone
/// drops.
#[derive(Clone, Debug)]
pub struct TracerProvider {
    inner: Arc<TracerProviderInner>,
}

#[derive(Debug)]
struct TracerProviderInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    settings: TracerSettings,
    is_shutdown: AtomicBool,
}

impl Drop for TracerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            for processor in &self.processors {
                if let Err(err) = processor.shutdown() {
                    tracing::warn!(
                        name: "tracer_provider.drop.shutdown_failed",
                        error = %err,
                        "processor shutdown during drop failed"
                    );
                }
            }
        }
    }
}

impl TracerProvider {
    /// Start building a `TracerProvider`.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Returns a new tracer backed by this provider.
    pub fn tracer(&self) -> Tracer {
        Tracer::new(self.clone())
    }

    /// Ask every processor to export what it is holding, collecting one
    /// result per processor.
    pub fn force_flush(&self) -> Vec<TraceResult<()>> {
        self.inner
            .processors
            .iter()
            .map(|processor| processor.force_flush())
            .collect()
    }

    /// Flush and stop the pipeline.
    ///
    /// The first call wins; later calls (and calls racing the final drop)
    /// return [`TraceError::AlreadyShutdown`]. After shutdown every tracer
    /// of this provider produces non-recording spans.
    pub fn shutdown(&self) -> TraceResult<()> {
        if self
            .inner
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let errs: Vec<String> = self
                .inner
                .processors
                .iter()
                .filter_map(|processor| processor.shutdown().err())
                .map(|err| err.to_string())
                .collect();
            if errs.is_empty() {
                Ok(())
            } else {
                Err(TraceError::Internal(errs.join("; ")))
            }
        } else {
            Err(TraceError::AlreadyShutdown)
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    pub(crate) fn settings(&self) -> &TracerSettings {
        &self.inner.settings
    }

    pub(crate) fn processors(&self) -> &[Box<dyn SpanProcessor>] {
        &self.inner.processors
    }
}

/// Builder for [`TracerProvider`].
#[derive(Debug, Default)]
pub struct Builder {
    processors: Vec<Box<dyn SpanProcessor>>,
    sampler: Option<Box<dyn ShouldSample>>,
    id_generator: Option<Box<dyn IdGenerator>>,
    span_limits: Option<SpanLimits>,
    resource: Option<Resource>,
}

impl Builder {
    /// Register a span processor. Processors receive ended spans in
    /// registration order.
    pub fn with_span_processor(mut self, processor: impl SpanProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Convenience for wrapping `exporter` in a [`SimpleSpanProcessor`].
    pub fn with_simple_exporter(self, exporter: impl SpanExporter + 'static) -> Self {
        self.with_span_processor(SimpleSpanProcessor::new(exporter))
    }

    /// Convenience for wrapping `exporter` in a [`BatchSpanProcessor`].
    pub fn with_batch_exporter(
        self,
        exporter: impl SpanExporter + 'static,
        config: BatchConfig,
    ) -> Self {
        self.with_span_processor(BatchSpanProcessor::new(exporter, config))
    }

    /// Set the sampler consulted at every span start.
    pub fn with_sampler(mut self, sampler: impl ShouldSample + 'static) -> Self {
        self.sampler = Some(Box::new(sampler));
        self
    }

    /// Set the id generator.
    pub fn with_id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Some(Box::new(id_generator));
        self
    }

    /// Set the recording caps applied to every span.
    pub fn with_span_limits(mut self, span_limits: SpanLimits) -> Self {
        self.span_limits = Some(span_limits);
        self
    }

    /// Set the resource attached to every exported span.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Build the provider.
    pub fn build(self) -> TracerProvider {
        let settings = TracerSettings {
            sampler: self
                .sampler
                .unwrap_or_else(|| Box::new(Sampler::parent_based(Sampler::AlwaysOn))),
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Box::<RandomIdGenerator>::default()),
            span_limits: self.span_limits.unwrap_or_default(),
            resource: self.resource.unwrap_or_else(|| Resource::builder().build()),
        };
        TracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors: self.processors,
                settings,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}
