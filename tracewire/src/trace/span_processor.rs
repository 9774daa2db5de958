//! Span processors sit between ended spans and exporters.
//!
//! [`SimpleSpanProcessor`] forwards each span synchronously and is meant for
//! tests and debugging. [`BatchSpanProcessor`] is the production path: a
//! bounded queue feeding a dedicated worker thread, so producers pay one
//! non-blocking channel send per span and never wait on the network. When
//! the queue is full spans are dropped and counted rather than stalling the
//! instrumented application.

use crate::trace::{SpanData, SpanExporter};
use crate::{TraceError, TraceResult};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Default maximum number of spans buffered in the channel.
const DEFAULT_MAX_QUEUE_SIZE: usize = 2048;
/// Default delay between the first span of a batch and its export.
const DEFAULT_SCHEDULED_DELAY: Duration = Duration::from_millis(5_000);
/// Default maximum batch size handed to the exporter.
const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;
/// Default deadline for flush and shutdown to complete.
const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// The interface processors implement to receive ended spans.
///
/// `on_end` is invoked on the thread that ended the span and must return
/// quickly; anything expensive belongs behind a queue.
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    /// Called once, synchronously, when a sampled span ends.
    fn on_end(&self, span: SpanData);

    /// Export all spans received so far, waiting up to the processor's
    /// configured deadline.
    fn force_flush(&self) -> TraceResult<()>;

    /// Flush and release resources. Only the first call succeeds.
    fn shutdown(&self) -> TraceResult<()>;
}

/// A processor that exports each span as soon as it ends, on the caller's
/// thread.
///
/// Every span end pays the full export cost, so this is only suitable for
/// tests and debugging.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    exporter: Mutex<Box<dyn SpanExporter>>,
    is_shutdown: AtomicBool,
}

impl SimpleSpanProcessor {
    /// Create a new `SimpleSpanProcessor` around `exporter`.
    pub fn new(exporter: impl SpanExporter + 'static) -> Self {
        SimpleSpanProcessor {
            exporter: Mutex::new(Box::new(exporter)),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }

        let result = self
            .exporter
            .lock()
            .map_err(|_| TraceError::Internal("simple processor exporter lock poisoned".into()))
            .and_then(|mut exporter| futures_executor::block_on(exporter.export(vec![span])));

        if let Err(err) = result {
            tracing::warn!(
                name: "simple_processor.export.failed",
                error = %err,
                "span export failed"
            );
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let mut exporter = self
            .exporter
            .lock()
            .map_err(|_| TraceError::Internal("simple processor exporter lock poisoned".into()))?;
        exporter.shutdown();
        Ok(())
    }
}

/// Messages flowing from producers to the batch worker.
#[derive(Debug)]
enum BatchMessage {
    Span(SpanData),
    Flush(SyncSender<TraceResult<()>>),
    Shutdown(SyncSender<TraceResult<()>>),
}

/// A processor that batches spans on a dedicated worker thread.
///
/// Spans are pushed into a bounded channel with a non-blocking send. The
/// worker exports a batch when it reaches the configured size or when the
/// configured delay has elapsed since the first span of the batch arrived,
/// whichever comes first. A full channel drops the span and increments
/// [`dropped_spans`](Self::dropped_spans).
pub struct BatchSpanProcessor {
    sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    is_shutdown: AtomicBool,
    dropped_spans: Arc<AtomicUsize>,
    export_failures: Arc<AtomicUsize>,
    max_queue_size: usize,
    export_timeout: Duration,
}

impl BatchSpanProcessor {
    /// Create a `BatchSpanProcessor` and spawn its worker thread.
    pub fn new(exporter: impl SpanExporter + 'static, config: BatchConfig) -> Self {
        let (sender, receiver) = mpsc::sync_channel(config.max_queue_size);
        let export_failures = Arc::new(AtomicUsize::new(0));
        let max_queue_size = config.max_queue_size;
        let export_timeout = config.export_timeout;

        let worker = BatchWorker {
            exporter: Box::new(exporter),
            receiver,
            batch: Vec::with_capacity(config.max_export_batch_size),
            first_arrival: None,
            export_failures: Arc::clone(&export_failures),
            config,
        };
        let handle = thread::Builder::new()
            .name("tracewire-span-export".to_string())
            .spawn(move || worker.run())
            .expect("failed to spawn span export thread");

        BatchSpanProcessor {
            sender,
            handle: Mutex::new(Some(handle)),
            is_shutdown: AtomicBool::new(false),
            dropped_spans: Arc::new(AtomicUsize::new(0)),
            export_failures,
            max_queue_size,
            export_timeout,
        }
    }

    /// Number of spans dropped because the queue was full.
    pub fn dropped_spans(&self) -> usize {
        self.dropped_spans.load(Ordering::Relaxed)
    }

    /// Number of batches whose export failed.
    pub fn export_failures(&self) -> usize {
        self.export_failures.load(Ordering::Relaxed)
    }

    fn request(
        &self,
        make: impl FnOnce(SyncSender<TraceResult<()>>) -> BatchMessage,
    ) -> TraceResult<()> {
        let (reply_sender, reply_receiver) = mpsc::sync_channel(1);
        self.sender
            .try_send(make(reply_sender))
            .map_err(|err| TraceError::Internal(format!("could not reach export worker: {err}")))?;
        reply_receiver
            .recv_timeout(self.export_timeout)
            .map_err(|_| TraceError::ExportTimedOut(self.export_timeout))?
    }
}

impl fmt::Debug for BatchSpanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSpanProcessor")
            .field("max_queue_size", &self.max_queue_size)
            .field("dropped_spans", &self.dropped_spans())
            .field("export_failures", &self.export_failures())
            .finish()
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }

        if self.sender.try_send(BatchMessage::Span(span)).is_err() {
            let previously_dropped = self.dropped_spans.fetch_add(1, Ordering::Relaxed);
            if previously_dropped == 0 {
                tracing::warn!(
                    name: "batch_processor.queue_full",
                    max_queue_size = self.max_queue_size,
                    "span queue is full, spans are being dropped"
                );
            }
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        self.request(BatchMessage::Flush)
    }

    fn shutdown(&self) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }

        let result = self.request(BatchMessage::Shutdown);

        // join only when the worker acknowledged; a stuck worker exits on
        // its own once the channel disconnects
        if result.is_ok() {
            if let Ok(mut guard) = self.handle.lock() {
                if let Some(handle) = guard.take() {
                    handle
                        .join()
                        .map_err(|_| TraceError::Internal("export worker thread panicked".into()))?;
                }
            }
        }

        result
    }
}

impl Drop for BatchSpanProcessor {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Relaxed) {
            if let Err(err) = self.shutdown() {
                tracing::warn!(
                    name: "batch_processor.shutdown.failed",
                    error = %err,
                    "shutdown during drop failed"
                );
            }
        }
    }
}

struct BatchWorker {
    exporter: Box<dyn SpanExporter>,
    receiver: Receiver<BatchMessage>,
    batch: Vec<SpanData>,
    first_arrival: Option<Instant>,
    export_failures: Arc<AtomicUsize>,
    config: BatchConfig,
}

impl BatchWorker {
    fn run(mut self) {
        // control messages set aside while draining spans for a flush
        let mut deferred: VecDeque<BatchMessage> = VecDeque::new();
        loop {
            let message = match deferred.pop_front() {
                Some(message) => message,
                None => {
                    let wait = match self.first_arrival {
                        Some(since) => self.config.scheduled_delay.saturating_sub(since.elapsed()),
                        None => self.config.scheduled_delay,
                    };
                    match self.receiver.recv_timeout(wait) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => {
                            if !self.batch.is_empty() {
                                let _ = self.export_batch();
                            }
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            // all producers gone; deliver what is left
                            let _ = self.export_batch();
                            self.exporter.shutdown();
                            return;
                        }
                    }
                }
            };

            match message {
                BatchMessage::Span(span) => self.enqueue(span),
                BatchMessage::Flush(reply) => {
                    self.drain(&mut deferred);
                    let result = self.export_batch();
                    let _ = reply.send(result);
                }
                BatchMessage::Shutdown(reply) => {
                    self.drain(&mut deferred);
                    let result = self.export_batch();
                    self.exporter.shutdown();
                    let _ = reply.send(result);
                    return;
                }
            }
        }
    }

    fn enqueue(&mut self, span: SpanData) {
        if self.batch.is_empty() {
            self.first_arrival = Some(Instant::now());
        }
        self.batch.push(span);
        if self.batch.len() >= self.config.max_export_batch_size {
            let _ = self.export_batch();
        }
    }

    /// Pull everything already queued so a flush covers spans that ended
    /// before the flush call.
    fn drain(&mut self, deferred: &mut VecDeque<BatchMessage>) {
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                BatchMessage::Span(span) => self.enqueue(span),
                other => deferred.push_back(other),
            }
        }
    }

    fn export_batch(&mut self) -> TraceResult<()> {
        self.first_arrival = None;
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        let span_count = batch.len();
        match futures_executor::block_on(self.exporter.export(batch)) {
            Ok(()) => {
                tracing::debug!(
                    name: "batch_processor.export.success",
                    spans = span_count
                );
                Ok(())
            }
            Err(err) => {
                self.export_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    name: "batch_processor.export.failed",
                    error = %err,
                    spans = span_count,
                    "batch export failed"
                );
                Err(err)
            }
        }
    }
}

/// Configuration for [`BatchSpanProcessor`].
#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub(crate) max_queue_size: usize,
    pub(crate) scheduled_delay: Duration,
    pub(crate) max_export_batch_size: usize,
    pub(crate) export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

impl BatchConfig {
    /// Start building a `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }
}

/// Builder for [`BatchConfig`].
#[derive(Clone, Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    export_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            scheduled_delay: DEFAULT_SCHEDULED_DELAY,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
        }
    }
}

impl BatchConfigBuilder {
    /// Set the maximum number of spans buffered before new spans are
    /// dropped.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the delay after which a partial batch is exported anyway.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set the batch size that triggers an immediate export.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set the deadline for flush and shutdown calls.
    pub fn with_export_timeout(mut self, export_timeout: Duration) -> Self {
        self.export_timeout = export_timeout;
        self
    }

    /// Build the `BatchConfig`. A batch size above the queue size is clamped
    /// down to it.
    pub fn build(self) -> BatchConfig {
        BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size: self.max_export_batch_size.min(self.max_queue_size),
            export_timeout: self.export_timeout,
        }
    }
}
