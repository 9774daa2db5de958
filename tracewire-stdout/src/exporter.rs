use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracewire::trace::{ExportResult, SpanData, Status};
use tracewire::{TraceError, Value};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// An exporter that writes one line per span to stdout or any `Write`.
///
/// The first batch is preceded by a single `resource` line describing the
/// emitting process. Each span line carries the name, identifiers, kind,
/// ISO-8601 UTC timestamps, status, attributes, and events.
pub struct SpanExporter {
    writer: Mutex<Box<dyn Write + Send>>,
    is_shutdown: AtomicBool,
    resource_emitted: bool,
}

impl fmt::Debug for SpanExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpanExporter")
    }
}

impl Default for SpanExporter {
    fn default() -> Self {
        SpanExporterBuilder::default().build()
    }
}

impl SpanExporter {
    /// Start building a `SpanExporter`.
    pub fn builder() -> SpanExporterBuilder {
        SpanExporterBuilder::default()
    }

    fn write_batch(&mut self, batch: &[SpanData]) -> io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "writer lock poisoned"))?;

        let need_resource = !self.resource_emitted;
        if need_resource {
            if let Some(span) = batch.first() {
                write!(writer, "resource")?;
                for kv in span.resource.iter() {
                    write!(writer, " {}={}", kv.key, format_value(&kv.value))?;
                }
                writeln!(writer)?;
            }
        }

        for span in batch {
            write_span(&mut **writer, span)?;
        }
        writer.flush()?;

        // Marked only once the whole batch has landed; a failed export
        // re-emits the header next time.
        if need_resource {
            self.resource_emitted = true;
        }
        Ok(())
    }
}

impl tracewire::trace::SpanExporter for SpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = if self.is_shutdown.load(Ordering::SeqCst) {
            Err(TraceError::AlreadyShutdown)
        } else {
            self.write_batch(&batch)
                .map_err(|err| TraceError::ExportFailed(err.to_string()))
        };
        Box::pin(std::future::ready(result))
    }

    fn shutdown(&mut self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
    }
}

fn write_span(writer: &mut dyn Write, span: &SpanData) -> io::Result<()> {
    write!(
        writer,
        "span name={:?} trace_id={} span_id={} parent_span_id={} kind={} start={} end={} status={}",
        span.name,
        span.span_context.trace_id(),
        span.span_context.span_id(),
        span.parent_span_id,
        format_kind(span),
        DateTime::<Utc>::from(span.start_time).format(TIMESTAMP_FORMAT),
        DateTime::<Utc>::from(span.end_time).format(TIMESTAMP_FORMAT),
        format_status(&span.status),
    )?;

    if !span.attributes.is_empty() || span.dropped_attributes_count > 0 {
        write!(writer, " attributes={{")?;
        for (i, kv) in span.attributes.iter().enumerate() {
            if i > 0 {
                write!(writer, ",")?;
            }
            write!(writer, "{}={}", kv.key, format_value(&kv.value))?;
        }
        write!(writer, "}}")?;
        if span.dropped_attributes_count > 0 {
            write!(writer, " dropped_attributes={}", span.dropped_attributes_count)?;
        }
    }

    if !span.events.is_empty() || span.dropped_events_count > 0 {
        write!(writer, " events=[")?;
        for (i, event) in span.events.iter().enumerate() {
            if i > 0 {
                write!(writer, ",")?;
            }
            write!(
                writer,
                "{:?}@{}",
                event.name,
                DateTime::<Utc>::from(event.timestamp).format(TIMESTAMP_FORMAT)
            )?;
        }
        write!(writer, "]")?;
        if span.dropped_events_count > 0 {
            write!(writer, " dropped_events={}", span.dropped_events_count)?;
        }
    }

    if !span.links.is_empty() {
        write!(writer, " links=[")?;
        for (i, link) in span.links.iter().enumerate() {
            if i > 0 {
                write!(writer, ",")?;
            }
            write!(
                writer,
                "{}:{}",
                link.span_context.trace_id(),
                link.span_context.span_id()
            )?;
        }
        write!(writer, "]")?;
    }

    writeln!(writer)
}

fn format_kind(span: &SpanData) -> String {
    format!("{:?}", span.span_kind).to_ascii_lowercase()
}

fn format_status(status: &Status) -> String {
    match status {
        Status::Unset => "unset".to_string(),
        Status::Ok => "ok".to_string(),
        Status::Error { description } => format!("error({:?})", description),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

/// Builder for [`SpanExporter`].
#[derive(Default)]
pub struct SpanExporterBuilder {
    writer: Option<Box<dyn Write + Send>>,
}

impl fmt::Debug for SpanExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpanExporterBuilder")
    }
}

impl SpanExporterBuilder {
    /// Write to the given writer instead of stdout. Tests use this to
    /// capture output in memory.
    pub fn with_writer(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Build the exporter.
    pub fn build(self) -> SpanExporter {
        SpanExporter {
            writer: Mutex::new(
                self.writer
                    .unwrap_or_else(|| Box::new(io::stdout())),
            ),
            is_shutdown: AtomicBool::new(false),
            resource_emitted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use tracewire::trace::{
        Event, SpanContext, SpanExporter as _, SpanId, SpanKind, TraceFlags, TraceId, TraceState,
    };
    use tracewire::{KeyValue, Resource};

    #[derive(Clone, Default)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl SharedWriter {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sample_span() -> SpanData {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        SpanData {
            span_context: SpanContext::new(
                TraceId::from(0xabcdu128),
                SpanId::from(0x1234u64),
                TraceFlags::SAMPLED,
                false,
                TraceState::NONE,
            ),
            parent_span_id: SpanId::INVALID,
            span_kind: SpanKind::Server,
            name: Cow::Borrowed("handle-request"),
            start_time: start,
            end_time: start + Duration::from_millis(120),
            attributes: vec![
                KeyValue::new("http.route", "/checkout"),
                KeyValue::new("http.status_code", 200),
            ],
            dropped_attributes_count: 0,
            events: vec![Event::new("cache-miss", start, vec![], 0)],
            dropped_events_count: 0,
            links: vec![],
            dropped_links_count: 0,
            status: Status::Ok,
            resource: Resource::builder().with_service_name("checkout").build(),
        }
    }

    #[test]
    fn writes_one_line_per_span_plus_resource_header() {
        let writer = SharedWriter::default();
        let mut exporter = SpanExporter::builder()
            .with_writer(Box::new(writer.clone()))
            .build();

        futures_executor::block_on(exporter.export(vec![sample_span(), sample_span()])).unwrap();
        let output = writer.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("resource "));
        assert!(lines[0].contains("service.name=\"checkout\""));
        assert!(lines[1].starts_with("span name=\"handle-request\""));

        // the resource header is only emitted once
        futures_executor::block_on(exporter.export(vec![sample_span()])).unwrap();
        assert_eq!(writer.contents().lines().count(), 4);
    }

    #[test]
    fn span_line_contents() {
        let writer = SharedWriter::default();
        let mut exporter = SpanExporter::builder()
            .with_writer(Box::new(writer.clone()))
            .build();
        futures_executor::block_on(exporter.export(vec![sample_span()])).unwrap();

        let output = writer.contents();
        let span_line = output.lines().nth(1).unwrap();
        assert!(span_line.contains("trace_id=0000000000000000000000000000abcd"));
        assert!(span_line.contains("span_id=0000000000001234"));
        assert!(span_line.contains("parent_span_id=0000000000000000"));
        assert!(span_line.contains("kind=server"));
        assert!(span_line.contains("start=2023-11-14T22:13:20.000000Z"));
        assert!(span_line.contains("status=ok"));
        assert!(span_line.contains("attributes={http.route=\"/checkout\",http.status_code=200}"));
        assert!(span_line.contains("events=[\"cache-miss\"@"));
    }

    #[test]
    fn resource_header_survives_a_failed_first_export() {
        struct FlakyWriter {
            inner: SharedWriter,
            failures_left: usize,
        }

        impl Write for FlakyWriter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                if self.failures_left > 0 {
                    self.failures_left -= 1;
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
                }
                self.inner.write(buf)
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let writer = SharedWriter::default();
        let mut exporter = SpanExporter::builder()
            .with_writer(Box::new(FlakyWriter {
                inner: writer.clone(),
                failures_left: 1,
            }))
            .build();

        let result = futures_executor::block_on(exporter.export(vec![sample_span()]));
        assert!(matches!(result, Err(TraceError::ExportFailed(_))));

        futures_executor::block_on(exporter.export(vec![sample_span()])).unwrap();
        let output = writer.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("resource "));
        assert!(lines[0].contains("service.name=\"checkout\""));
        assert!(lines[1].starts_with("span name="));
    }

    #[test]
    fn export_after_shutdown_fails() {
        let writer = SharedWriter::default();
        let mut exporter = SpanExporter::builder()
            .with_writer(Box::new(writer.clone()))
            .build();
        exporter.shutdown();
        let result = futures_executor::block_on(exporter.export(vec![sample_span()]));
        assert!(matches!(result, Err(TraceError::AlreadyShutdown)));
        assert!(writer.contents().is_empty());
    }
}
