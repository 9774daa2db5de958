//! The JSON request body shape.
//!
//! Mirrors the collector's `ExportTraceServiceRequest`: identifiers are
//! lowercase hex strings, timestamps are unix-nano decimal strings, and
//! integer attribute values are carried as strings so 64-bit values survive
//! JSON number parsing.

use serde::Serialize;
use std::time::SystemTime;
use tracewire::trace::{SpanData, SpanKind, Status};
use tracewire::{Array, KeyValue, Value};

const SCOPE_NAME: &str = "tracewire";
const SCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportTraceServiceRequest {
    resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSpans {
    resource: WireResource,
    scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireResource {
    attributes: Vec<WireKeyValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScopeSpans {
    scope: WireScope,
    spans: Vec<WireSpan>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireScope {
    name: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSpan {
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    parent_span_id: String,
    name: String,
    kind: u32,
    start_time_unix_nano: String,
    end_time_unix_nano: String,
    attributes: Vec<WireKeyValue>,
    #[serde(skip_serializing_if = "is_zero")]
    dropped_attributes_count: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    events: Vec<WireEvent>,
    #[serde(skip_serializing_if = "is_zero")]
    dropped_events_count: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    links: Vec<WireLink>,
    #[serde(skip_serializing_if = "is_zero")]
    dropped_links_count: u32,
    status: WireStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    name: String,
    time_unix_nano: String,
    attributes: Vec<WireKeyValue>,
    #[serde(skip_serializing_if = "is_zero")]
    dropped_attributes_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireLink {
    trace_id: String,
    span_id: String,
    attributes: Vec<WireKeyValue>,
    #[serde(skip_serializing_if = "is_zero")]
    dropped_attributes_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireStatus {
    code: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireKeyValue {
    key: String,
    value: WireAnyValue,
}

#[derive(Debug, Serialize)]
enum WireAnyValue {
    #[serde(rename = "stringValue")]
    String(String),
    #[serde(rename = "boolValue")]
    Bool(bool),
    #[serde(rename = "intValue")]
    Int(String),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "arrayValue")]
    Array { values: Vec<WireAnyValue> },
}

fn is_zero(count: &u32) -> bool {
    *count == 0
}

fn unix_nanos(time: SystemTime) -> String {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
        .to_string()
}

fn wire_attributes(attributes: &[KeyValue]) -> Vec<WireKeyValue> {
    attributes
        .iter()
        .map(|kv| WireKeyValue {
            key: kv.key.as_str().to_string(),
            value: wire_value(&kv.value),
        })
        .collect()
}

fn wire_value(value: &Value) -> WireAnyValue {
    match value {
        Value::Bool(b) => WireAnyValue::Bool(*b),
        Value::I64(i) => WireAnyValue::Int(i.to_string()),
        Value::F64(f) => WireAnyValue::Double(*f),
        Value::String(s) => WireAnyValue::String(s.to_string()),
        Value::Array(array) => WireAnyValue::Array {
            values: match array {
                Array::Bool(values) => values.iter().map(|b| WireAnyValue::Bool(*b)).collect(),
                Array::I64(values) => values
                    .iter()
                    .map(|i| WireAnyValue::Int(i.to_string()))
                    .collect(),
                Array::F64(values) => values.iter().map(|f| WireAnyValue::Double(*f)).collect(),
                Array::String(values) => values
                    .iter()
                    .map(|s| WireAnyValue::String(s.to_string()))
                    .collect(),
            },
        },
    }
}

fn wire_status(status: &Status) -> WireStatus {
    match status {
        Status::Unset => WireStatus {
            code: 0,
            message: String::new(),
        },
        Status::Ok => WireStatus {
            code: 1,
            message: String::new(),
        },
        Status::Error { description } => WireStatus {
            code: 2,
            message: description.to_string(),
        },
    }
}

fn wire_kind(kind: &SpanKind) -> u32 {
    match kind {
        SpanKind::Internal => 1,
        SpanKind::Server => 2,
        SpanKind::Client => 3,
        SpanKind::Producer => 4,
        SpanKind::Consumer => 5,
    }
}

fn wire_span(span: &SpanData) -> WireSpan {
    WireSpan {
        trace_id: span.span_context.trace_id().to_string(),
        span_id: span.span_context.span_id().to_string(),
        parent_span_id: if span.parent_span_id == tracewire::trace::SpanId::INVALID {
            String::new()
        } else {
            span.parent_span_id.to_string()
        },
        name: span.name.to_string(),
        kind: wire_kind(&span.span_kind),
        start_time_unix_nano: unix_nanos(span.start_time),
        end_time_unix_nano: unix_nanos(span.end_time),
        attributes: wire_attributes(&span.attributes),
        dropped_attributes_count: span.dropped_attributes_count,
        events: span
            .events
            .iter()
            .map(|event| WireEvent {
                name: event.name.to_string(),
                time_unix_nano: unix_nanos(event.timestamp),
                attributes: wire_attributes(&event.attributes),
                dropped_attributes_count: event.dropped_attributes_count,
            })
            .collect(),
        dropped_events_count: span.dropped_events_count,
        links: span
            .links
            .iter()
            .map(|link| WireLink {
                trace_id: link.span_context.trace_id().to_string(),
                span_id: link.span_context.span_id().to_string(),
                attributes: wire_attributes(&link.attributes),
                dropped_attributes_count: link.dropped_attributes_count,
            })
            .collect(),
        dropped_links_count: span.dropped_links_count,
        status: wire_status(&span.status),
    }
}

/// Assembles the request body for one batch.
///
/// Every span of a batch comes from the same provider and therefore shares
/// one resource, so the batch maps to a single `resourceSpans` entry.
pub(crate) fn build_request(batch: &[SpanData]) -> ExportTraceServiceRequest {
    let resource_attributes = batch
        .first()
        .map(|span| {
            span.resource
                .iter()
                .map(|kv| WireKeyValue {
                    key: kv.key.as_str().to_string(),
                    value: wire_value(&kv.value),
                })
                .collect()
        })
        .unwrap_or_default();

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: WireResource {
                attributes: resource_attributes,
            },
            scope_spans: vec![ScopeSpans {
                scope: WireScope {
                    name: SCOPE_NAME,
                    version: SCOPE_VERSION,
                },
                spans: batch.iter().map(wire_span).collect(),
            }],
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::borrow::Cow;
    use std::time::Duration;
    use tracewire::trace::{
        Event, Link, SpanContext, SpanId, TraceFlags, TraceId, TraceState,
    };
    use tracewire::Resource;

    fn sample_span() -> SpanData {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        SpanData {
            span_context: SpanContext::new(
                TraceId::from(0x4bf92f3577b34da6a3ce929d0e0e4736u128),
                SpanId::from(0x00f067aa0ba902b7u64),
                TraceFlags::SAMPLED,
                false,
                TraceState::NONE,
            ),
            parent_span_id: SpanId::from(0x1u64),
            span_kind: SpanKind::Client,
            name: Cow::Borrowed("fetch-inventory"),
            start_time: start,
            end_time: start + Duration::from_nanos(1_500),
            attributes: vec![
                KeyValue::new("db.rows", 42),
                KeyValue::new("db.system", "postgres"),
            ],
            dropped_attributes_count: 3,
            events: vec![Event::new("retry", start, vec![], 0)],
            dropped_events_count: 0,
            links: vec![Link::new(
                SpanContext::new(
                    TraceId::from(0xbeefu128),
                    SpanId::from(0xfeedu64),
                    TraceFlags::SAMPLED,
                    true,
                    TraceState::NONE,
                ),
                vec![],
            )],
            dropped_links_count: 0,
            status: Status::error("connection reset"),
            resource: Resource::builder().with_service_name("inventory").build(),
        }
    }

    #[test]
    fn request_shape() {
        let request = build_request(&[sample_span()]);
        let value = serde_json::to_value(&request).unwrap();

        let span = &value["resourceSpans"][0]["scopeSpans"][0]["spans"][0];
        assert_eq!(span["traceId"], json!("4bf92f3577b34da6a3ce929d0e0e4736"));
        assert_eq!(span["spanId"], json!("00f067aa0ba902b7"));
        assert_eq!(span["parentSpanId"], json!("0000000000000001"));
        assert_eq!(span["name"], json!("fetch-inventory"));
        assert_eq!(span["kind"], json!(3));
        assert_eq!(span["startTimeUnixNano"], json!("1700000000000000000"));
        assert_eq!(span["endTimeUnixNano"], json!("1700000000000001500"));
        assert_eq!(span["droppedAttributesCount"], json!(3));
        assert_eq!(span["status"]["code"], json!(2));
        assert_eq!(span["status"]["message"], json!("connection reset"));

        let attributes = span["attributes"].as_array().unwrap();
        assert_eq!(attributes[0]["key"], json!("db.rows"));
        assert_eq!(attributes[0]["value"], json!({ "intValue": "42" }));
        assert_eq!(attributes[1]["value"], json!({ "stringValue": "postgres" }));

        assert_eq!(span["events"][0]["name"], json!("retry"));
        assert_eq!(span["links"][0]["spanId"], json!("000000000000feed"));

        let scope = &value["resourceSpans"][0]["scopeSpans"][0]["scope"];
        assert_eq!(scope["name"], json!("tracewire"));
    }

    #[test]
    fn root_span_omits_parent_id() {
        let mut span = sample_span();
        span.parent_span_id = SpanId::INVALID;
        span.status = Status::Unset;
        let value = serde_json::to_value(build_request(&[span])).unwrap();

        let span = &value["resourceSpans"][0]["scopeSpans"][0]["spans"][0];
        assert!(span.get("parentSpanId").is_none());
        assert_eq!(span["status"], json!({ "code": 0 }));
    }

    #[test]
    fn resource_attributes_are_lifted_from_the_batch() {
        let value = serde_json::to_value(build_request(&[sample_span()])).unwrap();
        let attributes = value["resourceSpans"][0]["resource"]["attributes"]
            .as_array()
            .unwrap();
        assert!(attributes.iter().any(|kv| {
            kv["key"] == json!("service.name") && kv["value"] == json!({ "stringValue": "inventory" })
        }));
    }

    #[test]
    fn empty_batch_serializes_to_empty_spans() {
        let value = serde_json::to_value(build_request(&[])).unwrap();
        let spans = value["resourceSpans"][0]["scopeSpans"][0]["spans"]
            .as_array()
            .unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn array_values_nest() {
        let kv = KeyValue::new("retry.delays_ms", vec![10i64, 20, 40]);
        let wire = wire_attributes(&[kv]);
        let value = serde_json::to_value(&wire[0]).unwrap();
        assert_eq!(
            value["value"],
            json!({ "arrayValue": { "values": [
                { "intValue": "10" },
                { "intValue": "20" },
                { "intValue": "40" }
            ] } })
        );
    }
}
