//! OTLP-JSON wire model.
//!
//! Serialize-only mirror of the collector-facing payload shape. Field names
//! follow the OTLP JSON mapping (camelCase, externally tagged values);
//! absent optional fields are omitted rather than serialized as null.

use serde::Serialize;
use serde_json::Value;

/// Tagged attribute value.
///
/// Serde's externally-tagged representation produces exactly the OTLP-JSON
/// encoding: `{"stringValue": "..."}`, `{"intValue": 7}`, and so on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AnyValue {
    #[serde(rename = "stringValue")]
    String(String),
    #[serde(rename = "intValue")]
    Int(i64),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "boolValue")]
    Bool(bool),
    #[serde(rename = "arrayValue")]
    Array(ArrayValue),
    #[serde(rename = "kvlistValue")]
    Kvlist(KvlistValue),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayValue {
    pub values: Vec<AnyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KvlistValue {
    pub values: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

/// Top-level wire payload: `{resourceLogs: [...], resourceSpans: [...]}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtelTransportPayload {
    pub resource_logs: Vec<ResourceLog>,
    pub resource_spans: Vec<ResourceSpan>,
}

/// OTLP grouping of attributes describing the producing environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLog {
    pub resource: Resource,
    pub scope_logs: Vec<ScopeLog>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLog {
    pub scope: Scope,
    pub log_records: Vec<LogRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scope {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub time_unix_nano: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_number: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<AnyValue>,
    pub attributes: Vec<KeyValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

/// Request body for the logs destination: `{"resourceLogs": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsExportRequest<'a> {
    pub resource_logs: &'a [ResourceLog],
}

/// Request body for the traces destination: `{"resourceSpans": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TracesExportRequest<'a> {
    pub resource_spans: &'a [ResourceSpan],
}

/// An externally produced span tree with the meta-derived resource swapped in.
///
/// Scope spans come from the tracer already protocol-shaped and are carried
/// opaquely.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpan {
    pub resource: Resource,
    pub scope_spans: Vec<Value>,
}
