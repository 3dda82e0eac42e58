//! Normalized signal records.
//!
//! Instrumentation hooks (out of scope here) produce one `SignalRecord` per
//! captured event together with an immutable `Meta` snapshot of the ambient
//! context. Records are created once, never mutated, and consumed exactly
//! once - delivered or dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form attribute map attached to metas and payloads.
///
/// Values are JSON-shaped; the encoder tags them recursively into OTLP
/// attributes.
pub type AttributeMap = serde_json::Map<String, Value>;

/// One normalized telemetry event plus its contextual snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub payload: SignalPayload,
    pub meta: Meta,
}

impl SignalRecord {
    pub fn new(payload: SignalPayload, meta: Meta) -> Self {
        Self { payload, meta }
    }
}

/// Signal kind plus kind-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalPayload {
    Log(LogPayload),
    Exception(ExceptionPayload),
    Event(EventPayload),
    Measurement(MeasurementPayload),
    Trace(TracePayload),
}

/// Log severity level as captured at the instrumentation site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    /// Plain `console.log`-style output, between INFO and WARN.
    Log,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Log => write!(f, "log"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Correlation ids linking a record to an active span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPayload {
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<AttributeMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionPayload {
    pub timestamp_ms: u64,
    /// Error class or type name, e.g. `TypeError`.
    pub kind: String,
    /// Error message.
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<AttributeMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace {
    pub frames: Vec<StackFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    pub function: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub timestamp_ms: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributeMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPayload {
    pub timestamp_ms: u64,
    /// Measurement category, e.g. `web-vitals`.
    pub kind: String,
    /// Ordered metric name/value pairs; the encoder maps the first pair.
    pub values: Vec<(String, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<AttributeMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,
}

/// A complete span tree produced by an external tracer.
///
/// The tree is carried opaquely; the encoder only swaps in the meta-derived
/// resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePayload {
    #[serde(rename = "resourceSpans")]
    pub resource_spans: Vec<TraceResourceSpans>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceResourceSpans {
    #[serde(rename = "scopeSpans", default)]
    pub scope_spans: Vec<Value>,
}

/// Immutable point-in-time snapshot of the ambient context.
///
/// `browser`, `sdk` and `app` describe the producing environment and form the
/// resource grouping key; `session`, `user`, `page` and `view` become
/// per-record attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<MetaSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<MetaUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<MetaPage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<MetaView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<MetaBrowser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<MetaSdk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<MetaApp>,
}

impl Meta {
    /// True when two snapshots describe the same producing environment.
    ///
    /// Only the resource-relevant fields participate; session, user, page and
    /// view identify the record, not the resource.
    pub fn same_resource(&self, other: &Meta) -> bool {
        self.browser == other.browser && self.sdk == other.sdk && self.app == other.app
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetaSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributeMap>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetaUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributeMap>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetaPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributeMap>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaView {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetaBrowser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Brand/version list or a single brand string, carried as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brands: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSdk {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetaApp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}
