//! Record-to-LogRecord and meta-to-Resource transforms.

use std::sync::Arc;

use serde_json::Value;

use crate::signal::{
    EventPayload, ExceptionPayload, LogLevel, LogPayload, MeasurementPayload, Meta, TraceContext,
    TracePayload,
};

use super::attribute::tag_attribute;
use super::model::{KeyValue, LogRecord, Resource, ResourceSpan, Scope};
use super::EncodeError;

/// Instrumentation scope stamped on every ScopeLog.
pub(crate) fn default_scope() -> Scope {
    Scope {
        name: "telewire".into(),
        version: crate::VERSION.into(),
    }
}

/// Builds a custom log body for an exception record.
pub type ErrorBodyBuilder = Arc<dyn Fn(&ExceptionPayload) -> String + Send + Sync>;
/// Builds a custom log body for a measurement record.
pub type MeasurementBodyBuilder = Arc<dyn Fn(&MeasurementPayload) -> String + Send + Sync>;

/// Caller-supplied overrides for the per-kind log bodies.
///
/// Exception and measurement records carry no body unless an override is
/// configured.
#[derive(Clone, Default)]
pub struct OtlpTransformOptions {
    pub error_log_body: Option<ErrorBodyBuilder>,
    pub measurement_log_body: Option<MeasurementBodyBuilder>,
}

/// Fixed severity table for log records.
pub fn severity_properties(level: LogLevel) -> (i32, &'static str) {
    match level {
        LogLevel::Trace => (1, "TRACE"),
        LogLevel::Debug => (5, "DEBUG"),
        LogLevel::Info => (9, "INFO"),
        LogLevel::Log => (10, "INFO2"),
        LogLevel::Warn => (13, "WARN"),
        LogLevel::Error => (17, "ERROR"),
    }
}

// Millisecond timestamps widen to nanoseconds; sub-millisecond precision is
// not recoverable.
fn time_unix_nano(timestamp_ms: u64) -> u64 {
    timestamp_ms.saturating_mul(1_000_000)
}

fn push(attributes: &mut Vec<KeyValue>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        if let Some(attribute) = tag_attribute(key, &value) {
            attributes.push(attribute);
        }
    }
}

fn trace_ids(trace: Option<&TraceContext>) -> (Option<String>, Option<String>) {
    match trace {
        Some(trace) => (Some(trace.trace_id.clone()), Some(trace.span_id.clone())),
        None => (None, None),
    }
}

/// Attributes shared by every log-mapped record: view, page, session, user.
fn common_log_attributes(meta: &Meta) -> Vec<KeyValue> {
    let mut attributes = Vec::new();

    push(
        &mut attributes,
        "view.name",
        meta.view.as_ref().map(|view| view.name.clone().into()),
    );

    if let Some(page) = meta.page.as_ref() {
        push(&mut attributes, "http.url", page.url.clone().map(Into::into));
        push(&mut attributes, "page.id", page.id.clone().map(Into::into));
        push(
            &mut attributes,
            "page.attributes",
            page.attributes.clone().map(Value::Object),
        );
    }

    if let Some(session) = meta.session.as_ref() {
        push(
            &mut attributes,
            "session.id",
            session.id.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "session.attributes",
            session.attributes.clone().map(Value::Object),
        );
    }

    if let Some(user) = meta.user.as_ref() {
        push(&mut attributes, "enduser.id", user.id.clone().map(Into::into));
        push(
            &mut attributes,
            "enduser.name",
            user.username.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "enduser.email",
            user.email.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "enduser.full_name",
            user.full_name.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "enduser.roles",
            user.roles.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "enduser.hash",
            user.hash.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "enduser.attributes",
            user.attributes.clone().map(Value::Object),
        );
    }

    attributes
}

/// Resource attributes derived from the browser/sdk/app metas.
pub(crate) fn to_resource(meta: &Meta) -> Resource {
    let mut attributes = Vec::new();

    if let Some(browser) = meta.browser.as_ref() {
        push(
            &mut attributes,
            "browser.mobile",
            browser.mobile.map(Into::into),
        );
        push(
            &mut attributes,
            "browser.user_agent",
            browser.user_agent.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "browser.language",
            browser.language.clone().map(Into::into),
        );
        push(&mut attributes, "browser.brands", browser.brands.clone());
        push(
            &mut attributes,
            "browser.os",
            browser.os.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "browser.name",
            browser.name.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "browser.version",
            browser.version.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "browser.screen_width",
            browser.viewport_width.map(Into::into),
        );
        push(
            &mut attributes,
            "browser.screen_height",
            browser.viewport_height.map(Into::into),
        );
    }

    if let Some(sdk) = meta.sdk.as_ref() {
        push(
            &mut attributes,
            "telemetry.sdk.name",
            Some(sdk.name.clone().into()),
        );
        push(
            &mut attributes,
            "telemetry.sdk.version",
            Some(sdk.version.clone().into()),
        );
        push(&mut attributes, "telemetry.sdk.language", Some("rust".into()));
    }

    if let Some(app) = meta.app.as_ref() {
        push(
            &mut attributes,
            "service.name",
            app.name.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "service.version",
            app.version.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "service.namespace",
            app.namespace.clone().map(Into::into),
        );
        push(
            &mut attributes,
            "deployment.environment",
            app.environment.clone().map(Into::into),
        );
    }

    Resource { attributes }
}

pub(crate) fn to_log_log_record(payload: &LogPayload, meta: &Meta) -> LogRecord {
    let (severity_number, severity_text) = severity_properties(payload.level);
    let (trace_id, span_id) = trace_ids(payload.trace.as_ref());

    let mut attributes = common_log_attributes(meta);
    push(
        &mut attributes,
        "telewire.log.context",
        payload.context.clone().map(Value::Object),
    );

    LogRecord {
        time_unix_nano: time_unix_nano(payload.timestamp_ms),
        severity_number: Some(severity_number),
        severity_text: Some(severity_text.into()),
        body: Some(super::model::AnyValue::String(payload.message.clone())),
        attributes,
        trace_id,
        span_id,
    }
}

pub(crate) fn to_error_log_record(
    payload: &ExceptionPayload,
    meta: &Meta,
    options: &OtlpTransformOptions,
) -> LogRecord {
    let (trace_id, span_id) = trace_ids(payload.trace.as_ref());

    let mut attributes = common_log_attributes(meta);
    push(
        &mut attributes,
        "exception.type",
        Some(payload.kind.clone().into()),
    );
    push(
        &mut attributes,
        "exception.message",
        Some(payload.value.clone().into()),
    );
    push(
        &mut attributes,
        "telewire.error.stacktrace",
        payload
            .stacktrace
            .as_ref()
            .and_then(|stacktrace| serde_json::to_value(stacktrace).ok()),
    );
    push(
        &mut attributes,
        "telewire.error.context",
        payload.context.clone().map(Value::Object),
    );

    LogRecord {
        time_unix_nano: time_unix_nano(payload.timestamp_ms),
        severity_number: None,
        severity_text: None,
        body: options
            .error_log_body
            .as_ref()
            .map(|build| super::model::AnyValue::String(build(payload))),
        attributes,
        trace_id,
        span_id,
    }
}

pub(crate) fn to_event_log_record(payload: &EventPayload, meta: &Meta) -> LogRecord {
    let (trace_id, span_id) = trace_ids(payload.trace.as_ref());

    let mut attributes = common_log_attributes(meta);
    push(
        &mut attributes,
        "event.name",
        Some(payload.name.clone().into()),
    );
    push(
        &mut attributes,
        "event.domain",
        payload.domain.clone().map(Into::into),
    );
    push(
        &mut attributes,
        "event.attributes",
        payload.attributes.clone().map(Value::Object),
    );

    LogRecord {
        time_unix_nano: time_unix_nano(payload.timestamp_ms),
        severity_number: None,
        severity_text: None,
        body: Some(super::model::AnyValue::String(payload.name.clone())),
        attributes,
        trace_id,
        span_id,
    }
}

pub(crate) fn to_measurement_log_record(
    payload: &MeasurementPayload,
    meta: &Meta,
    options: &OtlpTransformOptions,
) -> Result<LogRecord, EncodeError> {
    let (name, value) = payload
        .values
        .first()
        .ok_or(EncodeError::MeasurementWithoutValues)?;
    let (trace_id, span_id) = trace_ids(payload.trace.as_ref());

    let mut attributes = common_log_attributes(meta);
    push(
        &mut attributes,
        "measurement.type",
        Some(payload.kind.clone().into()),
    );
    push(&mut attributes, "measurement.name", Some(name.clone().into()));
    push(&mut attributes, "measurement.value", Some((*value).into()));
    push(
        &mut attributes,
        "telewire.measurement.context",
        payload.context.clone().map(Value::Object),
    );

    Ok(LogRecord {
        time_unix_nano: time_unix_nano(payload.timestamp_ms),
        severity_number: None,
        severity_text: None,
        body: options
            .measurement_log_body
            .as_ref()
            .map(|build| super::model::AnyValue::String(build(payload))),
        attributes,
        trace_id,
        span_id,
    })
}

/// Swap the external span tree's resource for the meta-derived one.
pub(crate) fn to_resource_span(payload: &TracePayload, meta: &Meta) -> ResourceSpan {
    let scope_spans = payload
        .resource_spans
        .first()
        .map(|spans| spans.scope_spans.clone())
        .unwrap_or_default();

    ResourceSpan {
        resource: to_resource(meta),
        scope_spans,
    }
}
