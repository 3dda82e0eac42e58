//! Payload accumulation and resource grouping.

use tracing::error;

use crate::signal::{Meta, SignalPayload, SignalRecord};

use super::model::{LogRecord, OtelTransportPayload, ResourceLog, ResourceSpan, ScopeLog};
use super::transform::{
    default_scope, to_error_log_record, to_event_log_record, to_log_log_record,
    to_measurement_log_record, to_resource, to_resource_span, OtlpTransformOptions,
};

/// Accumulates signal records into one OTLP wire payload.
///
/// Log-mapped records group into ResourceLogs keyed by resource-relevant meta
/// equality; trace records append independent ResourceSpans and are never
/// merged.
pub struct OtelPayload {
    groups: Vec<LogsGroup>,
    resource_spans: Vec<ResourceSpan>,
    options: OtlpTransformOptions,
}

struct LogsGroup {
    meta: Meta,
    resource_log: ResourceLog,
}

impl OtelPayload {
    pub fn new(options: OtlpTransformOptions) -> Self {
        Self {
            groups: Vec::new(),
            resource_spans: Vec::new(),
            options,
        }
    }

    /// Add one record to the payload.
    ///
    /// Encoding failures are terminal for the record only: the error is
    /// logged and the rest of the batch proceeds.
    pub fn add_record(&mut self, record: &SignalRecord) {
        let meta = &record.meta;
        let log_record = match &record.payload {
            SignalPayload::Trace(payload) => {
                self.resource_spans.push(to_resource_span(payload, meta));
                return;
            }
            SignalPayload::Log(payload) => Ok(to_log_log_record(payload, meta)),
            SignalPayload::Exception(payload) => {
                Ok(to_error_log_record(payload, meta, &self.options))
            }
            SignalPayload::Event(payload) => Ok(to_event_log_record(payload, meta)),
            SignalPayload::Measurement(payload) => {
                to_measurement_log_record(payload, meta, &self.options)
            }
        };

        match log_record {
            Ok(log_record) => self.add_log_record(log_record, meta),
            Err(err) => {
                error!(error = %err, "skipping record that cannot be encoded");
            }
        }
    }

    pub fn into_payload(self) -> OtelTransportPayload {
        OtelTransportPayload {
            resource_logs: self
                .groups
                .into_iter()
                .map(|group| group.resource_log)
                .collect(),
            resource_spans: self.resource_spans,
        }
    }

    fn add_log_record(&mut self, log_record: LogRecord, meta: &Meta) {
        if let Some(group) = self
            .groups
            .iter_mut()
            .find(|group| group.meta.same_resource(meta))
        {
            if let Some(scope_log) = group.resource_log.scope_logs.first_mut() {
                scope_log.log_records.push(log_record);
            }
            return;
        }

        self.groups.push(LogsGroup {
            meta: meta.clone(),
            resource_log: ResourceLog {
                resource: to_resource(meta),
                scope_logs: vec![ScopeLog {
                    scope: default_scope(),
                    log_records: vec![log_record],
                }],
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{
        LogLevel, LogPayload, MeasurementPayload, MetaApp, MetaBrowser, TracePayload,
        TraceResourceSpans,
    };
    use serde_json::json;

    fn meta(app_name: &str) -> Meta {
        Meta {
            browser: Some(MetaBrowser {
                name: Some("firefox".into()),
                ..Default::default()
            }),
            app: Some(MetaApp {
                name: Some(app_name.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn log_record(message: &str, app_name: &str) -> SignalRecord {
        SignalRecord::new(
            SignalPayload::Log(LogPayload {
                timestamp_ms: 1,
                level: LogLevel::Info,
                message: message.into(),
                context: None,
                trace: None,
            }),
            meta(app_name),
        )
    }

    #[test]
    fn test_equal_resources_share_one_resource_log() {
        let mut payload = OtelPayload::new(OtlpTransformOptions::default());
        payload.add_record(&log_record("one", "shop"));
        payload.add_record(&log_record("two", "shop"));

        let payload = payload.into_payload();
        assert_eq!(payload.resource_logs.len(), 1);
        assert_eq!(payload.resource_logs[0].scope_logs.len(), 1);
        assert_eq!(
            payload.resource_logs[0].scope_logs[0].log_records.len(),
            2
        );
    }

    #[test]
    fn test_distinct_resources_split_groups() {
        let mut payload = OtelPayload::new(OtlpTransformOptions::default());
        payload.add_record(&log_record("one", "shop"));
        payload.add_record(&log_record("two", "catalog"));
        payload.add_record(&log_record("three", "shop"));

        let payload = payload.into_payload();
        assert_eq!(payload.resource_logs.len(), 2);
        assert_eq!(
            payload.resource_logs[0].scope_logs[0].log_records.len(),
            2
        );
        assert_eq!(
            payload.resource_logs[1].scope_logs[0].log_records.len(),
            1
        );
    }

    #[test]
    fn test_trace_records_never_merge_into_resource_logs() {
        let mut payload = OtelPayload::new(OtlpTransformOptions::default());
        payload.add_record(&log_record("one", "shop"));
        payload.add_record(&SignalRecord::new(
            SignalPayload::Trace(TracePayload {
                resource_spans: vec![TraceResourceSpans {
                    scope_spans: vec![json!({"spans": []})],
                }],
            }),
            meta("shop"),
        ));
        payload.add_record(&SignalRecord::new(
            SignalPayload::Trace(TracePayload {
                resource_spans: vec![TraceResourceSpans {
                    scope_spans: vec![json!({"spans": []})],
                }],
            }),
            meta("shop"),
        ));

        let payload = payload.into_payload();
        assert_eq!(payload.resource_logs.len(), 1);
        // One independent entry per trace record, even with equal resources.
        assert_eq!(payload.resource_spans.len(), 2);
    }

    #[test]
    fn test_unencodable_record_is_skipped_and_batch_proceeds() {
        let mut payload = OtelPayload::new(OtlpTransformOptions::default());
        payload.add_record(&log_record("one", "shop"));
        payload.add_record(&SignalRecord::new(
            SignalPayload::Measurement(MeasurementPayload {
                timestamp_ms: 1,
                kind: "web-vitals".into(),
                values: vec![],
                context: None,
                trace: None,
            }),
            meta("shop"),
        ));
        payload.add_record(&log_record("two", "shop"));

        let payload = payload.into_payload();
        assert_eq!(
            payload.resource_logs[0].scope_logs[0].log_records.len(),
            2
        );
    }

    #[test]
    fn test_wire_shape_matches_otlp_json() {
        let mut payload = OtelPayload::new(OtlpTransformOptions::default());
        payload.add_record(&log_record("hello", "shop"));

        let value = serde_json::to_value(payload.into_payload()).unwrap();
        let record = &value["resourceLogs"][0]["scopeLogs"][0]["logRecords"][0];
        assert_eq!(record["severityNumber"], json!(9));
        assert_eq!(record["severityText"], json!("INFO"));
        assert_eq!(record["body"], json!({"stringValue": "hello"}));
        assert_eq!(
            value["resourceLogs"][0]["scopeLogs"][0]["scope"]["name"],
            json!("telewire")
        );
    }
}
