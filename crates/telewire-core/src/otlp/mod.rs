// OTLP-JSON encoding
//
// Record-to-wire transform: attribute tagging, resource/record grouping,
// per-kind field mapping.

mod attribute;
mod model;
mod payload;
mod transform;

pub use attribute::{tag_attribute, tag_value};
pub use model::{
    AnyValue, ArrayValue, KeyValue, KvlistValue, LogRecord, LogsExportRequest,
    OtelTransportPayload, Resource, ResourceLog, ResourceSpan, Scope, ScopeLog,
    TracesExportRequest,
};
pub use payload::OtelPayload;
pub use transform::{severity_properties, OtlpTransformOptions};

use thiserror::Error;

/// A record that cannot be mapped onto the wire model.
///
/// Raised and logged at the payload boundary; only the offending record is
/// skipped, the rest of the batch proceeds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("measurement record carries no values")]
    MeasurementWithoutValues,
}
