//! Recursive attribute tagging.
//!
//! Total over JSON-shaped input: every value maps to a tagged OTLP attribute
//! value or to nothing at all, never to an error.

use serde_json::Value;

use super::model::{AnyValue, ArrayValue, KeyValue, KvlistValue};

/// Tag a JSON value into an OTLP attribute value.
///
/// Nulls tag to nothing. Empty arrays collapse to the literal string `"[]"`
/// rather than an empty `arrayValue`; non-empty arrays tag each element
/// individually, dropping elements that tag to nothing. Objects become
/// `kvlistValue` entries in field order, omitting fields that tag to nothing.
pub fn tag_value(value: &Value) -> Option<AnyValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(AnyValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(AnyValue::Int(i));
            }
            let f = n.as_f64()?;
            // Integer-valued floats still tag as intValue when exactly
            // representable, e.g. 9951.0.
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Some(AnyValue::Int(f as i64))
            } else {
                Some(AnyValue::Double(f))
            }
        }
        Value::String(s) => Some(AnyValue::String(s.clone())),
        Value::Array(items) if items.is_empty() => Some(AnyValue::String("[]".into())),
        Value::Array(items) => Some(AnyValue::Array(ArrayValue {
            values: items.iter().filter_map(tag_value).collect(),
        })),
        Value::Object(fields) => Some(AnyValue::Kvlist(KvlistValue {
            values: fields
                .iter()
                .filter_map(|(key, value)| tag_attribute(key, value))
                .collect(),
        })),
    }
}

/// Tag a keyed JSON value into an OTLP attribute.
///
/// Null and empty-string values produce no attribute at all (the key is
/// omitted from the payload).
pub fn tag_attribute(key: &str, value: &Value) -> Option<KeyValue> {
    if value.is_null() || value.as_str().is_some_and(str::is_empty) {
        return None;
    }

    Some(KeyValue {
        key: key.to_string(),
        value: tag_value(value)?,
    })
}
