//! Dynamically typed column values as read from a source table.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One extracted row: column name → value, in the column order of the result set.
pub type Row = IndexMap<String, FieldValue>;

/// A single column value decoded from a source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    /// Naive timestamps and dates are interpreted as UTC.
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Render for a delivered payload: primitives stay primitive, everything
    /// else (timestamps, decimals, nested json, binary) becomes a string.
    pub fn to_payload_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.to_string())),
            FieldValue::Decimal(d) => Value::String(d.to_string()),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            FieldValue::Json(v) => match v {
                Value::Object(_) | Value::Array(_) => Value::String(v.to_string()),
                other => other.clone(),
            },
            FieldValue::Bytes(b) => Value::String(hex::encode(b)),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

/// Serializes a row as a JSON object for delivery, keeping column order.
pub struct PayloadRow<'a>(pub &'a Row);

impl Serialize for PayloadRow<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, value) in self.0 {
            map.serialize_entry(column, &value.to_payload_json())?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn primitives_stay_primitive() {
        assert_eq!(FieldValue::Int(7).to_payload_json(), json!(7));
        assert_eq!(FieldValue::Bool(true).to_payload_json(), json!(true));
        assert_eq!(FieldValue::Text("a".into()).to_payload_json(), json!("a"));
        assert_eq!(FieldValue::Null.to_payload_json(), json!(null));
    }

    #[test]
    fn non_primitives_become_strings() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            FieldValue::Timestamp(ts).to_payload_json(),
            json!("2024-03-01T12:00:00+00:00")
        );
        assert_eq!(
            FieldValue::Decimal(Decimal::new(1050, 2)).to_payload_json(),
            json!("10.50")
        );
        assert_eq!(
            FieldValue::Json(json!({"a": 1})).to_payload_json(),
            json!("{\"a\":1}")
        );
        assert_eq!(FieldValue::Bytes(vec![0xde, 0xad]).to_payload_json(), json!("dead"));
    }

    #[test]
    fn non_finite_float_is_rendered_as_string() {
        assert_eq!(FieldValue::Float(f64::NAN).to_payload_json(), json!("NaN"));
    }

    #[test]
    fn row_keeps_column_order() {
        let mut row = Row::new();
        row.insert("z".into(), FieldValue::Int(1));
        row.insert("a".into(), FieldValue::Int(2));
        let rendered = serde_json::to_string(&PayloadRow(&row)).unwrap();
        assert_eq!(rendered, r#"{"z":1,"a":2}"#);
    }
}
