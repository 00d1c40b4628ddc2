//! Watermark values and their ordering.
//!
//! A watermark is the highest value of the capture column that has been
//! delivered and committed. Comparison follows the column's natural order:
//! numeric values (int, float, decimal) compare numerically with each other,
//! timestamps chronologically, text lexicographically. Values from different
//! families are incomparable and `partial_cmp` returns `None` for them; they
//! are never compared through their string forms.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value::FieldValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Watermark {
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Watermark {
    /// Convert a column value into a watermark candidate.
    ///
    /// Nulls, booleans, json, binary and non-finite floats cannot act as a cursor.
    pub fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(i) => Some(Watermark::Int(*i)),
            FieldValue::Float(f) if f.is_finite() => Some(Watermark::Float(*f)),
            FieldValue::Decimal(d) => Some(Watermark::Decimal(*d)),
            FieldValue::Timestamp(ts) => Some(Watermark::Timestamp(*ts)),
            FieldValue::Text(s) => Some(Watermark::Text(s.clone())),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Watermark::Float(f) => f.is_finite(),
            _ => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Watermark::Int(_) => "int",
            Watermark::Float(_) => "float",
            Watermark::Decimal(_) => "decimal",
            Watermark::Timestamp(_) => "timestamp",
            Watermark::Text(_) => "text",
        }
    }

    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Watermark::Int(i) => Some(Decimal::from(*i)),
            Watermark::Float(f) => Decimal::from_f64(*f),
            Watermark::Decimal(d) => Some(*d),
            _ => None,
        }
    }
}

impl PartialEq for Watermark {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Watermark {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use Watermark as W;
        match (self, other) {
            (W::Int(a), W::Int(b)) => Some(a.cmp(b)),
            (W::Float(a), W::Float(b)) => a.partial_cmp(b),
            (W::Int(a), W::Float(b)) => cmp_int_float(*a, *b),
            (W::Float(a), W::Int(b)) => cmp_int_float(*b, *a).map(Ordering::reverse),
            (W::Decimal(_), W::Int(_) | W::Float(_) | W::Decimal(_))
            | (W::Int(_) | W::Float(_), W::Decimal(_)) => {
                let (a, b) = (self.as_decimal()?, other.as_decimal()?);
                Some(a.cmp(&b))
            }
            (W::Timestamp(a), W::Timestamp(b)) => Some(a.cmp(b)),
            (W::Text(a), W::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Exact comparison; casting the integer to `f64` loses precision above 2^53.
fn cmp_int_float(a: i64, b: f64) -> Option<Ordering> {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if b.is_nan() {
        return None;
    }
    if b >= TWO_POW_63 {
        return Some(Ordering::Less);
    }
    if b < -TWO_POW_63 {
        return Some(Ordering::Greater);
    }
    let whole = b.trunc();
    match a.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&b),
        other => Some(other),
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watermark::Int(i) => write!(f, "{i}"),
            Watermark::Float(v) => write!(f, "{v}"),
            Watermark::Decimal(d) => write!(f, "{d}"),
            Watermark::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Watermark::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Watermark {
    fn from(v: i64) -> Self {
        Watermark::Int(v)
    }
}

impl From<DateTime<Utc>> for Watermark {
    fn from(v: DateTime<Utc>) -> Self {
        Watermark::Timestamp(v)
    }
}

impl From<&str> for Watermark {
    fn from(v: &str) -> Self {
        Watermark::Text(v.to_string())
    }
}
