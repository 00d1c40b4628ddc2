//! Watermark advancement after a delivered batch.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};

use delta_core::{CaptureConfig, Row, Watermark};

/// The computed candidate would have moved the watermark backwards, or is
/// not comparable with it. The current watermark is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkAnomaly {
    pub current: Watermark,
    pub candidate: Watermark,
}

impl fmt::Display for WatermarkAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.candidate.partial_cmp(&self.current) {
            Some(Ordering::Less) => write!(
                f,
                "candidate watermark {} is below current {}",
                self.candidate, self.current
            ),
            _ => write!(
                f,
                "candidate watermark {} ({}) is not comparable with current {} ({})",
                self.candidate,
                self.candidate.kind(),
                self.current,
                self.current.kind()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    pub watermark: Watermark,
    pub anomaly: Option<WatermarkAnomaly>,
}

/// Compute the watermark to commit after `rows` were delivered.
///
/// With a watermark column the candidate is the greatest present value of
/// that column. Values that cannot act as a cursor (null, json, binary) and
/// values of a different family than the running maximum are ignored. When
/// nothing usable remains, or no column is configured, `now` is used as an
/// opaque progress marker.
pub fn advance(
    capture: &CaptureConfig,
    current: Option<&Watermark>,
    rows: &[Row],
    now: DateTime<Utc>,
) -> Advance {
    let candidate = capture
        .watermark_column
        .as_deref()
        .and_then(|column| max_value(column, rows))
        .unwrap_or(Watermark::Timestamp(now));

    match current {
        None => Advance {
            watermark: candidate,
            anomaly: None,
        },
        Some(current) => match candidate.partial_cmp(current) {
            Some(Ordering::Greater | Ordering::Equal) => Advance {
                watermark: candidate,
                anomaly: None,
            },
            _ => Advance {
                watermark: current.clone(),
                anomaly: Some(WatermarkAnomaly {
                    current: current.clone(),
                    candidate,
                }),
            },
        },
    }
}

fn max_value(column: &str, rows: &[Row]) -> Option<Watermark> {
    let mut max: Option<Watermark> = None;
    for value in rows.iter().filter_map(|r| r.get(column)) {
        let Some(v) = Watermark::from_field(value) else {
            continue;
        };
        max = match max {
            None => Some(v),
            Some(m) => match v.partial_cmp(&m) {
                Some(Ordering::Greater) => Some(v),
                _ => Some(m),
            },
        };
    }
    max
}
