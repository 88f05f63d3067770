use crate::error::{DateError, TranscodeError};
use crate::influx::PointWriter;
use crate::line_protocol::{FieldValue, Point};
use crate::payload::{DataRecord, Metric};
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const MEASUREMENT_PREFIX: &str = "apple_health_";
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

const DATE_FIELD: &str = "date";
const SLEEP_ANALYSIS: &str = "sleep_analysis";
const SLEEP_DATE_FIELDS: [&str; 4] = ["inBedEnd", "inBedStart", "sleepStart", "sleepEnd"];

/// Turns metrics into points and hands them to a [`PointWriter`].
pub struct Transcoder {
    writer: Arc<dyn PointWriter>,
}

impl Transcoder {
    pub fn new(writer: Arc<dyn PointWriter>) -> Self {
        Transcoder { writer }
    }

    /// Writes one point per dated record, in order. Stops at the first failing record;
    /// points written before it stay written. Returns the number of points written.
    pub async fn process(&self, metric: &Metric) -> Result<usize, TranscodeError> {
        if metric.data.is_empty() {
            return Ok(0);
        }

        info!(metric = %metric.name, records = metric.data.len(), "Processing metric");

        let mut written = 0;
        for record in &metric.data {
            if self.parse_data_point(metric, record).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Returns whether a point was written.
    pub async fn parse_data_point(
        &self,
        metric: &Metric,
        record: &DataRecord,
    ) -> Result<bool, TranscodeError> {
        let point = match build_point(metric, record)? {
            Some(p) => p,
            None => return Ok(false),
        };
        self.writer.write_point(&point).await?;
        Ok(true)
    }
}

/// Builds the point for a record. `None` when the record has no `date`.
pub fn build_point(metric: &Metric, record: &DataRecord) -> Result<Option<Point>, TranscodeError> {
    let date = match record.get(DATE_FIELD) {
        Some(d) => d,
        None => return Ok(None),
    };
    let timestamp = parse_date(DATE_FIELD, date)?;

    let mut point = Point::new(format!("{}{}", MEASUREMENT_PREFIX, metric.name), timestamp)
        .add_tag("units", metric.units.as_str());

    let is_sleep = metric.name == SLEEP_ANALYSIS;
    for (key, value) in record {
        if key == DATE_FIELD {
            continue;
        }
        if is_sleep && SLEEP_DATE_FIELDS.contains(&key.as_str()) {
            point.add_field(key.as_str(), FieldValue::Timestamp(parse_date(key, value)?));
            continue;
        }
        if let Some(field) = field_value(value) {
            point.add_field(key.as_str(), field);
        }
    }

    // A line without fields is refused by the store, so fail before writing
    if point.fields.is_empty() {
        return Err(TranscodeError::NoFields {
            date: timestamp.to_rfc3339(),
        });
    }
    Ok(Some(point))
}

/// Parses `YYYY-MM-DD HH:MM:SS ±ZZZZ`, keeping the record's UTC offset.
pub fn parse_date(field: &str, value: &Value) -> Result<DateTime<FixedOffset>, TranscodeError> {
    let s = value.as_str().ok_or_else(|| TranscodeError::DateNotString {
        field: field.to_string(),
    })?;
    parse_strict(s).map_err(|source| TranscodeError::InvalidDate {
        field: field.to_string(),
        value: s.to_string(),
        source,
    })
}

// chrono accepts single-digit fields, `+hh:mm` offsets and leap seconds; the
// export layout has none of these, so the shape is checked before parsing.
fn parse_strict(s: &str) -> Result<DateTime<FixedOffset>, DateError> {
    if !has_export_layout(s.as_bytes()) {
        return Err(DateError::Layout);
    }
    Ok(DateTime::parse_from_str(s, DATE_FORMAT)?)
}

fn has_export_layout(b: &[u8]) -> bool {
    const LAYOUT: &[u8; 25] = b"dddd-dd-dd dd:dd:dd sdddd";
    b.len() == LAYOUT.len()
        && LAYOUT.iter().zip(b).all(|(want, got)| match want {
            b'd' => got.is_ascii_digit(),
            b's' => *got == b'+' || *got == b'-',
            _ => want == got,
        })
        && b[17] <= b'5'
}

/// JSON numbers always become floats so a field keeps one type across samples.
/// `null` has no representation and is dropped; nested values are stored as JSON text.
pub fn field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(FieldValue::Boolean(*b)),
        Value::Number(n) => n.as_f64().map(FieldValue::Float),
        Value::String(s) => Some(FieldValue::String(s.clone())),
        Value::Array(_) | Value::Object(_) => Some(FieldValue::String(value.to_string())),
    }
}
