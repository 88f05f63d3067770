//! Points and their InfluxDB line protocol rendering.
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_s
//! ```
//!
//! Timestamps are written with second precision; the write endpoint is called
//! with `precision=s`.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use std::collections::BTreeMap;
use std::fmt;

/// A value that can be stored in a point field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    String(String),
    Boolean(bool),
    /// Stored as an RFC 3339 string.
    Timestamp(DateTime<FixedOffset>),
}

impl FieldValue {
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::String(v) => quote_string(v),
            FieldValue::Boolean(v) => v.to_string(),
            FieldValue::Timestamp(t) => {
                quote_string(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub timestamp: DateTime<FixedOffset>,
    pub tags: BTreeMap<String, String>,
    pub fields: Vec<(String, FieldValue)>,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<FixedOffset>) -> Self {
        Point {
            measurement: measurement.into(),
            timestamp,
            tags: BTreeMap::new(),
            fields: Vec::new(),
        }
    }

    pub fn add_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.push((key.into(), value));
    }

    #[cfg(test)]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Render as a single line. Tags come out sorted by key, fields in insertion order.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape_measurement(&self.measurement);

        // Empty tag values are not allowed by InfluxDB
        for (key, value) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&value.to_line_protocol());
        }

        line.push(' ');
        line.push_str(&self.timestamp.timestamp().to_string());
        line
    }
}

fn quote_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Commas and spaces must be escaped in measurement names.
fn escape_measurement(s: &str) -> String {
    escape_line_breaks(&s.replace(',', "\\,").replace(' ', "\\ "))
}

/// Tag keys, tag values and field keys share the same escaping rules.
fn escape_key(s: &str) -> String {
    escape_line_breaks(
        &s.replace(',', "\\,")
            .replace('=', "\\=")
            .replace(' ', "\\ "),
    )
}

/// A raw line break would end the line and start another point.
fn escape_line_breaks(s: &str) -> String {
    s.replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}
