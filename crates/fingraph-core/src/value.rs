//! Typed property values and the column coercions that produce them.
//!
//! Every cell read from a tabular source is text. A [`Coercion`] turns that
//! text into a [`PropertyValue`]; the same rules apply to key columns and to
//! ordinary mapped columns. Empty cells are *absent* rather than errors, so a
//! coercion returns `Ok(None)` for them and the caller decides whether absence
//! is acceptable (it is not for keys).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A property value as written to the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
}

impl PropertyValue {
    /// Name of the value's type, as used in diagnostics and introspection.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "string",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Float(_) => "float",
            PropertyValue::Date(_) => "date",
            PropertyValue::DateTime(_) => "datetime",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{s}"),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Float(x) => write!(f, "{x}"),
            PropertyValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            PropertyValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

/// A value usable as a node identity.
///
/// Floats are excluded: merge-by-key needs exact equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    Integer(i64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
}

impl NodeKey {
    /// Convert a coerced value into a key, rejecting floats.
    pub fn from_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Integer(i) => Some(NodeKey::Integer(i)),
            PropertyValue::String(s) => Some(NodeKey::String(s)),
            PropertyValue::Date(d) => Some(NodeKey::Date(d)),
            PropertyValue::DateTime(dt) => Some(NodeKey::DateTime(dt)),
            PropertyValue::Float(_) => None,
        }
    }
}

impl From<NodeKey> for PropertyValue {
    fn from(key: NodeKey) -> Self {
        match key {
            NodeKey::Integer(i) => PropertyValue::Integer(i),
            NodeKey::String(s) => PropertyValue::String(s),
            NodeKey::Date(d) => PropertyValue::Date(d),
            NodeKey::DateTime(dt) => PropertyValue::DateTime(dt),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        PropertyValue::from(self.clone()).fmt(f)
    }
}

/// How a source column is converted into a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Coercion {
    /// Keep the text as-is.
    #[default]
    #[serde(alias = "identity")]
    String,
    /// Base-10 integer; finite float text is truncated toward zero.
    Integer,
    /// Finite 64-bit float.
    Float,
    /// Calendar date, `YYYY-MM-DD`.
    Date,
    /// Timestamp, RFC 3339 or a naive `YYYY-MM-DD[T ]HH:MM:SS` read as UTC.
    DateTime,
}

/// A cell that does not satisfy its declared coercion.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot coerce {value:?} to {coercion}")]
pub struct CoercionError {
    pub coercion: Coercion,
    pub value: String,
}

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

impl Coercion {
    /// Apply the coercion to one raw cell.
    ///
    /// Returns `Ok(None)` for an empty (after trimming) cell.
    pub fn apply(self, raw: &str) -> Result<Option<PropertyValue>, CoercionError> {
        let text = raw.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let value = match self {
            Coercion::String => Some(PropertyValue::String(text.to_string())),
            Coercion::Integer => parse_integer(text).map(PropertyValue::Integer),
            Coercion::Float => text
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(PropertyValue::Float),
            Coercion::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(PropertyValue::Date),
            Coercion::DateTime => parse_datetime(text).map(PropertyValue::DateTime),
        };

        value.map(Some).ok_or_else(|| CoercionError {
            coercion: self,
            value: text.to_string(),
        })
    }

    /// Whether values of this coercion can identify a node.
    pub fn is_key_compatible(self) -> bool {
        !matches!(self, Coercion::Float)
    }
}

impl fmt::Display for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Coercion::String => "string",
            Coercion::Integer => "integer",
            Coercion::Float => "float",
            Coercion::Date => "date",
            Coercion::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(i);
    }
    let f = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
    let truncated = f.trunc();
    if truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
        Some(truncated as i64)
    } else {
        None
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    NAIVE_DATETIME_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(text, format)
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}
