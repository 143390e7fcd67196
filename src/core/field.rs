//! Field value types, declared field metadata and Rust type mapping

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// A polymorphic field value that can hold different types
///
/// Serialized with its variant as a tag (`{"type": "uuid", "value": "..."}`)
/// so UUIDs and timestamps do not come back as plain strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Null,
}

impl FieldValue {
    /// Get the value as a string if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer if possible
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a UUID if possible
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            FieldValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Whether this is the zero value of its type (`""`, `0`, `false`, nil UUID, epoch)
    pub fn is_default(&self) -> bool {
        match self {
            FieldValue::String(s) => s.is_empty(),
            FieldValue::Integer(i) => *i == 0,
            FieldValue::Float(f) => *f == 0.0,
            FieldValue::Boolean(b) => !b,
            FieldValue::Uuid(u) => u.is_nil(),
            FieldValue::DateTime(dt) => *dt == DateTime::<Utc>::default(),
            FieldValue::Null => true,
        }
    }

    /// Compare two values of compatible variants.
    ///
    /// Integers and floats compare numerically with each other. `Null` and
    /// mismatched variants are incomparable, which makes every comparison
    /// against them false.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::Integer(a), FieldValue::Float(b)) => (*a as f64).partial_cmp(b),
            (FieldValue::Float(a), FieldValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Some(a.cmp(b)),
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => Some(a.cmp(b)),
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Whether a value of this variant can be stored in a field of `kind`
    pub fn fits(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Null, _)
                | (FieldValue::String(_), FieldKind::Text)
                | (FieldValue::Integer(_), FieldKind::Integer | FieldKind::Float)
                | (FieldValue::Float(_), FieldKind::Float)
                | (FieldValue::Boolean(_), FieldKind::Boolean)
                | (FieldValue::Uuid(_), FieldKind::Uuid)
                | (FieldValue::DateTime(_), FieldKind::Timestamp)
        )
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "'{}'", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Uuid(u) => write!(f, "{}", u),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

/// Storage-independent kind of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    Uuid,
    Timestamp,
}

/// How free-text search compares a converted token with a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    /// Substring match, text only
    Contains,
    /// Exact equality
    Equals,
    /// Ordering comparison equal to zero
    CompareTo,
}

impl FieldKind {
    /// Convert a search token to a value of this kind, `None` when it does not parse
    pub fn parse(self, token: &str) -> Option<FieldValue> {
        let token = token.trim();
        match self {
            FieldKind::Text => Some(FieldValue::String(token.to_string())),
            FieldKind::Integer => token.parse::<i64>().ok().map(FieldValue::Integer),
            FieldKind::Float => token
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(FieldValue::Float),
            FieldKind::Boolean => {
                if token.eq_ignore_ascii_case("true") {
                    Some(FieldValue::Boolean(true))
                } else if token.eq_ignore_ascii_case("false") {
                    Some(FieldValue::Boolean(false))
                } else {
                    None
                }
            }
            FieldKind::Uuid => Uuid::parse_str(token).ok().map(FieldValue::Uuid),
            FieldKind::Timestamp => parse_timestamp(token).map(FieldValue::DateTime),
        }
    }

    /// First applicable comparison for this kind: Contains, then Equals, then CompareTo
    pub fn search_method(self) -> SearchMethod {
        match self {
            FieldKind::Text => SearchMethod::Contains,
            FieldKind::Integer | FieldKind::Boolean | FieldKind::Uuid => SearchMethod::Equals,
            FieldKind::Float | FieldKind::Timestamp => SearchMethod::CompareTo,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Uuid => "uuid",
            FieldKind::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC)
pub fn parse_timestamp(token: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// A declared entity property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub max_length: Option<u32>,
}

impl FieldDef {
    /// Describe a field from its Rust type
    pub const fn of<T: FieldType>(name: &'static str) -> Self {
        Self {
            name,
            kind: T::KIND,
            nullable: T::NULLABLE,
            max_length: None,
        }
    }

    pub const fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Non-nullable scalars order totally; nullable ones do not
    pub fn is_directly_comparable(&self) -> bool {
        !self.nullable
    }
}

/// Mapping between a Rust field type and [`FieldValue`]
pub trait FieldType: Sized {
    const KIND: FieldKind;
    const NULLABLE: bool = false;

    fn to_field_value(&self) -> FieldValue;

    fn from_field_value(value: FieldValue) -> Option<Self>;
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::String(self.clone())
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FieldType for i64 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Integer(*self)
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        value.as_integer()
    }
}

impl FieldType for i32 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Integer(i64::from(*self))
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        value.as_integer().and_then(|i| i32::try_from(i).ok())
    }
}

impl FieldType for f64 {
    const KIND: FieldKind = FieldKind::Float;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Float(*self)
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Float(f) => Some(f),
            FieldValue::Integer(i) => Some(i as f64),
            _ => None,
        }
    }
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Boolean;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Boolean(*self)
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Boolean(b) => Some(b),
            FieldValue::Integer(i) => Some(i != 0),
            _ => None,
        }
    }
}

impl FieldType for Uuid {
    const KIND: FieldKind = FieldKind::Uuid;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Uuid(*self)
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Uuid(u) => Some(u),
            FieldValue::String(s) => Uuid::parse_str(&s).ok(),
            _ => None,
        }
    }
}

impl FieldType for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Timestamp;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::DateTime(*self)
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::DateTime(dt) => Some(dt),
            FieldValue::String(s) => parse_timestamp(&s),
            _ => None,
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_field_value(&self) -> FieldValue {
        match self {
            Some(v) => v.to_field_value(),
            None => FieldValue::Null,
        }
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(None),
            other => T::from_field_value(other).map(Some),
        }
    }
}
