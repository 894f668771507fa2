//! Value type system and storage coercion.
//!
//! `Value` is the engine's typed value enum: every attribute read from or
//! written to a backend passes through it. The coercion functions in this
//! module map between an attribute's typed value and its wire/storage
//! representation according to the attribute's [`StorageMode`]:
//!
//! - **Native** - pass-through, the adapter binds the vendor type
//! - **JsonEncoded** - compact JSON text in an otherwise plain text column
//! - **Clob** - pass-through long text, bound as a CLOB parameter
//! - **DateAsString** - fixed-width `YYYY-MM-DD HH:MM:SS` text

use crate::metadata::{AttributeInfo, ExtendedPropertyDefinition, StorageMode};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Fixed-width format used by `StorageMode::DateAsString` in both directions.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Declared kind of an attribute or extended property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Integer,
    Decimal,
    Double,
    DateTime,
    Text,
    Json,
    Bytes,
}

/// A typed value travelling between objects and the execution adapter.
///
/// Value equality (`PartialEq`) is what the dirty-state tracker uses to
/// decide whether an attribute changed between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Double(f64),
    DateTime(NaiveDateTime),
    Text(String),
    Json(JsonValue),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The kind this value carries, or `None` for `Null`.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Integer),
            Value::Decimal(_) => Some(ValueKind::Decimal),
            Value::Double(_) => Some(ValueKind::Double),
            Value::DateTime(_) => Some(ValueKind::DateTime),
            Value::Text(_) => Some(ValueKind::Text),
            Value::Json(_) => Some(ValueKind::Json),
            Value::Bytes(_) => Some(ValueKind::Bytes),
        }
    }

    /// Extract as text, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Extract as a signed integer where the representation allows it.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Extract as a float for score-like columns.
    pub fn as_f64(&self) -> Option<f64> {
        use rust_decimal::prelude::ToPrimitive;
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATE_TIME_FORMAT)),
            Value::Text(s) => write!(f, "{s}"),
            Value::Json(j) => write!(f, "{j}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// How a parameter should be bound by the execution adapter.
///
/// The statement text never carries literal values; vendor-specific binding
/// behavior (fixed-length identifier comparison, CLOB streaming, the Unicode
/// text marker some engines require for full-text conditions) is expressed
/// here instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    Standard,
    /// Fixed-length character binding for identifier-like attributes.
    FixedChar,
    /// Long text / CLOB binding.
    LongText,
    /// Unicode text binding (`N'...'` semantics) for full-text conditions.
    UnicodeText,
}

/// A named, typed bind value of a [`BuiltStatement`](crate::BuiltStatement).
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub bind: BindKind,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            bind: BindKind::Standard,
        }
    }

    pub fn with_bind(name: impl Into<String>, value: Value, bind: BindKind) -> Self {
        Self {
            name: name.into(),
            value,
            bind,
        }
    }
}

/// Error produced when a single value cannot be coerced to or from its
/// storage representation. Read-side failures are attached per attribute to
/// the materialized object; they never abort the rest of the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoercionError {
    /// JSON serialization or parsing failed.
    Json(String),
    /// A date-as-string column held text that does not match the fixed format.
    DateFormat(String),
    /// The value's kind does not fit the declared storage mode or kind.
    KindMismatch {
        expected: ValueKind,
        actual: &'static str,
    },
}

impl fmt::Display for CoercionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoercionError::Json(msg) => write!(f, "JSON coercion failed: {msg}"),
            CoercionError::DateFormat(input) => {
                write!(f, "date string does not match {DATE_TIME_FORMAT}: {input:?}")
            }
            CoercionError::KindMismatch { expected, actual } => {
                write!(f, "expected a {expected:?} value, got {actual}")
            }
        }
    }
}

impl std::error::Error for CoercionError {}

fn variant_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Int(_) => "Int",
        Value::Decimal(_) => "Decimal",
        Value::Double(_) => "Double",
        Value::DateTime(_) => "DateTime",
        Value::Text(_) => "Text",
        Value::Json(_) => "Json",
        Value::Bytes(_) => "Bytes",
    }
}

/// Generate an opaque 32-hex-character identifier.
///
/// Callers must treat these as opaque fixed-length strings; the engine only
/// promises the length and the character set.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Resolve the bind kind for a standard attribute.
///
/// Identifier-like attributes (name ends in the conventional `ID` suffix, or
/// declared max length 32) bind as fixed-length strings regardless of kind so
/// comparisons stay index-friendly across vendors. CLOB storage binds as long
/// text.
pub fn bind_kind_for(attribute: &AttributeInfo) -> BindKind {
    if attribute.storage == StorageMode::Clob {
        BindKind::LongText
    } else if attribute.name.ends_with("ID") || attribute.max_length == Some(32) {
        BindKind::FixedChar
    } else {
        BindKind::Standard
    }
}

/// Coerce a typed attribute value into its storage representation.
pub fn encode_attribute(attribute: &AttributeInfo, value: &Value) -> Result<Value, CoercionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match attribute.storage {
        StorageMode::Native | StorageMode::Clob => Ok(value.clone()),
        StorageMode::JsonEncoded => {
            let json = value_to_json(value)?;
            let text = serde_json::to_string(&json).map_err(|e| CoercionError::Json(e.to_string()))?;
            Ok(Value::Text(text))
        }
        StorageMode::DateAsString => match value {
            Value::DateTime(dt) => Ok(Value::Text(dt.format(DATE_TIME_FORMAT).to_string())),
            other => Err(CoercionError::KindMismatch {
                expected: ValueKind::DateTime,
                actual: variant_name(other),
            }),
        },
    }
}

/// Coerce a storage representation back into the attribute's declared kind.
pub fn decode_attribute(attribute: &AttributeInfo, wire: &Value) -> Result<Value, CoercionError> {
    if wire.is_null() {
        return Ok(Value::Null);
    }
    match attribute.storage {
        StorageMode::Native | StorageMode::Clob => Ok(wire.clone()),
        StorageMode::JsonEncoded => {
            let json = match wire {
                Value::Text(text) => {
                    serde_json::from_str(text).map_err(|e| CoercionError::Json(e.to_string()))?
                }
                // Some adapters hand JSON columns back already parsed.
                Value::Json(j) => j.clone(),
                other => {
                    return Err(CoercionError::KindMismatch {
                        expected: ValueKind::Json,
                        actual: variant_name(other),
                    })
                }
            };
            json_to_kind(attribute.kind, json)
        }
        StorageMode::DateAsString => match wire {
            Value::Text(text) => NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT)
                .map(Value::DateTime)
                .map_err(|_| CoercionError::DateFormat(text.clone())),
            Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
            other => Err(CoercionError::KindMismatch {
                expected: ValueKind::DateTime,
                actual: variant_name(other),
            }),
        },
    }
}

/// Coerce an extended-property value for the write direction.
///
/// The side table stores every kind natively; this only validates the kind
/// fits the declaration (accepting integers for Bool columns, the common
/// relational representation).
pub fn encode_property(
    property: &ExtendedPropertyDefinition,
    value: &Value,
) -> Result<Value, CoercionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let ok = match (property.kind, value) {
        (ValueKind::Bool, Value::Bool(_) | Value::Int(_)) => true,
        (ValueKind::Integer, Value::Int(_)) => true,
        (ValueKind::Decimal, Value::Decimal(_) | Value::Int(_)) => true,
        (ValueKind::DateTime, Value::DateTime(_)) => true,
        (ValueKind::Text, Value::Text(_)) => true,
        _ => false,
    };
    if ok {
        Ok(value.clone())
    } else {
        Err(CoercionError::KindMismatch {
            expected: property.kind,
            actual: variant_name(value),
        })
    }
}

/// Coerce an extended-property value read from the side table.
pub fn decode_property(
    property: &ExtendedPropertyDefinition,
    wire: &Value,
) -> Result<Value, CoercionError> {
    match (property.kind, wire) {
        (_, Value::Null) => Ok(Value::Null),
        (ValueKind::Bool, Value::Bool(b)) => Ok(Value::Bool(*b)),
        (ValueKind::Bool, Value::Int(i)) => Ok(Value::Bool(*i != 0)),
        (ValueKind::Integer, Value::Int(i)) => Ok(Value::Int(*i)),
        (ValueKind::Decimal, Value::Decimal(d)) => Ok(Value::Decimal(*d)),
        (ValueKind::Decimal, Value::Int(i)) => Ok(Value::Decimal(Decimal::from(*i))),
        (ValueKind::DateTime, Value::DateTime(dt)) => Ok(Value::DateTime(*dt)),
        (ValueKind::DateTime, Value::Text(s)) => NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT)
            .map(Value::DateTime)
            .map_err(|_| CoercionError::DateFormat(s.clone())),
        (ValueKind::Text, Value::Text(s)) => Ok(Value::Text(s.clone())),
        (expected, other) => Err(CoercionError::KindMismatch {
            expected,
            actual: variant_name(other),
        }),
    }
}

fn value_to_json(value: &Value) -> Result<JsonValue, CoercionError> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Bool(b) => Ok(JsonValue::Bool(*b)),
        Value::Int(i) => Ok(JsonValue::from(*i)),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(JsonValue::Number)
            .ok_or_else(|| CoercionError::Json("non-finite double".to_string())),
        // Decimals travel as strings so precision survives the text round trip.
        Value::Decimal(d) => Ok(JsonValue::String(d.to_string())),
        Value::DateTime(dt) => Ok(JsonValue::String(dt.format(DATE_TIME_FORMAT).to_string())),
        Value::Text(s) => Ok(JsonValue::String(s.clone())),
        Value::Json(j) => Ok(j.clone()),
        Value::Bytes(_) => Err(CoercionError::KindMismatch {
            expected: ValueKind::Json,
            actual: "Bytes",
        }),
    }
}

fn json_to_kind(kind: ValueKind, json: JsonValue) -> Result<Value, CoercionError> {
    match kind {
        ValueKind::Json => Ok(Value::Json(json)),
        ValueKind::Text => match json {
            JsonValue::String(s) => Ok(Value::Text(s)),
            other => Err(CoercionError::Json(format!("expected a JSON string, got {other}"))),
        },
        ValueKind::Bool => json
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| CoercionError::Json("expected a JSON boolean".to_string())),
        ValueKind::Integer => json
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| CoercionError::Json("expected a JSON integer".to_string())),
        ValueKind::Double => json
            .as_f64()
            .map(Value::Double)
            .ok_or_else(|| CoercionError::Json("expected a JSON number".to_string())),
        ValueKind::Decimal => match &json {
            JsonValue::String(s) => Decimal::from_str(s)
                .map(Value::Decimal)
                .map_err(|e| CoercionError::Json(e.to_string())),
            JsonValue::Number(n) => n
                .as_f64()
                .and_then(|f| Decimal::try_from(f).ok())
                .map(Value::Decimal)
                .ok_or_else(|| CoercionError::Json("number does not fit a decimal".to_string())),
            other => Err(CoercionError::Json(format!("expected a JSON decimal, got {other}"))),
        },
        ValueKind::DateTime => match json {
            JsonValue::String(s) => NaiveDateTime::parse_from_str(&s, DATE_TIME_FORMAT)
                .map(Value::DateTime)
                .map_err(|_| CoercionError::DateFormat(s)),
            other => Err(CoercionError::Json(format!("expected a JSON date string, got {other}"))),
        },
        ValueKind::Bytes => Err(CoercionError::KindMismatch {
            expected: ValueKind::Bytes,
            actual: "Json",
        }),
    }
}
