//! Attribute value types for documents.
//!
//! The [`Value`] enum is the currency of the host layer: document attributes,
//! filter operands, and projected `values_list` rows are all `Value`s. It
//! converts losslessly to and from [`Bson`], the representation the storage
//! driver speaks. Stored values with no natural `Value` counterpart, such as
//! timestamps, decimals, and typed binaries, are carried as [`Value::Bson`]
//! and written back unchanged.

use std::collections::BTreeMap;
use std::fmt;

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson};
use chrono::{DateTime, Utc};
use mongom2m_core::{M2MError, M2MResult};

/// A storage-agnostic representation of a document attribute.
///
/// # Examples
///
/// ```
/// use mongom2m::value::Value;
///
/// let v = Value::from(42_i64);
/// assert_eq!(v, Value::Int(42));
///
/// let v = Value::from("hello");
/// assert_eq!(v, Value::String("hello".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing / null.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw binary data.
    Bytes(Vec<u8>),
    /// A UTC timestamp.
    DateTime(DateTime<Utc>),
    /// A document identifier.
    ObjectId(ObjectId),
    /// A list of values.
    List(Vec<Value>),
    /// An embedded document, keyed by column name.
    Map(BTreeMap<String, Value>),
    /// A stored value kept in its storage form.
    Bson(Bson),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "None"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::ObjectId(oid) => write!(f, "{oid}"),
            Self::List(vals) => {
                write!(f, "[")?;
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Self::Bson(raw) => write!(f, "{raw}"),
        }
    }
}

// ── From implementations ───────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Self::ObjectId(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ── BSON conversion ────────────────────────────────────────────────────

impl From<Value> for Bson {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(b),
            Value::Int(i) => Self::Int64(i),
            Value::Float(f) => Self::Double(f),
            Value::String(s) => Self::String(s),
            Value::Bytes(bytes) => Self::Binary(Binary {
                subtype: BinarySubtype::Generic,
                bytes,
            }),
            Value::DateTime(dt) => Self::DateTime(bson::DateTime::from_millis(dt.timestamp_millis())),
            Value::ObjectId(oid) => Self::ObjectId(oid),
            Value::List(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Map(map) => {
                let mut doc = bson::Document::new();
                for (k, v) in map {
                    doc.insert(k, Self::from(v));
                }
                Self::Document(doc)
            }
            Value::Bson(raw) => raw,
        }
    }
}

impl From<Bson> for Value {
    fn from(value: Bson) -> Self {
        match value {
            Bson::Null => Self::Null,
            Bson::Boolean(b) => Self::Bool(b),
            Bson::Int32(i) => Self::Int(i64::from(i)),
            Bson::Int64(i) => Self::Int(i),
            Bson::Double(f) => Self::Float(f),
            Bson::String(s) => Self::String(s),
            Bson::Binary(bin) if bin.subtype == BinarySubtype::Generic => Self::Bytes(bin.bytes),
            Bson::DateTime(dt) => DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis())
                .map_or(Self::Bson(Bson::DateTime(dt)), Self::DateTime),
            Bson::ObjectId(oid) => Self::ObjectId(oid),
            Bson::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Bson::Document(doc) => Self::Map(map_from_document(doc)),
            other => Self::Bson(other),
        }
    }
}

/// Converts a BSON document into a column-keyed map.
pub fn map_from_document(doc: bson::Document) -> BTreeMap<String, Value> {
    doc.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
}

// ── Accessors ──────────────────────────────────────────────────────────

impl Value {
    /// Returns `true` if this value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to extract a boolean value.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integer value.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to extract a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract an object id (without coercion).
    pub const fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Self::ObjectId(oid) => Some(*oid),
            _ => None,
        }
    }

    /// Attempts to extract an embedded map.
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

/// Coerces an identifier-shaped value into the canonical [`ObjectId`].
///
/// Accepts object ids, their 24-character hex form, and the raw 12-byte form.
///
/// # Examples
///
/// ```
/// use mongom2m::value::{coerce_object_id, Value};
///
/// let oid = coerce_object_id(&Value::from("64b7f0c2a1b2c3d4e5f60718")).unwrap();
/// assert_eq!(oid.to_hex(), "64b7f0c2a1b2c3d4e5f60718");
/// assert!(coerce_object_id(&Value::Int(7)).is_err());
/// ```
pub fn coerce_object_id(value: &Value) -> M2MResult<ObjectId> {
    match value {
        Value::ObjectId(oid) => Ok(*oid),
        Value::String(s) => parse_object_id(s),
        Value::Bytes(bytes) => <[u8; 12]>::try_from(bytes.as_slice())
            .map(ObjectId::from_bytes)
            .map_err(|_| M2MError::InvalidId(format!("<{} bytes>", bytes.len()))),
        other => Err(M2MError::InvalidId(other.to_string())),
    }
}

/// Parses the hex form of an object id.
pub fn parse_object_id(s: &str) -> M2MResult<ObjectId> {
    ObjectId::parse_str(s.trim()).map_err(|e| M2MError::InvalidId(format!("'{s}': {e}")))
}
