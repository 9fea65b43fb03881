//! Dynamically typed field values.
//!
//! A [`Value`] is what a document stores for each field and what import and
//! export pipelines exchange with the outside world. Scalars are plain data;
//! lists, maps and documents are shared handles so that mutation through any
//! path stays visible to every owner.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::container::{List, Map};
use crate::document::Document;

/// The external mapping representation: field name to value, in insertion order.
pub type Record = IndexMap<String, Value>;

/// Payload for value kinds that live outside this crate.
///
/// Field types built on the public contract (storage identifiers and the like)
/// wrap their values in a `CustomValue` and validate them with a
/// [`FieldValidator`](crate::field::FieldValidator).
pub trait CustomValue: fmt::Debug {
    /// Short name used in diagnostics
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    /// Structural equality against another custom payload
    fn eq_value(&self, other: &dyn CustomValue) -> bool;

    /// JSON rendering used by [`Value::to_json`]
    fn to_json(&self) -> serde_json::Value;
}

/// A field value.
///
/// `Null` stands for "absent": imports skip it, exports omit it and
/// validation treats it as not set.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    List(List),
    Map(Map),
    Document(Document),
    Custom(Rc<dyn CustomValue>),
}

impl Value {
    /// Get the type name as a string for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Document(_) => "document",
            Value::Custom(c) => c.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Downcast a custom payload to its concrete type.
    pub fn as_custom<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Custom(c) => c.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Deep copy of containers with no owner links; documents stay shared.
    pub fn detached(&self) -> Value {
        match self {
            Value::List(l) => Value::List(l.to_vec().iter().map(Value::detached).collect()),
            Value::Map(m) => Value::Map(
                m.to_record()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.detached()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Build a value from JSON. Integral numbers become `Int`, other numbers
    /// `Float`; arrays and objects become detached containers.
    pub fn from_json(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::List(arr.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(obj) => Value::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON. Date-times render as RFC 3339, documents as objects
    /// of their stored values.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number(serde_json::Number::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Value::List(l) => serde_json::Value::Array(l.to_vec().iter().map(Value::to_json).collect()),
            Value::Map(m) => record_to_json(&m.to_record()),
            Value::Document(d) => record_to_json(&d.stored_values()),
            Value::Custom(c) => c.to_json(),
        }
    }
}

/// Build a record from a JSON object; anything else yields an empty record.
pub fn record_from_json(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(obj) => obj
            .into_iter()
            .map(|(k, v)| (k, Value::from_json(v)))
            .collect(),
        _ => Record::new(),
    }
}

/// Render a record as a JSON object.
pub fn record_to_json(record: &Record) -> serde_json::Value {
    let mut json_object = serde_json::Map::new();
    for (key, value) in record {
        json_object.insert(key.clone(), value.to_json());
    }
    serde_json::Value::Object(json_object)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            (Value::Custom(a), Value::Custom(b)) => a.eq_value(b.as_ref()),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "{b:?}"),
            Value::Int(i) => write!(f, "{i:?}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::DateTime(dt) => write!(f, "{dt:?}"),
            Value::List(l) => fmt::Debug::fmt(l, f),
            Value::Map(m) => fmt::Debug::fmt(m, f),
            Value::Document(d) => fmt::Debug::fmt(d, f),
            Value::Custom(c) => fmt::Debug::fmt(c, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<List> for Value {
    fn from(l: List) -> Self {
        Value::List(l)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

impl From<Document> for Value {
    fn from(d: Document) -> Self {
        Value::Document(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(List::from(items))
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Map(Map::from(record))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
