//! 12-byte storage-engine object identifiers.
//!
//! Layout: 4-byte big-endian creation time in seconds, 5 bytes unique to the
//! process, 3-byte big-endian counter starting at a random value.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use swissarmyhammer_documents::{format_field, CustomValue, Field, FieldValidator, Filter, Value};

use crate::error::{Result, StorageError};

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

const COUNTER_MASK: u32 = 0x00ff_ffff;

fn next_counter() -> u32 {
    COUNTER
        .get_or_init(|| AtomicU32::new(rand::random::<u32>() & COUNTER_MASK))
        .fetch_add(1, Ordering::Relaxed)
        & COUNTER_MASK
}

/// A storage-engine object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generate a new id for the current time.
    pub fn new() -> Self {
        let seconds = Utc::now().timestamp() as u32;
        let counter = next_counter();
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(PROCESS_UNIQUE.get_or_init(rand::random));
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Creation time encoded in the first four bytes.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let seconds = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        DateTime::from_timestamp(i64::from(seconds), 0).unwrap_or_default()
    }

    /// Lowercase hex rendering, 24 characters.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse 24 hex characters, either case.
    pub fn parse_str(input: &str) -> Result<Self> {
        let invalid = |reason: &str| StorageError::InvalidObjectId {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        if input.len() != 24 || !input.is_ascii() {
            return Err(invalid("expected 24 hex characters"));
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&input[i * 2..i * 2 + 2], 16)
                .map_err(|_| invalid("not a hex string"))?;
        }
        Ok(Self(bytes))
    }

    /// The id stored in `value`, if it holds one.
    pub fn from_value(value: &Value) -> Option<ObjectId> {
        value.as_custom::<ObjectId>().copied()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl CustomValue for ObjectId {
    fn type_name(&self) -> &'static str {
        "object-id"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_value(&self, other: &dyn CustomValue) -> bool {
        other.as_any().downcast_ref::<ObjectId>() == Some(self)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::String(self.to_hex())
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Custom(Rc::new(id))
    }
}

/// Accepts only [`ObjectId`] values; hex strings are not ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectIdValidator;

impl FieldValidator for ObjectIdValidator {
    fn kind_name(&self) -> &str {
        "object-id"
    }

    fn validate(&self, value: &Value) -> bool {
        ObjectId::from_value(value).is_some()
    }
}

/// A field holding an [`ObjectId`].
pub fn object_id_field() -> Field {
    Field::custom(Rc::new(ObjectIdValidator))
}

/// Import filter turning the hex string under `name` into an [`ObjectId`].
/// Anything that does not parse is passed through for validation to reject.
pub fn parse_object_id(name: impl Into<String>) -> Filter {
    format_field(name, |value| {
        match value.as_str().and_then(|s| ObjectId::parse_str(s).ok()) {
            Some(id) => id.into(),
            None => value,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let id = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(id.to_hex(), "507f1f77bcf86cd799439011");
        assert_eq!(id.to_string(), id.to_hex());
        assert_eq!("507F1F77BCF86CD799439011".parse::<ObjectId>().unwrap(), id);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(ObjectId::parse_str("507f1f77").is_err());
        assert!(ObjectId::parse_str("zz7f1f77bcf86cd799439011").is_err());
        assert!(ObjectId::parse_str("é07f1f77bcf86cd79943901").is_err());
    }

    #[test]
    fn generated_ids_are_unique_and_timestamped() {
        let before = Utc::now().timestamp();
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert_eq!(a.bytes()[4..9], b.bytes()[4..9]);
        assert!(a.timestamp().timestamp() >= before - 1);
    }

    #[test]
    fn custom_value_contract() {
        let id = ObjectId::new();
        let value = Value::from(id);
        assert_eq!(ObjectId::from_value(&value), Some(id));
        assert_eq!(value, Value::from(id));
        assert_ne!(value, Value::from(ObjectId::new()));
        assert_eq!(value.to_json(), serde_json::Value::String(id.to_hex()));
    }

    #[test]
    fn validator_accepts_only_ids() {
        let field = object_id_field();
        assert_eq!(field.kind().name(), "object-id");
        assert!(field.validate(&Value::from(ObjectId::new())));
        assert!(!field.validate(&Value::from("507f1f77bcf86cd799439011")));
    }
}
