//! Topic records
//!
//! A record is the unit of data exchanged through the broker: a topic, a
//! timestamp, and a single typed value keyed by its type name on the wire.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Three-component vector value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Typed record payload
///
/// Serialized externally tagged, so the declared type name becomes the key:
/// `{"double": 1.5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordValue {
    Double(f64),
    Bool(bool),
    String(String),
    Int32(i32),
    StringList(Vec<String>),
    Vector3(Vector3),
    Json(serde_json::Value),
}

impl RecordValue {
    /// Declared type name as it appears on the wire
    pub fn type_name(&self) -> &'static str {
        match self {
            RecordValue::Double(_) => "double",
            RecordValue::Bool(_) => "bool",
            RecordValue::String(_) => "string",
            RecordValue::Int32(_) => "int32",
            RecordValue::StringList(_) => "stringList",
            RecordValue::Vector3(_) => "vector3",
            RecordValue::Json(_) => "json",
        }
    }
}

/// A single value published under a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Hierarchical topic key (e.g. "/room/a/temperature")
    pub topic: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Typed value
    #[serde(flatten)]
    pub value: RecordValue,
}

impl Record {
    /// Create a record stamped with the current wall-clock time
    pub fn new(topic: impl Into<String>, value: RecordValue) -> Self {
        Self::with_timestamp(topic, now_millis(), value)
    }

    /// Create a record with an explicit timestamp
    pub fn with_timestamp(topic: impl Into<String>, timestamp: u64, value: RecordValue) -> Self {
        Self {
            topic: topic.into(),
            timestamp,
            value,
        }
    }

    /// Encode the outbound `{topic, timestamp, <type>: value}` form
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_type_name_as_key() {
        let record = Record::with_timestamp("/room/a", 42, RecordValue::Double(1.5));
        let bytes = record.encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["topic"], "/room/a");
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["double"], 1.5);
    }

    #[test]
    fn test_encode_struct_value() {
        let value = RecordValue::Vector3(Vector3 {
            x: 1.0,
            y: 2.0,
            z: 3.0,
        });
        let record = Record::with_timestamp("/pose", 7, value);
        let json: serde_json::Value = serde_json::from_slice(&record.encode().unwrap()).unwrap();

        assert_eq!(json["vector3"]["y"], 2.0);
        assert_eq!(record.value.type_name(), "vector3");
    }

    #[test]
    fn test_decode_wire_form() {
        let record: Record =
            serde_json::from_str(r#"{"topic":"/flag","timestamp":1,"bool":true}"#).unwrap();

        assert_eq!(record.topic, "/flag");
        assert_eq!(record.value, RecordValue::Bool(true));
    }

    #[test]
    fn test_new_stamps_time() {
        let record = Record::new("/x", RecordValue::Int32(3));
        assert!(record.timestamp > 0);
    }
}
