//! The event record flowing through the pipeline and its wire contract.
//!
//! On the wire a record is a JSON object with exactly three integer fields,
//! `user_id`, `payment_id` and `deposit_amount`. Those names are fixed for
//! compatibility with any other consumer of the same queue.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Content type attached to every published record.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A single payment event.
///
/// `record_id` is the idempotency key: the primary store never holds two
/// rows with the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRecord {
    /// Originating entity.
    #[serde(rename = "user_id")]
    pub owner_id: i64,
    /// Globally unique record identifier.
    #[serde(rename = "payment_id")]
    pub record_id: i64,
    /// Payload value.
    #[serde(rename = "deposit_amount")]
    pub amount: i64,
}

impl EventRecord {
    /// Creates a record from its three fields.
    #[must_use]
    pub const fn new(owner_id: i64, record_id: i64, amount: i64) -> Self {
        Self {
            owner_id,
            record_id,
            amount,
        }
    }

    /// Serializes the record to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, SchemaError> {
        serde_json::to_vec(self).map_err(SchemaError::Encode)
    }

    /// Parses a record from its JSON wire form.
    ///
    /// All three fields must be present and integral; unknown fields are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Decode`] on malformed JSON, a missing field or
    /// a non-integer value.
    pub fn decode(payload: &[u8]) -> Result<Self, SchemaError> {
        serde_json::from_slice(payload).map_err(SchemaError::Decode)
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{owner={}, record={}, amount={}}}",
            self.owner_id, self.record_id, self.amount
        )
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn encode(record: &EventRecord) -> Vec<u8> {
        let Ok(bytes) = record.encode() else {
            panic!("encoding {record} failed");
        };
        bytes
    }

    #[test]
    fn encodes_with_wire_field_names() {
        let bytes = encode(&EventRecord::new(1, 42, 100));
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            panic!("encoded record is not JSON");
        };
        assert_eq!(
            value,
            serde_json::json!({"user_id": 1, "payment_id": 42, "deposit_amount": 100})
        );
    }

    #[test]
    fn decodes_valid_payload() {
        let record =
            EventRecord::decode(br#"{"user_id": 1, "payment_id": 10, "deposit_amount": 50}"#);
        let Ok(record) = record else {
            panic!("valid payload rejected");
        };
        assert_eq!(record, EventRecord::new(1, 10, 50));
    }

    #[test]
    fn decode_then_encode_is_lossless() {
        let original = EventRecord::new(-3, i64::MAX, 0);
        let Ok(decoded) = EventRecord::decode(&encode(&original)) else {
            panic!("round trip decode failed");
        };
        assert_eq!(decoded, original);
        assert_eq!(encode(&decoded), encode(&original));
    }

    #[test]
    fn rejects_non_integer_owner() {
        let err =
            EventRecord::decode(br#"{"user_id": "invalid", "payment_id": 10, "deposit_amount": 50}"#);
        assert!(matches!(err, Err(SchemaError::Decode(_))));
    }

    #[test]
    fn rejects_fractional_amount() {
        let err =
            EventRecord::decode(br#"{"user_id": 1, "payment_id": 10, "deposit_amount": 5.5}"#);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_missing_field() {
        assert!(EventRecord::decode(br#"{"user_id": 1, "payment_id": 10}"#).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(EventRecord::decode(b"not json").is_err());
    }

    #[test]
    fn ignores_unknown_fields() {
        let record = EventRecord::decode(
            br#"{"user_id": 2, "payment_id": 3, "deposit_amount": 20, "currency": "EUR"}"#,
        );
        let Ok(record) = record else {
            panic!("extra field rejected");
        };
        assert_eq!(record, EventRecord::new(2, 3, 20));
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(
            EventRecord::new(1, 2, 20).to_string(),
            "{owner=1, record=2, amount=20}"
        );
    }
}
