//! Strongly-typed domain events on top of the generic decoded field map.
//!
//! One generic decoder, iterator and forwarder serve every event type; a
//! domain struct only has to say which schema it belongs to and how to pull
//! its fields out of a [`DecodedEvent`].

use crate::error::DecodeError;
use crate::event::DecodedEvent;
use crate::schema::EventSchema;
use crate::types::NormalizedValue;

/// A domain event that can be built from a decoded log.
pub trait TypedEvent: Sized {
    /// The schema logs must be decoded against.
    fn schema() -> EventSchema;

    /// Map the decoded fields onto `Self`.
    fn from_decoded(event: &DecodedEvent) -> Result<Self, DecodeError>;
}

fn mismatch(field: &str, expected: &str, got: &NormalizedValue) -> DecodeError {
    DecodeError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        got: got.kind().to_string(),
    }
}

impl DecodedEvent {
    /// The named field as a checksummed address string.
    pub fn address_field(&self, name: &str) -> Result<&str, DecodeError> {
        let value = self.require(name)?;
        value.as_address().ok_or_else(|| mismatch(name, "address", value))
    }

    /// The named field as a u128. Values wider than u128 are a type mismatch.
    pub fn uint_field(&self, name: &str) -> Result<u128, DecodeError> {
        let value = self.require(name)?;
        value.as_u128().ok_or_else(|| mismatch(name, "uint", value))
    }

    /// The named field as a decimal string, for integers of any width.
    pub fn int_string_field(&self, name: &str) -> Result<String, DecodeError> {
        match self.require(name)? {
            NormalizedValue::Uint(v) => Ok(v.to_string()),
            NormalizedValue::Int(v) => Ok(v.to_string()),
            NormalizedValue::BigUint(s) | NormalizedValue::BigInt(s) => Ok(s.clone()),
            other => Err(mismatch(name, "integer", other)),
        }
    }

    pub fn bool_field(&self, name: &str) -> Result<bool, DecodeError> {
        let value = self.require(name)?;
        value.as_bool().ok_or_else(|| mismatch(name, "bool", value))
    }

    pub fn str_field(&self, name: &str) -> Result<&str, DecodeError> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| mismatch(name, "string", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawLog;
    use crate::schema::ParamDef;
    use crate::types::CanonicalType;
    use alloy_primitives::{Address, Bytes};
    use indexmap::IndexMap;
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct Transfer {
        from: String,
        to: String,
        value: u128,
    }

    impl TypedEvent for Transfer {
        fn schema() -> EventSchema {
            EventSchema::new(
                "Transfer",
                vec![
                    ParamDef::indexed("from", CanonicalType::Address),
                    ParamDef::indexed("to", CanonicalType::Address),
                    ParamDef::data("value", CanonicalType::Uint(256)),
                ],
            )
        }

        fn from_decoded(event: &DecodedEvent) -> Result<Self, DecodeError> {
            Ok(Self {
                from: event.address_field("from")?.to_string(),
                to: event.address_field("to")?.to_string(),
                value: event.uint_field("value")?,
            })
        }
    }

    fn decoded(fields: Vec<(&str, NormalizedValue)>) -> DecodedEvent {
        DecodedEvent {
            schema: Arc::new(Transfer::schema()),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<IndexMap<_, _>>(),
            raw: RawLog {
                address: Address::ZERO,
                topics: vec![],
                data: Bytes::new(),
                block_number: 1,
                transaction_index: 0,
                log_index: 0,
                removed: false,
                transaction_hash: None,
                block_hash: None,
            },
        }
    }

    #[test]
    fn maps_fields_onto_struct() {
        let event = decoded(vec![
            ("from", NormalizedValue::Address("0x01".into())),
            ("to", NormalizedValue::Address("0x02".into())),
            ("value", NormalizedValue::Uint(7)),
        ]);
        let t: Transfer = event.typed().unwrap();
        assert_eq!(t, Transfer { from: "0x01".into(), to: "0x02".into(), value: 7 });
    }

    #[test]
    fn missing_and_mistyped_fields() {
        let event = decoded(vec![("from", NormalizedValue::Bool(true))]);
        assert!(matches!(
            event.typed::<Transfer>(),
            Err(DecodeError::TypeMismatch { ref field, .. }) if field == "from"
        ));

        let event = decoded(vec![]);
        assert_eq!(
            event.typed::<Transfer>(),
            Err(DecodeError::MissingField { field: "from".into() })
        );
    }
}
