//! `EvmDecoder`: the `LogDecoder` implementation for EVM chains.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::B256;
use chainwatch_core::{
    decoder::LogDecoder,
    error::DecodeError,
    event::{DecodedEvent, RawLog},
    schema::{EventSchema, ParamDef},
    types::{CanonicalType, NormalizedValue},
};
use indexmap::IndexMap;
use std::sync::Arc;

use crate::normalizer;

/// The EVM log decoder.
/// Thread-safe, cheap to clone (no heap state).
#[derive(Debug, Default, Clone, Copy)]
pub struct EvmDecoder;

impl EvmDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a single log outside of any feed.
    pub fn parse(&self, raw: &RawLog, schema: &Arc<EventSchema>) -> Result<DecodedEvent, DecodeError> {
        self.decode(raw, schema)
    }

    /// Build alloy `DynSolType` from a `CanonicalType`.
    pub fn canonical_to_dyn(ty: &CanonicalType) -> DynSolType {
        match ty {
            CanonicalType::Uint(bits) => DynSolType::Uint(*bits as usize),
            CanonicalType::Int(bits) => DynSolType::Int(*bits as usize),
            CanonicalType::Bool => DynSolType::Bool,
            CanonicalType::Address => DynSolType::Address,
            CanonicalType::FixedBytes(n) => DynSolType::FixedBytes(*n as usize),
            CanonicalType::Bytes => DynSolType::Bytes,
            CanonicalType::String => DynSolType::String,
            CanonicalType::Array { elem, len } => {
                DynSolType::FixedArray(Box::new(Self::canonical_to_dyn(elem)), *len)
            }
            CanonicalType::Vec(elem) => DynSolType::Array(Box::new(Self::canonical_to_dyn(elem))),
            CanonicalType::Tuple(types) => {
                DynSolType::Tuple(types.iter().map(Self::canonical_to_dyn).collect())
            }
        }
    }

    /// Decode a single indexed topic.
    ///
    /// # EVM ABI indexed-parameter encoding rules
    /// - **Value types** (uint, int, bool, address, bytes1–bytes32): padded to
    ///   32 bytes, stored directly: the value is recoverable.
    /// - **Reference types** (string, bytes, arrays, tuples): stored as the
    ///   `keccak256` of their encoding: only the hash is returned.
    fn decode_topic(topic: &B256, param: &ParamDef) -> Result<NormalizedValue, DecodeError> {
        if param.ty.is_reference() {
            return Ok(NormalizedValue::Hash256(format!("{topic:#x}")));
        }
        Self::canonical_to_dyn(&param.ty)
            .abi_decode(topic.as_slice())
            .map(normalizer::normalize)
            .map_err(|e| DecodeError::DataUnpackFailure {
                reason: format!("topic '{}': {e}", param.name),
            })
    }

    /// Decode the data payload (non-indexed params) as an ABI parameter
    /// sequence.
    fn decode_data(
        data: &[u8],
        schema: &EventSchema,
    ) -> Result<Vec<NormalizedValue>, DecodeError> {
        match schema.packed_data_size() {
            Some(expected) if data.len() != expected => {
                return Err(DecodeError::DataUnpackFailure {
                    reason: format!("expected {expected} bytes of data, got {}", data.len()),
                });
            }
            None if !schema.has_dynamic_data() => {
                return Err(DecodeError::DataUnpackFailure {
                    reason: "static data layout exceeds the addressable size".into(),
                });
            }
            _ => {}
        }

        let types: Vec<DynSolType> = schema
            .data_params()
            .map(|p| Self::canonical_to_dyn(&p.ty))
            .collect();
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let expected = types.len();

        let decoded = DynSolType::Tuple(types)
            .abi_decode_sequence(data)
            .map_err(|e| DecodeError::DataUnpackFailure { reason: e.to_string() })?;

        let values = match decoded {
            DynSolValue::Tuple(vals) => vals,
            other => vec![other],
        };
        if values.len() != expected {
            return Err(DecodeError::DataUnpackFailure {
                reason: format!("expected {expected} values, decoded {}", values.len()),
            });
        }
        Ok(values.into_iter().map(normalizer::normalize).collect())
    }
}

impl LogDecoder for EvmDecoder {
    fn decode(&self, raw: &RawLog, schema: &Arc<EventSchema>) -> Result<DecodedEvent, DecodeError> {
        let indexed_count = schema.indexed_count();
        if raw.topics.len() != indexed_count + 1 {
            return Err(DecodeError::TopicCountMismatch {
                expected: indexed_count + 1,
                got: raw.topics.len(),
            });
        }
        if raw.topics[0] != schema.signature_hash {
            return Err(DecodeError::SignatureMismatch {
                expected: schema.signature_hash,
                got: raw.topics[0],
            });
        }

        let mut data_values = Self::decode_data(&raw.data, schema)?.into_iter();
        let mut topics = raw.topics[1..].iter();

        // Walk params in declaration order, pulling from whichever side holds
        // each one, so the field map keeps the declared order.
        let mut fields = IndexMap::with_capacity(schema.params.len());
        for param in &schema.params {
            let value = if param.indexed {
                match topics.next() {
                    Some(topic) => Self::decode_topic(topic, param)?,
                    None => return Err(DecodeError::MissingField { field: param.name.clone() }),
                }
            } else {
                match data_values.next() {
                    Some(v) => v,
                    None => return Err(DecodeError::MissingField { field: param.name.clone() }),
                }
            };
            fields.insert(param.name.clone(), value);
        }

        Ok(DecodedEvent {
            schema: Arc::clone(schema),
            fields,
            raw: raw.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes, U256};
    use chainwatch_core::fingerprint::keccak256;

    fn transfer_schema() -> Arc<EventSchema> {
        Arc::new(
            EventSchema::parse_signature(
                "Transfer(address indexed from, address indexed to, uint256 value)",
            )
            .unwrap(),
        )
    }

    fn raw(topics: Vec<B256>, data: Vec<u8>) -> RawLog {
        RawLog {
            address: Address::repeat_byte(0xaa),
            topics,
            data: Bytes::from(data),
            block_number: 19_000_000,
            transaction_index: 4,
            log_index: 0,
            removed: false,
            transaction_hash: None,
            block_hash: None,
        }
    }

    fn transfer_raw(value: u64) -> RawLog {
        let schema = transfer_schema();
        raw(
            vec![
                schema.signature_hash,
                Address::repeat_byte(0x11).into_word(),
                Address::repeat_byte(0x22).into_word(),
            ],
            U256::from(value).to_be_bytes::<32>().to_vec(),
        )
    }

    #[test]
    fn decodes_positionally() {
        let event = EvmDecoder::new().decode(&transfer_raw(1_000), &transfer_schema()).unwrap();

        assert_eq!(event.name(), "Transfer");
        let names: Vec<_> = event.fields.keys().map(String::as_str).collect();
        assert_eq!(names, ["from", "to", "value"]);
        assert_eq!(
            event.field("from").and_then(|v| v.as_address()).map(str::to_lowercase),
            Some(format!("{:#x}", Address::repeat_byte(0x11)))
        );
        assert_eq!(event.field("value"), Some(&NormalizedValue::Uint(1_000)));
        assert_eq!(event.raw.block_number, 19_000_000);
    }

    #[test]
    fn topic_count_mismatch() {
        let mut log = transfer_raw(1);
        log.topics.pop();
        assert_eq!(
            EvmDecoder::new().decode(&log, &transfer_schema()).unwrap_err(),
            DecodeError::TopicCountMismatch { expected: 3, got: 2 }
        );

        log.topics.clear();
        assert_eq!(
            EvmDecoder::new().decode(&log, &transfer_schema()).unwrap_err(),
            DecodeError::TopicCountMismatch { expected: 3, got: 0 }
        );
    }

    #[test]
    fn signature_mismatch() {
        let mut log = transfer_raw(1);
        log.topics[0] = B256::repeat_byte(0x01);
        assert!(matches!(
            EvmDecoder::new().decode(&log, &transfer_schema()),
            Err(DecodeError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn short_data_is_unpack_failure() {
        let mut log = transfer_raw(1);
        log.data = Bytes::from(vec![0u8; 31]);
        assert!(matches!(
            EvmDecoder::new().decode(&log, &transfer_schema()),
            Err(DecodeError::DataUnpackFailure { .. })
        ));
    }

    #[test]
    fn dynamic_data_and_hashed_indexed_string() {
        let schema = Arc::new(
            EventSchema::parse_signature(
                "Posted(string indexed channel, address indexed author, string body, uint64 seq)",
            )
            .unwrap(),
        );
        let data = DynSolValue::Tuple(vec![
            DynSolValue::String("gm".into()),
            DynSolValue::Uint(U256::from(9u64), 64),
        ])
        .abi_encode_params();
        let channel_hash = keccak256(b"general");
        let log = raw(
            vec![
                schema.signature_hash,
                channel_hash,
                Address::repeat_byte(0x33).into_word(),
            ],
            data,
        );

        let event = EvmDecoder::new().decode(&log, &schema).unwrap();
        assert_eq!(
            event.field("channel"),
            Some(&NormalizedValue::Hash256(format!("{channel_hash:#x}")))
        );
        assert_eq!(event.field("body"), Some(&NormalizedValue::Str("gm".into())));
        assert_eq!(event.field("seq"), Some(&NormalizedValue::Uint(9)));
    }

    #[test]
    fn malformed_dynamic_data_is_unpack_failure() {
        let schema = Arc::new(EventSchema::parse_signature("Note(string body)").unwrap());
        // offset points far past the end of the payload
        let mut data = vec![0u8; 32];
        data[31] = 0xff;
        let log = raw(vec![schema.signature_hash], data);
        assert!(matches!(
            EvmDecoder::new().decode(&log, &schema),
            Err(DecodeError::DataUnpackFailure { .. })
        ));
    }

    #[test]
    fn oversized_static_layout_is_unpack_failure() {
        let schema = Arc::new(EventSchema::new(
            "Big",
            vec![ParamDef::data(
                "v",
                CanonicalType::Array {
                    elem: Box::new(CanonicalType::Uint(256)),
                    len: 1_000_000_000_000_000_000,
                },
            )],
        ));
        let log = raw(vec![schema.signature_hash], vec![0u8; 32]);
        assert!(matches!(
            EvmDecoder::new().decode(&log, &schema),
            Err(DecodeError::DataUnpackFailure { .. })
        ));
    }

    #[test]
    fn no_params_requires_empty_data() {
        let schema = Arc::new(EventSchema::parse_signature("Paused()").unwrap());
        assert!(EvmDecoder::new().decode(&raw(vec![schema.signature_hash], vec![]), &schema).is_ok());
        assert!(EvmDecoder::new()
            .decode(&raw(vec![schema.signature_hash], vec![0u8; 32]), &schema)
            .is_err());
    }
}
