//! Raw and decoded log types.

use crate::error::DecodeError;
use crate::schema::EventSchema;
use crate::typed::TypedEvent;
use crate::types::NormalizedValue;
use alloy_primitives::{Address, Bytes, B256};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A raw, undecoded log as delivered by the log source.
/// This is the input to every decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    /// Contract that emitted the log
    pub address: Address,
    /// topics[0] is the event signature hash; topics[1..] are indexed params
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed params
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
    /// `true` if the log was reorged out of the canonical chain
    #[serde(default)]
    pub removed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<B256>,
}

impl RawLog {
    /// The ordering key shared by every consumer.
    pub fn position(&self) -> LogPosition {
        LogPosition {
            block_number: self.block_number,
            transaction_index: self.transaction_index,
            log_index: self.log_index,
        }
    }

    /// topics[0], if present.
    pub fn signature(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// Position of a log in the ledger: `(block, tx index, log index)`,
/// ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
}

impl LogPosition {
    pub fn new(block_number: u64, transaction_index: u64, log_index: u64) -> Self {
        Self { block_number, transaction_index, log_index }
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.block_number, self.transaction_index, self.log_index)
    }
}

/// A fully decoded log.
///
/// Created once per [`RawLog`] by a decoder and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// The schema the log was decoded against
    pub schema: Arc<EventSchema>,
    /// Field values keyed by parameter name, in declaration order
    pub fields: IndexMap<String, NormalizedValue>,
    /// The log this event was decoded from
    pub raw: RawLog,
}

impl DecodedEvent {
    /// Event name, e.g. "Transfer".
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Get a field value by name.
    pub fn field(&self, name: &str) -> Option<&NormalizedValue> {
        self.fields.get(name)
    }

    /// Get a field value by name, failing if it is absent.
    pub fn require(&self, name: &str) -> Result<&NormalizedValue, DecodeError> {
        self.field(name).ok_or_else(|| DecodeError::MissingField {
            field: name.to_string(),
        })
    }

    pub fn position(&self) -> LogPosition {
        self.raw.position()
    }

    /// `true` if the underlying log was reorged out.
    pub fn is_removed(&self) -> bool {
        self.raw.removed
    }

    /// Map this event onto a strongly-typed domain struct.
    pub fn typed<T: TypedEvent>(&self) -> Result<T, DecodeError> {
        T::from_decoded(self)
    }
}
