//! Topic filter builder.
//!
//! A [`FilterSpec`] is an ordered list of per-position inclusion sets over
//! the indexed topics of a log. An empty set at a position is a wildcard; a
//! non-empty set matches any of its values. Positions are ANDed together.
//!
//! ```text
//! positions:  [ {},      {A, B},  {} ]
//! topics:     [ sig, topics[1], topics[2], topics[3] ]
//!                        *      A or B        *
//! ```

use crate::event::RawLog;
use crate::schema::EventSchema;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topic match rule: AND across positions, OR within one position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Required `topics[0]` (event signature hash); `None` = any event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<B256>,
    /// `positions[i]` constrains `topics[i + 1]`
    #[serde(default)]
    pub positions: Vec<Vec<B256>>,
}

/// Build a filter from per-indexed-parameter inclusion lists.
///
/// No schema validation is performed: a list count that does not match the
/// event's indexed parameter count is the caller's responsibility.
pub fn build_filter(per_position: Vec<Vec<B256>>) -> FilterSpec {
    FilterSpec::build(per_position)
}

impl FilterSpec {
    /// A filter that matches every log.
    pub fn any() -> Self {
        Self::default()
    }

    /// See [`build_filter`].
    pub fn build(per_position: Vec<Vec<B256>>) -> Self {
        let positions = per_position
            .into_iter()
            .map(|mut set| {
                set.sort_unstable();
                set.dedup();
                set
            })
            .collect();
        Self { signature: None, positions }
    }

    /// Pin `topics[0]` to the schema's signature hash.
    pub fn for_event(mut self, schema: &EventSchema) -> Self {
        self.signature = Some(schema.signature_hash);
        self
    }

    /// Evaluate the filter against a log.
    ///
    /// A constrained position whose topic is absent does not match.
    pub fn matches(&self, log: &RawLog) -> bool {
        if let Some(sig) = &self.signature {
            if log.topics.first() != Some(sig) {
                return false;
            }
        }
        self.positions.iter().enumerate().all(|(i, set)| {
            set.is_empty()
                || log
                    .topics
                    .get(i + 1)
                    .is_some_and(|topic| set.contains(topic))
        })
    }

    /// Render the JSON-RPC `topics` array (`eth_getLogs` / `eth_subscribe`).
    ///
    /// Wildcards become `null`, single values a string, multiple values an
    /// OR-array. Trailing wildcards are trimmed.
    pub fn to_rpc_topics(&self) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.positions.len() + 1);
        out.push(match &self.signature {
            Some(sig) => Value::String(format!("{sig:#x}")),
            None => Value::Null,
        });
        for set in &self.positions {
            out.push(match set.as_slice() {
                [] => Value::Null,
                [one] => Value::String(format!("{one:#x}")),
                many => Value::Array(
                    many.iter()
                        .map(|t| Value::String(format!("{t:#x}")))
                        .collect(),
                ),
            });
        }
        while out.last() == Some(&Value::Null) {
            out.pop();
        }
        out
    }
}

/// Inclusive block range of a log query.
///
/// `from: None` means "no historical backlog" (live only);
/// `to: None` means "keep following the chain after the backlog".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    #[serde(default)]
    pub from: Option<u64>,
    #[serde(default)]
    pub to: Option<u64>,
}

impl BlockRange {
    /// Live tail only, no backlog.
    pub fn live() -> Self {
        Self::default()
    }

    /// Backlog from `from`, then live tail.
    pub fn from_block(from: u64) -> Self {
        Self { from: Some(from), to: None }
    }

    /// Bounded historical range; no live tail.
    pub fn between(from: u64, to: u64) -> Self {
        Self { from: Some(from), to: Some(to) }
    }

    /// Returns `true` if a live subscription follows the backlog.
    pub fn is_open_ended(&self) -> bool {
        self.to.is_none()
    }

    /// Returns `true` if a historical query precedes the live tail.
    pub fn has_backlog(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }
}
