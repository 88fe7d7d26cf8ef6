//! # chainwatch-core
//!
//! Core types shared across all ChainWatch crates: the raw log record, the
//! event schema and its signature hash, the topic filter builder, and the
//! two seams everything else plugs into: [`LogDecoder`] and [`LogSource`].

pub mod decoder;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod filter;
pub mod schema;
pub mod source;
pub mod typed;
pub mod types;

pub use decoder::LogDecoder;
pub use error::{DecodeError, FeedError, StreamError};
pub use event::{DecodedEvent, LogPosition, RawLog};
pub use filter::{build_filter, BlockRange, FilterSpec};
pub use schema::{EventSchema, ParamDef};
pub use source::{LiveSubscription, LogQuery, LogSource, Unsubscriber};
pub use typed::TypedEvent;
pub use types::{CanonicalType, NormalizedValue};

pub use alloy_primitives::{Address, Bytes, B256};
