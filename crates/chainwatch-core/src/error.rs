//! Error types for the decode and subscription pipeline.

use alloy_primitives::B256;
use thiserror::Error;

/// Errors that can occur while decoding a single log against a schema.
///
/// Decode errors are never retried: they end the current iterator or
/// forwarder lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Topic count mismatch: expected {expected}, got {got}")]
    TopicCountMismatch { expected: usize, got: usize },

    #[error("Event signature mismatch: expected {expected}, got {got}")]
    SignatureMismatch { expected: B256, got: B256 },

    #[error("Failed to unpack log data: {reason}")]
    DataUnpackFailure { reason: String },

    #[error("Missing field: {field}")]
    MissingField { field: String },

    #[error("Type mismatch on '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },
}

/// Errors reported by the raw log source: transport failures, evicted
/// filters, node-side RPC errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("RPC connection failed: {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Subscription closed unexpectedly")]
    Closed,

    #[error("Malformed log payload: {0}")]
    Deserialization(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        Self::Deserialization(e.to_string())
    }
}

/// The error surfaced to callers of an iterator or a watch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Subscription error: {0}")]
    Feed(#[from] FeedError),
}

impl StreamError {
    /// Returns `true` if the log feed itself failed (as opposed to a schema
    /// violation in one of its logs).
    pub fn is_feed_error(&self) -> bool {
        matches!(self, Self::Feed(_))
    }

    /// Returns `true` if a log could not be decoded against the schema.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
