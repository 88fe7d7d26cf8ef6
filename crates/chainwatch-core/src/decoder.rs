//! The `LogDecoder` trait.
//!
//! The iterator and the forwarder are generic over how a log is decoded;
//! they hold an `Arc<dyn LogDecoder>` and call it once per raw log.

use crate::error::DecodeError;
use crate::event::{DecodedEvent, RawLog};
use crate::schema::EventSchema;
use std::sync::Arc;

/// Raw log → typed event.
///
/// # Contract
/// - Pure: no I/O, no side effects.
/// - `topics[1..]` map to indexed params in declaration order; the unpacked
///   `data` fields map to the non-indexed params in declaration order.
/// - Fails with [`DecodeError::TopicCountMismatch`] when
///   `topics.len() != indexed params + 1`, and with
///   [`DecodeError::DataUnpackFailure`] when `data` does not match the
///   schema's ABI layout.
pub trait LogDecoder: Send + Sync {
    fn decode(&self, raw: &RawLog, schema: &Arc<EventSchema>) -> Result<DecodedEvent, DecodeError>;
}

impl<F> LogDecoder for F
where
    F: Fn(&RawLog, &Arc<EventSchema>) -> Result<DecodedEvent, DecodeError> + Send + Sync,
{
    fn decode(&self, raw: &RawLog, schema: &Arc<EventSchema>) -> Result<DecodedEvent, DecodeError> {
        self(raw, schema)
    }
}
