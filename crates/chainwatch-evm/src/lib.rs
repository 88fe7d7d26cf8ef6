//! # chainwatch-evm
//!
//! EVM log decoder implementing the `LogDecoder` trait.
//!
//! ## Implementation notes
//! - Uses `alloy-core` dyn-abi for ABI decoding
//! - topics[0] → event signature hash (checked against the schema)
//! - topics[1..] → indexed parameters (one 32-byte word each)
//! - `data` → non-indexed parameters (ABI-encoded parameter sequence)

pub mod decoder;
pub mod normalizer;
pub mod topics;

pub use decoder::EvmDecoder;
pub use topics::encode_topic;
