//! Typed value → topic word, for building filter inclusion sets.
//!
//! Value types are left-padded into the 32-byte word exactly as the EVM
//! stores them. `string` and `bytes` are stored as the keccak256 of their
//! raw contents. Arrays and tuples have no topic form here.

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, U256};
use chainwatch_core::fingerprint::keccak256;

/// Encode a value the way it appears in an indexed topic.
/// Returns `None` for arrays, tuples and function pointers.
pub fn encode_topic(value: &DynSolValue) -> Option<B256> {
    match value {
        DynSolValue::Bool(_)
        | DynSolValue::Int(..)
        | DynSolValue::Uint(..)
        | DynSolValue::Address(_)
        | DynSolValue::FixedBytes(..) => Some(B256::from_slice(&value.abi_encode())),
        DynSolValue::String(s) => Some(keccak256(s.as_bytes())),
        DynSolValue::Bytes(b) => Some(keccak256(b)),
        _ => None,
    }
}

pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

pub fn uint_topic(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

pub fn string_topic(value: &str) -> B256 {
    keccak256(value.as_bytes())
}
