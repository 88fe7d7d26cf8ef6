//! Event signature hashing.
//!
//! The dispatch key of an EVM event (`topics[0]`) is the keccak256 hash of
//! its canonical signature string, e.g.:
//!   keccak256("Transfer(address,address,uint256)")
//!   → 0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef

use alloy_primitives::B256;
use tiny_keccak::{Hasher, Keccak};

/// keccak256 of arbitrary bytes.
pub fn keccak256(bytes: &[u8]) -> B256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(bytes);
    hasher.finalize(&mut output);
    B256::from(output)
}

/// Compute the signature hash of a canonical event signature.
/// Input: `"EventName(type1,type2,...)"`: no spaces, no parameter names.
pub fn signature_hash(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}
