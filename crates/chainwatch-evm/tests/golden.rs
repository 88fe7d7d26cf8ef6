//! Golden fixture integration tests.
//!
//! Each test loads a real EVM log from `tests/fixtures/`, decodes it against
//! the event declaration recorded in the fixture, and asserts the field
//! values match the expected output.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use chainwatch_core::{decoder::LogDecoder, event::RawLog, schema::EventSchema, DecodeError};
use chainwatch_evm::decoder::EvmDecoder;

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn fixture(name: &str) -> serde_json::Value {
    let mut p = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("tests/fixtures");
    p.push(name);
    let text = std::fs::read_to_string(&p).unwrap_or_else(|e| panic!("{}: {e}", p.display()));
    serde_json::from_str(&text).unwrap()
}

fn hex_to_bytes(s: &str) -> Vec<u8> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).unwrap_or_else(|e| panic!("bad hex '{s}': {e}"))
}

fn raw_log_from_fixture(f: &serde_json::Value) -> RawLog {
    RawLog {
        address: f["contractAddress"].as_str().unwrap().parse::<Address>().unwrap(),
        topics: f["topics"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t.as_str().unwrap().parse::<B256>().unwrap())
            .collect(),
        data: Bytes::from(hex_to_bytes(f["data"].as_str().unwrap())),
        block_number: f["blockNumber"].as_u64().unwrap(),
        transaction_index: f["transactionIndex"].as_u64().unwrap(),
        log_index: f["logIndex"].as_u64().unwrap(),
        removed: false,
        transaction_hash: f["transactionHash"].as_str().map(|h| h.parse().unwrap()),
        block_hash: None,
    }
}

// ─── ERC-20 Transfer ──────────────────────────────────────────────────────────

#[test]
fn erc20_transfer_golden() {
    let fixture = fixture("erc20-transfer.json");
    let schema = Arc::new(EventSchema::parse_signature(fixture["event"].as_str().unwrap()).unwrap());
    let raw = raw_log_from_fixture(&fixture);

    // topics[0] on the wire must equal the locally computed signature hash
    assert_eq!(raw.topics[0], schema.signature_hash);

    let event = EvmDecoder::new().decode(&raw, &schema).expect("decode failed");
    let expected = &fixture["expectedFields"];

    for name in ["from", "to"] {
        let got = event.address_field(name).unwrap();
        assert_eq!(
            got.to_lowercase(),
            expected[name].as_str().unwrap().to_lowercase(),
            "{name} mismatch"
        );
    }
    assert_eq!(
        event.int_string_field("value").unwrap(),
        expected["value"].as_str().unwrap()
    );
    assert_eq!(event.raw.log_index, 48);
}

#[test]
fn erc20_transfer_against_wrong_schema() {
    let fixture = fixture("erc20-transfer.json");
    let raw = raw_log_from_fixture(&fixture);

    // Approval has the same shape but a different signature hash
    let approval = Arc::new(
        EventSchema::parse_signature(
            "Approval(address indexed owner, address indexed spender, uint256 value)",
        )
        .unwrap(),
    );
    assert!(matches!(
        EvmDecoder::new().decode(&raw, &approval),
        Err(DecodeError::SignatureMismatch { .. })
    ));

    // Treating `to` as a data param changes the topic count
    let unindexed = Arc::new(
        EventSchema::parse_signature("Transfer(address indexed from, address to, uint256 value)")
            .unwrap(),
    );
    assert!(matches!(
        EvmDecoder::new().decode(&raw, &unindexed),
        Err(DecodeError::TopicCountMismatch { expected: 2, got: 3 })
    ));
}
