//! ChainWatch CLI.
//!
//! # Commands
//! ```text
//! chainwatch topic       <signature>
//! chainwatch decode-log  --event <decl> --topics <...> --data <hex>
//! chainwatch logs        --rpc <ws-url> --address <addr> --event <decl> [--from N] [--to N] [--topic I=HEX,...]
//! chainwatch watch       --config <watch.yaml>
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use alloy_primitives::{Address, Bytes, B256};
use chainwatch_core::{decoder::LogDecoder, event::DecodedEvent, schema::EventSchema, RawLog};
use chainwatch_evm::EvmDecoder;
use chainwatch_observability::{init_tracing, LogConfig};
use std::sync::Arc;

mod cmd_stream;

#[derive(Parser)]
#[command(
    name = "chainwatch",
    about = "Filter, iterate and watch EVM contract events",
    long_about = "
ChainWatch CLI: decode contract event logs, page through historical logs and
follow new ones over a WebSocket JSON-RPC endpoint.

ENVIRONMENT VARIABLES:
  RUST_LOG    Overrides the configured log directives
",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical signature and topic hash of an event declaration
    Topic {
        /// e.g. "Transfer(address indexed from, address indexed to, uint256 value)"
        signature: String,
    },

    /// Decode one log from raw topics + data
    #[command(name = "decode-log")]
    DecodeLog {
        /// Event declaration the log is expected to match
        #[arg(long)]
        event: String,
        /// topics[0] = event signature hash, topics[1..] = indexed params
        #[arg(long, num_args = 1..)]
        topics: Vec<String>,
        /// Non-indexed params (hex, 0x-prefixed)
        #[arg(long, default_value = "0x")]
        data: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Iterate decoded events over a block range (open-ended: keep following)
    Logs {
        /// WebSocket RPC endpoint
        #[arg(long)]
        rpc: String,
        /// Contract address
        #[arg(long)]
        address: Address,
        /// Event declaration
        #[arg(long)]
        event: String,
        /// First block of the backlog (omit for live only)
        #[arg(long)]
        from: Option<u64>,
        /// Last block (omit to keep following new blocks)
        #[arg(long)]
        to: Option<u64>,
        /// Indexed-parameter filter: `<index>=<hex>[,<hex>...]`, repeatable
        #[arg(long = "topic")]
        topics: Vec<String>,
        /// Stop after this many events
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Follow every target in a config file until Ctrl-C
    Watch {
        /// YAML or JSON config file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log = LogConfig {
        level: if cli.verbose { "debug" } else { "warn" }.into(),
        ..LogConfig::default()
    };

    match cli.command {
        Commands::Topic { signature } => {
            init_tracing(&log);
            cmd_topic(&signature)
        }

        Commands::DecodeLog { event, topics, data, json } => {
            init_tracing(&log);
            cmd_decode_log(&event, &topics, &data, json)
        }

        Commands::Logs { rpc, address, event, from, to, topics, limit } => {
            init_tracing(&log);
            let args = cmd_stream::LogsArgs { rpc, address, event, from, to, topics, limit };
            cmd_stream::run_logs(args).await
        }

        Commands::Watch { config } => cmd_stream::run_watch(&config, cli.verbose).await,
    }
}

// ─── topic ────────────────────────────────────────────────────────────────────

fn cmd_topic(signature: &str) -> Result<()> {
    let schema = parse_event(signature)?;
    println!("{}", schema.signature());
    println!("{:#x}", schema.signature_hash);
    Ok(())
}

// ─── decode-log ───────────────────────────────────────────────────────────────

fn cmd_decode_log(event: &str, topics: &[String], data: &str, as_json: bool) -> Result<()> {
    let schema = Arc::new(parse_event(event)?);
    let topics = topics
        .iter()
        .map(|t| t.parse::<B256>().with_context(|| format!("invalid topic '{t}'")))
        .collect::<Result<Vec<_>>>()?;
    let data = hex::decode(data.strip_prefix("0x").unwrap_or(data)).context("invalid data hex")?;

    let raw = RawLog {
        address: Address::ZERO,
        topics,
        data: Bytes::from(data),
        block_number: 0,
        transaction_index: 0,
        log_index: 0,
        removed: false,
        transaction_hash: None,
        block_hash: None,
    };
    let decoded = EvmDecoder::new().decode(&raw, &schema)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&decoded.fields)?);
    } else {
        println!("Event: {}", decoded.name());
        for (name, value) in &decoded.fields {
            println!("  {name:<20} {value}");
        }
    }
    Ok(())
}

// ─── Shared helpers ───────────────────────────────────────────────────────────

pub(crate) fn parse_event(decl: &str) -> Result<EventSchema> {
    EventSchema::parse_signature(decl)
        .map_err(|e| anyhow::anyhow!("invalid event declaration '{decl}': {e}"))
}

/// A non-anonymous event has at most three indexed parameters.
const MAX_INDEXED_TOPICS: usize = 3;

/// Parse repeated `<index>=<hex>[,<hex>...]` arguments into per-position
/// inclusion lists. Values shorter than 32 bytes are left-padded, so a
/// plain address can be passed as-is.
pub(crate) fn parse_topic_args(args: &[String]) -> Result<Vec<Vec<B256>>> {
    let mut positions: Vec<Vec<B256>> = Vec::new();
    for arg in args {
        let (index, values) = arg
            .split_once('=')
            .with_context(|| format!("topic filter '{arg}' must look like <index>=<hex>"))?;
        let index: usize = index
            .trim()
            .parse()
            .with_context(|| format!("invalid topic index in '{arg}'"))?;
        if index >= MAX_INDEXED_TOPICS {
            bail!("topic index {index} in '{arg}' is out of range (0..{MAX_INDEXED_TOPICS})");
        }
        if positions.len() <= index {
            positions.resize(index + 1, Vec::new());
        }
        for value in values.split(',').filter(|v| !v.trim().is_empty()) {
            positions[index].push(topic_word(value.trim())?);
        }
    }
    Ok(positions)
}

fn topic_word(value: &str) -> Result<B256> {
    let bytes = hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .with_context(|| format!("invalid topic hex '{value}'"))?;
    if bytes.len() > 32 {
        bail!("topic value '{value}' is longer than 32 bytes");
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(B256::from(word))
}

/// One JSON line per event.
pub(crate) fn event_json(event: &DecodedEvent) -> serde_json::Value {
    serde_json::json!({
        "event": event.name(),
        "address": format!("{:#x}", event.raw.address),
        "blockNumber": event.raw.block_number,
        "transactionIndex": event.raw.transaction_index,
        "logIndex": event.raw.log_index,
        "transactionHash": event.raw.transaction_hash.map(|h| format!("{h:#x}")),
        "removed": event.raw.removed,
        "fields": event.fields,
    })
}
