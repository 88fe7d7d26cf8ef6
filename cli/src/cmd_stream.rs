//! `chainwatch logs` and `chainwatch watch`.
//!
//! Config format for `watch` (YAML):
//! ```yaml
//! rpc_url: wss://mainnet.example/ws
//! sink_capacity: 1024
//! log:
//!   level: info
//!   components:
//!     chainwatch-stream: debug
//! targets:
//!   - address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
//!     event: "Transfer(address indexed from, address indexed to, uint256 value)"
//!     from_block: 19000000
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use alloy_primitives::Address;
use chainwatch_core::filter::{build_filter, BlockRange};
use chainwatch_observability::{init_tracing, LogConfig};
use chainwatch_stream::{EventEngine, StreamConfig, WatchHandle, WsLogSource};

use crate::{event_json, parse_event, parse_topic_args};

// ─── logs ─────────────────────────────────────────────────────────────────────

pub struct LogsArgs {
    pub rpc: String,
    pub address: Address,
    pub event: String,
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub topics: Vec<String>,
    pub limit: Option<usize>,
}

pub async fn run_logs(args: LogsArgs) -> Result<()> {
    let schema = Arc::new(parse_event(&args.event)?);
    let filter = build_filter(parse_topic_args(&args.topics)?);
    let range = BlockRange {
        from: args.from,
        to: args.to,
    };

    let engine = EventEngine::new(Arc::new(WsLogSource::new(&args.rpc)));
    let mut iter = engine
        .iterator(args.address, filter, schema, range)
        .await
        .with_context(|| format!("opening log feed on {}", args.rpc))?;

    let mut printed = 0usize;
    while args.limit.map_or(true, |limit| printed < limit) && iter.next().await {
        if let Some(event) = iter.event() {
            println!("{}", event_json(event));
            printed += 1;
        }
    }
    iter.close();

    match iter.err() {
        Some(e) => Err(anyhow::Error::new(e.clone()).context(format!("after {printed} events"))),
        None => Ok(()),
    }
}

// ─── watch ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AppConfig {
    #[serde(flatten)]
    stream: StreamConfig,
    #[serde(default)]
    log: LogConfig,
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: AppConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&text)?,
        _ => serde_yaml::from_str(&text)?,
    };
    config
        .stream
        .validate()
        .with_context(|| format!("validating {}", path.display()))?;
    Ok(config)
}

pub async fn run_watch(path: &Path, verbose: bool) -> Result<()> {
    let mut config = load_config(path)?;
    if verbose {
        config.log.level = "debug".into();
    }
    init_tracing(&config.log);

    let stream = config.stream;
    if stream.targets.is_empty() {
        anyhow::bail!("{} has no targets", path.display());
    }

    let source = WsLogSource::new(&stream.rpc_url).with_live_buffer(stream.live_buffer);
    let engine = EventEngine::new(Arc::new(source));
    let (sink, mut events) = mpsc::channel(stream.sink_capacity);

    let mut handles: Vec<(String, WatchHandle)> = Vec::with_capacity(stream.targets.len());
    for target in &stream.targets {
        let schema = Arc::new(parse_event(&target.event)?);
        let label = format!("{}@{:#x}", schema.name, target.address);
        info!(target = %label, from = ?target.from_block, to = ?target.to_block, "starting watch");
        let handle = engine.spawn_watch(
            target.address,
            target.filter(),
            schema,
            target.range(),
            sink.clone(),
        );
        handles.push((label, handle));
    }
    drop(sink);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupt received, unsubscribing");
                break;
            }
            next = events.recv() => match next {
                Some(event) => println!("{}", event_json(&event)),
                // every forwarder has terminated
                None => break,
            },
        }
    }

    let mut failures = 0usize;
    for (label, handle) in handles {
        handle.unsubscribe();
        match handle.wait().await {
            Ok(()) => info!(target = %label, "watch stopped"),
            Err(e) => {
                error!(target = %label, error = %e, "watch failed");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} watch(es) failed");
    }
    Ok(())
}
