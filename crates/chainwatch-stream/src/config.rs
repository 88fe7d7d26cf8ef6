//! Stream configuration (YAML or JSON).
//!
//! ```yaml
//! rpc_url: wss://mainnet.example/ws
//! targets:
//!   - address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
//!     event: "Transfer(address indexed from, address indexed to, uint256 value)"
//!     from_block: 19000000
//!     topics:
//!       - []
//!       - ["0x000000000000000000000000d8da6bf26964af9d7eed9e03e53415d37aa96045"]
//! ```

use alloy_primitives::{Address, B256};
use chainwatch_core::{
    filter::{build_filter, BlockRange, FilterSpec},
    schema::EventSchema,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("target {index}: {reason}")]
    InvalidTarget { index: usize, reason: String },
}

/// One contract event to follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchTarget {
    pub address: Address,
    /// Human-readable declaration, e.g. `Transfer(address indexed from, ...)`
    pub event: String,
    /// First block of the backlog; omit for live-only
    #[serde(default)]
    pub from_block: Option<u64>,
    /// Last block; omit to keep following the chain
    #[serde(default)]
    pub to_block: Option<u64>,
    /// Per-indexed-parameter inclusion lists (empty list = any)
    #[serde(default)]
    pub topics: Vec<Vec<B256>>,
}

impl WatchTarget {
    pub fn schema(&self) -> Result<EventSchema, String> {
        EventSchema::parse_signature(&self.event).map_err(|e| e.to_string())
    }

    pub fn range(&self) -> BlockRange {
        BlockRange {
            from: self.from_block,
            to: self.to_block,
        }
    }

    pub fn filter(&self) -> FilterSpec {
        build_filter(self.topics.clone())
    }
}

/// Top-level streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// WebSocket JSON-RPC endpoint (`ws://` or `wss://`)
    pub rpc_url: String,
    /// Capacity of each live subscription's log channel
    #[serde(default = "default_live_buffer")]
    pub live_buffer: usize,
    /// Capacity of the sink channel handed to each forwarder
    #[serde(default = "default_sink_capacity")]
    pub sink_capacity: usize,
    #[serde(default)]
    pub targets: Vec<WatchTarget>,
}

fn default_live_buffer() -> usize { 512 }
fn default_sink_capacity() -> usize { 1_024 }

impl StreamConfig {
    /// A config with no targets.
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            live_buffer: default_live_buffer(),
            sink_capacity: default_sink_capacity(),
            targets: vec![],
        }
    }

    pub fn with_target(mut self, target: WatchTarget) -> Self {
        self.targets.push(target);
        self
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` file, or YAML for any other extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Check every target's event declaration, block range and topic
    /// list count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.rpc_url)
            .map_err(|e| ConfigError::Parse(format!("rpc_url {}: {e}", self.rpc_url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Parse(format!(
                "rpc_url must be ws:// or wss://, got {}://",
                url.scheme()
            )));
        }
        if self.live_buffer == 0 || self.sink_capacity == 0 {
            return Err(ConfigError::Parse(
                "live_buffer and sink_capacity must be non-zero".into(),
            ));
        }
        for (index, target) in self.targets.iter().enumerate() {
            let invalid = |reason: String| ConfigError::InvalidTarget { index, reason };
            let schema = target.schema().map_err(invalid)?;
            if let (Some(from), Some(to)) = (target.from_block, target.to_block) {
                if from > to {
                    return Err(invalid(format!("from_block {from} is after to_block {to}")));
                }
            }
            if target.topics.len() > schema.indexed_count() {
                return Err(invalid(format!(
                    "{} topic lists for {} indexed parameters",
                    target.topics.len(),
                    schema.indexed_count()
                )));
            }
        }
        Ok(())
    }
}
