//! # chainwatch-stream
//!
//! Turns a raw, filtered log feed (historical backlog + live tail) into
//! decoded, ordered events, consumed either by pulling from an
//! [`EventIterator`] or by having a forwarder task push into a sink.
//!
//! ## Architecture
//! ```text
//! LogSource::query_historical ──┐
//!                               ├─► LogFeed (backlog, then live tail)
//! LogSource::subscribe_live ────┘         │
//!                                         ▼
//!                                   LogDecoder::decode
//!                                         │
//!                      ┌──────────────────┴──────────────────┐
//!                      ▼                                     ▼
//!        EventIterator (pull, caller's task)    watch / spawn_watch (push, one task)
//! ```

pub mod cancel;
pub mod config;
pub mod engine;
pub mod feed;
pub mod forwarder;
pub mod iterator;
pub mod memory;
pub mod ws_source;

pub use cancel::CancelSignal;
pub use config::{ConfigError, StreamConfig, WatchTarget};
pub use engine::EventEngine;
pub use feed::{FeedEvent, LogFeed};
pub use forwarder::{spawn_watch, watch, WatchHandle};
pub use iterator::{EventIterator, IterationState};
pub use memory::MemoryLogSource;
pub use ws_source::WsLogSource;
