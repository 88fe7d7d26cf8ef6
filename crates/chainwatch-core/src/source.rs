//! `LogSource` trait: abstraction over the chain client that supplies logs.
//!
//! A source offers two things: a bounded historical query and a live
//! subscription. The stream crate stitches them together into one ordered
//! feed; retry, reconnect and persistence stay on the source's side.

use crate::error::FeedError;
use crate::event::RawLog;
use crate::filter::{BlockRange, FilterSpec};
use alloy_primitives::Address;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// What to fetch: one contract, one topic filter, one block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub filter: FilterSpec,
    pub range: BlockRange,
}

impl LogQuery {
    pub fn new(address: Address, filter: FilterSpec, range: BlockRange) -> Self {
        Self { address, filter, range }
    }

    /// Returns `true` if the log belongs to this query's contract and
    /// passes its topic filter. The block range is not checked.
    pub fn matches(&self, log: &RawLog) -> bool {
        log.address == self.address && self.filter.matches(log)
    }
}

/// Releases a live subscription exactly once.
///
/// Calling [`Unsubscriber::unsubscribe`] more than once is a no-op, and the
/// release also runs on drop, so every exit path frees the upstream
/// resource.
pub struct Unsubscriber {
    release: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Unsubscriber {
    /// Wrap a release callback. The callback must not block.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// An unsubscriber with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Release the subscription. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for Unsubscriber {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Unsubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscriber")
            .field("released", &self.is_released())
            .finish()
    }
}

/// A live log subscription: a log channel, a parallel error channel and the
/// handle that releases both.
///
/// The error channel carries at most one meaningful error; it closing
/// without a value means the subscription ended cleanly.
#[derive(Debug)]
pub struct LiveSubscription {
    pub logs: mpsc::Receiver<RawLog>,
    pub errors: mpsc::Receiver<FeedError>,
    pub unsubscriber: Unsubscriber,
}

impl LiveSubscription {
    pub fn new(
        logs: mpsc::Receiver<RawLog>,
        errors: mpsc::Receiver<FeedError>,
        unsubscriber: Unsubscriber,
    ) -> Self {
        Self { logs, errors, unsubscriber }
    }
}

/// The raw log collaborator.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` so a single source can back many
/// iterators and watch tasks at once.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch the finite backlog of logs matching `query`, in ascending
    /// `(block, tx index, log index)` order.
    async fn query_historical(&self, query: &LogQuery) -> Result<Vec<RawLog>, FeedError>;

    /// Subscribe to new logs matching `query` as they are produced.
    async fn subscribe_live(&self, query: &LogQuery) -> Result<LiveSubscription, FeedError>;

    /// Identifier used in log lines (URL or name).
    fn name(&self) -> &str {
        "log-source"
    }
}
