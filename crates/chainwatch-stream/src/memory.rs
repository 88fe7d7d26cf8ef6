//! `MemoryLogSource`: an in-process [`LogSource`] backed by a vector of
//! historical logs and test-driven live pushes.
//!
//! Useful for tests, replaying recorded logs and offline tooling.

use async_trait::async_trait;
use chainwatch_core::{
    error::FeedError,
    event::RawLog,
    source::{LiveSubscription, LogQuery, LogSource, Unsubscriber},
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_LIVE_CAPACITY: usize = 1024;

struct Subscriber {
    id: u64,
    query: LogQuery,
    logs: mpsc::Sender<RawLog>,
    errors: mpsc::Sender<FeedError>,
}

#[derive(Default)]
struct Inner {
    history: Vec<RawLog>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
    subscribes: usize,
    unsubscribes: usize,
    historical_failure: Option<FeedError>,
}

/// In-memory log source.
///
/// Clones share the same state, so a test can keep one clone to push live
/// logs while the engine holds another.
#[derive(Clone)]
pub struct MemoryLogSource {
    inner: Arc<Mutex<Inner>>,
    live_capacity: usize,
}

impl MemoryLogSource {
    pub fn new() -> Self {
        Self::with_live_capacity(DEFAULT_LIVE_CAPACITY)
    }

    /// Bound on each live subscription's log channel.
    ///
    /// Once a channel is full, [`push_live`](Self::push_live) drops the log
    /// for that subscriber while [`send_live`](Self::send_live) waits for
    /// room, the way a socket reader stalls behind a slow consumer.
    pub fn with_live_capacity(live_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            live_capacity: live_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a log to the historical store.
    pub fn insert_historical(&self, log: RawLog) {
        self.lock().history.push(log);
    }

    pub fn extend_historical(&self, logs: impl IntoIterator<Item = RawLog>) {
        self.lock().history.extend(logs);
    }

    /// Make the next historical queries fail with `err`.
    pub fn fail_historical(&self, err: FeedError) {
        self.lock().historical_failure = Some(err);
    }

    /// Deliver a log to every live subscriber whose query matches it.
    ///
    /// Returns how many subscribers accepted it. A subscriber whose channel
    /// is full misses the log.
    pub fn push_live(&self, log: RawLog) -> usize {
        let inner = self.lock();
        let mut delivered = 0;
        for sub in inner.subscribers.iter().filter(|s| s.query.matches(&log)) {
            match sub.logs.try_send(log.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = sub.id, position = %log.position(), "live channel full, log dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Deliver a log to every matching live subscriber, waiting while a
    /// subscriber's channel is full.
    ///
    /// Returns how many subscribers received it.
    pub async fn send_live(&self, log: RawLog) -> usize {
        let senders: Vec<mpsc::Sender<RawLog>> = self
            .lock()
            .subscribers
            .iter()
            .filter(|s| s.query.matches(&log))
            .map(|s| s.logs.clone())
            .collect();
        let mut delivered = 0;
        for logs in senders {
            if logs.send(log.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Report `err` on every live subscription's error channel.
    pub fn fail_live(&self, err: FeedError) {
        for sub in &self.lock().subscribers {
            let _ = sub.errors.try_send(err.clone());
        }
    }

    /// End every live subscription cleanly (both channels close).
    pub fn end_live(&self) {
        self.lock().subscribers.clear();
    }

    /// Live subscriptions currently held open.
    pub fn active_subscriptions(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Total `subscribe_live` calls.
    pub fn subscribe_count(&self) -> usize {
        self.lock().subscribes
    }

    /// Total releases observed through an [`Unsubscriber`].
    pub fn unsubscribe_count(&self) -> usize {
        self.lock().unsubscribes
    }
}

impl Default for MemoryLogSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogSource for MemoryLogSource {
    async fn query_historical(&self, query: &LogQuery) -> Result<Vec<RawLog>, FeedError> {
        let inner = self.lock();
        if let Some(err) = &inner.historical_failure {
            return Err(err.clone());
        }
        let from = query.range.from.unwrap_or(0);
        let to = query.range.to.unwrap_or(u64::MAX);
        let mut logs: Vec<RawLog> = inner
            .history
            .iter()
            .filter(|log| (from..=to).contains(&log.block_number) && query.matches(log))
            .cloned()
            .collect();
        logs.sort_by_key(RawLog::position);
        debug!(count = logs.len(), from, to, "historical query served");
        Ok(logs)
    }

    async fn subscribe_live(&self, query: &LogQuery) -> Result<LiveSubscription, FeedError> {
        let (log_tx, log_rx) = mpsc::channel(self.live_capacity);
        let (err_tx, err_rx) = mpsc::channel(1);

        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribes += 1;
        inner.subscribers.push(Subscriber {
            id,
            query: query.clone(),
            logs: log_tx,
            errors: err_tx,
        });
        drop(inner);

        let state = Arc::clone(&self.inner);
        let unsubscriber = Unsubscriber::new(move || {
            let mut inner = state.lock().unwrap_or_else(PoisonError::into_inner);
            inner.unsubscribes += 1;
            inner.subscribers.retain(|s| s.id != id);
        });
        debug!(subscriber = id, "live subscription opened");
        Ok(LiveSubscription::new(log_rx, err_rx, unsubscriber))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
