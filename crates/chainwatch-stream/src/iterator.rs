//! `EventIterator`: pull-style consumption of a decoded event feed.
//!
//! ```text
//!             log decoded
//!            ┌──────────┐
//!            ▼          │
//!   ──► Active ─────────┘
//!        │  │  └── decode error ──────────────► Failed
//!        │  └── feed error / feed ended ──► Draining ── buffer empty ──► Closed
//!        └── close() (any state) ───────────────────────────────────────► Closed
//! ```
//!
//! The iterator is driven by its caller; it owns no task. Dropping it
//! releases the live subscription.

use crate::feed::{FeedEvent, LogFeed};
use chainwatch_core::{
    decoder::LogDecoder,
    error::StreamError,
    event::{DecodedEvent, RawLog},
    schema::EventSchema,
};
use futures::Stream;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Lifecycle state of an [`EventIterator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    /// Waiting on the feed for the next log
    Active,
    /// The feed ended or failed; only buffered logs are still delivered
    Draining,
    /// A log failed to decode; iteration is over
    Failed,
    /// Finished or explicitly closed
    Closed,
}

pub struct EventIterator {
    feed: LogFeed,
    schema: Arc<EventSchema>,
    decoder: Arc<dyn LogDecoder>,
    state: IterationState,
    current: Option<DecodedEvent>,
    error: Option<StreamError>,
}

impl EventIterator {
    pub fn new(feed: LogFeed, schema: Arc<EventSchema>, decoder: Arc<dyn LogDecoder>) -> Self {
        Self {
            feed,
            schema,
            decoder,
            state: IterationState::Active,
            current: None,
            error: None,
        }
    }

    /// Advance to the next event.
    ///
    /// Returns `true` when [`event`](Self::event) holds a freshly decoded
    /// event, `false` once iteration is over. After a `false`, check
    /// [`err`](Self::err) to tell a clean end from a failure.
    pub async fn next(&mut self) -> bool {
        loop {
            match self.state {
                IterationState::Failed | IterationState::Closed => return false,
                IterationState::Draining => {
                    return match self.feed.next_buffered() {
                        Some(raw) => self.accept(raw),
                        None => {
                            debug!(event = %self.schema.name, "iterator drained");
                            self.state = IterationState::Closed;
                            false
                        }
                    };
                }
                IterationState::Active => match self.feed.recv().await {
                    FeedEvent::Log(raw) => return self.accept(raw),
                    FeedEvent::Failed(err) => {
                        warn!(event = %self.schema.name, error = %err, "log feed failed, draining");
                        self.record(err.into());
                        self.state = IterationState::Draining;
                    }
                    FeedEvent::Finished => {
                        debug!(event = %self.schema.name, "log feed finished");
                        self.state = IterationState::Draining;
                    }
                },
            }
        }
    }

    /// Blocking variant of [`next`](Self::next) for synchronous callers.
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn blocking_next(&mut self) -> bool {
        futures::executor::block_on(self.next())
    }

    /// The most recently decoded event.
    pub fn event(&self) -> Option<&DecodedEvent> {
        self.current.as_ref()
    }

    /// Take ownership of the most recently decoded event.
    pub fn take_event(&mut self) -> Option<DecodedEvent> {
        self.current.take()
    }

    /// The first error seen (feed or decode), if any.
    pub fn err(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    pub fn schema(&self) -> &Arc<EventSchema> {
        &self.schema
    }

    /// Stop iterating and release the live subscription.
    /// Safe to call from any state, any number of times.
    pub fn close(&mut self) {
        self.feed.unsubscribe();
        if self.state != IterationState::Closed {
            debug!(event = %self.schema.name, from = ?self.state, "iterator closed");
        }
        self.state = IterationState::Closed;
    }

    /// Adapt into a [`Stream`] of decoded events.
    ///
    /// The stream yields the terminating error (if any) as its last item.
    pub fn into_stream(self) -> impl Stream<Item = Result<DecodedEvent, StreamError>> + Send {
        futures::stream::unfold(Some(self), |iter| async move {
            let mut iter = iter?;
            if iter.next().await {
                let event = iter.current.take()?;
                Some((Ok(event), Some(iter)))
            } else {
                let err = iter.error.take()?;
                Some((Err(err), None))
            }
        })
    }

    fn accept(&mut self, raw: RawLog) -> bool {
        match self.decoder.decode(&raw, &self.schema) {
            Ok(event) => {
                self.current = Some(event);
                true
            }
            Err(e) => {
                error!(
                    event = %self.schema.name,
                    position = %raw.position(),
                    error = %e,
                    "failed to decode log, stopping iteration"
                );
                self.current = None;
                self.record(e.into());
                self.state = IterationState::Failed;
                false
            }
        }
    }

    fn record(&mut self, err: StreamError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

impl std::fmt::Debug for EventIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventIterator")
            .field("event", &self.schema.name)
            .field("state", &self.state)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes};
    use chainwatch_core::error::{DecodeError, FeedError};
    use chainwatch_core::source::{LiveSubscription, Unsubscriber};
    use chainwatch_core::types::NormalizedValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    // Accepts logs with exactly one topic and exposes log_index as "n".
    fn decoder() -> Arc<dyn LogDecoder> {
        Arc::new(|raw: &RawLog, schema: &Arc<EventSchema>| {
            if raw.topics.len() != 1 {
                return Err(DecodeError::TopicCountMismatch {
                    expected: 1,
                    got: raw.topics.len(),
                });
            }
            Ok(DecodedEvent {
                schema: Arc::clone(schema),
                fields: [("n".to_string(), NormalizedValue::Uint(raw.log_index as u128))]
                    .into_iter()
                    .collect(),
                raw: raw.clone(),
            })
        })
    }

    fn schema() -> Arc<EventSchema> {
        Arc::new(EventSchema::parse_signature("Tick()").unwrap())
    }

    fn log(n: u64) -> RawLog {
        RawLog {
            address: Address::ZERO,
            topics: vec![schema().signature_hash],
            data: Bytes::new(),
            block_number: 1,
            transaction_index: 0,
            log_index: n,
            removed: false,
            transaction_hash: None,
            block_hash: None,
        }
    }

    fn bad_log(n: u64) -> RawLog {
        let mut l = log(n);
        l.topics.clear();
        l
    }

    fn n_of(iter: &EventIterator) -> u128 {
        iter.event().unwrap().field("n").unwrap().as_u128().unwrap()
    }

    fn live_iterator() -> (mpsc::Sender<RawLog>, mpsc::Sender<FeedError>, EventIterator) {
        let (log_tx, log_rx) = mpsc::channel(8);
        let (err_tx, err_rx) = mpsc::channel(1);
        let sub = LiveSubscription::new(log_rx, err_rx, Unsubscriber::noop());
        let feed = LogFeed::from_parts(vec![], Some(sub));
        (log_tx, err_tx, EventIterator::new(feed, schema(), decoder()))
    }

    #[tokio::test]
    async fn bounded_iteration_ends_cleanly() {
        let feed = LogFeed::from_parts(vec![log(0), log(1)], None);
        let mut iter = EventIterator::new(feed, schema(), decoder());

        assert!(iter.next().await);
        assert_eq!(n_of(&iter), 0);
        assert!(iter.next().await);
        assert_eq!(n_of(&iter), 1);
        assert!(!iter.next().await);
        assert!(iter.err().is_none());
        assert_eq!(iter.state(), IterationState::Closed);
        assert!(!iter.next().await);
    }

    #[tokio::test]
    async fn decode_error_stops_iteration() {
        let feed = LogFeed::from_parts(vec![log(0), bad_log(1), log(2)], None);
        let mut iter = EventIterator::new(feed, schema(), decoder());

        assert!(iter.next().await);
        assert!(!iter.next().await);
        assert_eq!(iter.state(), IterationState::Failed);
        assert!(iter.err().unwrap().is_decode_error());
        assert!(iter.event().is_none());
        // the log after the bad one is never surfaced
        assert!(!iter.next().await);
    }

    #[tokio::test]
    async fn queued_logs_delivered_before_feed_error() {
        let (log_tx, err_tx, mut iter) = live_iterator();
        log_tx.send(log(4)).await.unwrap();
        log_tx.send(log(5)).await.unwrap();
        err_tx.send(FeedError::Closed).await.unwrap();

        assert!(iter.next().await);
        assert_eq!(n_of(&iter), 4);
        assert!(iter.next().await);
        assert_eq!(n_of(&iter), 5);
        assert!(!iter.next().await);
        assert!(matches!(
            iter.err(),
            Some(StreamError::Feed(FeedError::Closed))
        ));
        assert_eq!(iter.state(), IterationState::Closed);
    }

    #[tokio::test]
    async fn first_error_wins() {
        let (_log_tx, err_tx, mut iter) = live_iterator();
        err_tx.send(FeedError::Other("first".into())).await.unwrap();
        assert!(!iter.next().await);
        iter.close();
        assert!(!iter.next().await);
        assert!(matches!(
            iter.err(),
            Some(StreamError::Feed(FeedError::Other(msg))) if msg == "first"
        ));
    }

    #[tokio::test]
    async fn clean_live_end_closes_without_error() {
        let (log_tx, err_tx, mut iter) = live_iterator();
        log_tx.send(log(1)).await.unwrap();
        drop(log_tx);
        drop(err_tx);

        assert!(iter.next().await);
        assert!(!iter.next().await);
        assert!(iter.err().is_none());
        assert_eq!(iter.state(), IterationState::Closed);
    }

    #[tokio::test]
    async fn close_twice_is_noop() {
        let feed = LogFeed::from_parts(vec![log(0)], None);
        let mut iter = EventIterator::new(feed, schema(), decoder());
        iter.close();
        iter.close();
        assert_eq!(iter.state(), IterationState::Closed);
        assert!(!iter.next().await);
        assert!(iter.err().is_none());
    }

    #[tokio::test]
    async fn close_twice_while_draining() {
        let (log_tx, log_rx) = mpsc::channel(8);
        let (_err_tx, err_rx) = mpsc::channel(1);
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let unsub = Unsubscriber::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let feed = LogFeed::from_parts(vec![], Some(LiveSubscription::new(log_rx, err_rx, unsub)));
        let mut iter = EventIterator::new(feed, schema(), decoder());

        // feed failed with two logs still in the channel
        log_tx.send(log(1)).await.unwrap();
        log_tx.send(log(2)).await.unwrap();
        iter.record(FeedError::Closed.into());
        iter.state = IterationState::Draining;

        assert!(iter.next().await);
        assert_eq!(n_of(&iter), 1);
        assert_eq!(iter.state(), IterationState::Draining);

        iter.close();
        iter.close();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(iter.state(), IterationState::Closed);
        assert!(!iter.next().await);
        assert!(matches!(iter.err(), Some(StreamError::Feed(FeedError::Closed))));
    }

    #[test]
    fn blocking_next_outside_runtime() {
        let feed = LogFeed::from_parts(vec![log(3)], None);
        let mut iter = EventIterator::new(feed, schema(), decoder());
        assert!(iter.blocking_next());
        assert_eq!(n_of(&iter), 3);
        assert!(!iter.blocking_next());
    }

    #[tokio::test]
    async fn stream_adapter_yields_error_last() {
        use futures::StreamExt;
        let feed = LogFeed::from_parts(vec![log(0), bad_log(1)], None);
        let items: Vec<_> = EventIterator::new(feed, schema(), decoder())
            .into_stream()
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].as_ref().unwrap_err().is_decode_error());
    }
}
