//! Push-style consumption: a forwarder loop that decodes each raw log and
//! sends it into a caller-provided sink.
//!
//! Termination:
//! - cancel signal fired → `Ok(())`
//! - live subscription error → `Err(StreamError::Feed)`
//! - decode failure → `Err(StreamError::Decode)`
//! - feed ended cleanly, or the sink's receiver was dropped → `Ok(())`
//!
//! The live subscription is released exactly once on every one of these
//! paths (and on drop, if the future is abandoned mid-flight).

use crate::cancel::CancelSignal;
use crate::feed::{FeedEvent, LogFeed};
use chainwatch_core::{
    decoder::LogDecoder,
    error::{FeedError, StreamError},
    event::DecodedEvent,
    schema::EventSchema,
};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// Forward decoded events from `feed` into `sink` until one of the
/// termination conditions above.
///
/// While a send is blocked on a full sink, cancellation and subscription
/// errors are still observed.
pub async fn watch(
    mut feed: LogFeed,
    schema: Arc<EventSchema>,
    decoder: Arc<dyn LogDecoder>,
    sink: mpsc::Sender<DecodedEvent>,
    cancel: CancelSignal,
) -> Result<(), StreamError> {
    let result = forward(&mut feed, &schema, decoder.as_ref(), &sink, &cancel).await;
    feed.unsubscribe();
    match &result {
        Ok(()) => debug!(event = %schema.name, "watch finished"),
        Err(e) => warn!(event = %schema.name, error = %e, "watch terminated"),
    }
    result
}

async fn forward(
    feed: &mut LogFeed,
    schema: &Arc<EventSchema>,
    decoder: &dyn LogDecoder,
    sink: &mpsc::Sender<DecodedEvent>,
    cancel: &CancelSignal,
) -> Result<(), StreamError> {
    let mut forwarded = 0u64;
    loop {
        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(event = %schema.name, forwarded, "watch cancelled");
                return Ok(());
            }
            next = feed.recv() => match next {
                FeedEvent::Log(raw) => raw,
                FeedEvent::Failed(err) => return Err(err.into()),
                FeedEvent::Finished => {
                    info!(event = %schema.name, forwarded, "log feed ended");
                    return Ok(());
                }
            },
        };

        let event = decoder.decode(&raw, schema).map_err(|e| {
            error!(
                event = %schema.name,
                position = %raw.position(),
                error = %e,
                "failed to decode log"
            );
            e
        })?;

        let position = event.position();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(event = %schema.name, forwarded, "watch cancelled during send");
                return Ok(());
            }
            sent = sink.send(event) => {
                if sent.is_err() {
                    info!(event = %schema.name, forwarded, "sink receiver dropped");
                    return Ok(());
                }
                forwarded += 1;
                debug!(event = %schema.name, %position, "event forwarded");
            }
            err = feed.recv_error() => return Err(err.into()),
        }
    }
}

// ─── Spawned watch ────────────────────────────────────────────────────────────

/// Handle to a forwarder running on its own Tokio task.
///
/// Dropping the handle cancels the forwarder.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: CancelSignal,
    task: Option<JoinHandle<Result<(), StreamError>>>,
}

impl WatchHandle {
    pub(crate) fn new(cancel: CancelSignal, task: JoinHandle<Result<(), StreamError>>) -> Self {
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Ask the forwarder to stop. Idempotent; returns immediately.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the forwarder to terminate and return its outcome.
    pub async fn wait(mut self) -> Result<(), StreamError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) => Err(FeedError::Other(format!("watch task failed: {e}")).into()),
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel.cancel();
        }
    }
}

/// Run [`watch`] on a new Tokio task.
pub fn spawn_watch(
    feed: LogFeed,
    schema: Arc<EventSchema>,
    decoder: Arc<dyn LogDecoder>,
    sink: mpsc::Sender<DecodedEvent>,
) -> WatchHandle {
    let cancel = CancelSignal::new();
    let task = tokio::spawn(watch(feed, schema, decoder, sink, cancel.clone()));
    WatchHandle::new(cancel, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes};
    use chainwatch_core::error::DecodeError;
    use chainwatch_core::event::RawLog;
    use chainwatch_core::source::{LiveSubscription, Unsubscriber};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn decoder() -> Arc<dyn LogDecoder> {
        Arc::new(|raw: &RawLog, schema: &Arc<EventSchema>| {
            if raw.topics.is_empty() {
                return Err(DecodeError::TopicCountMismatch { expected: 1, got: 0 });
            }
            Ok(DecodedEvent {
                schema: Arc::clone(schema),
                fields: Default::default(),
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
            block_number: 10,
            transaction_index: 0,
            log_index: n,
            removed: false,
            transaction_hash: None,
            block_hash: None,
        }
    }

    struct Live {
        logs: mpsc::Sender<RawLog>,
        errors: mpsc::Sender<FeedError>,
        released: Arc<AtomicUsize>,
    }

    fn live_feed() -> (Live, LogFeed) {
        let (log_tx, log_rx) = mpsc::channel(16);
        let (err_tx, err_rx) = mpsc::channel(1);
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let sub = LiveSubscription::new(
            log_rx,
            err_rx,
            Unsubscriber::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let live = Live {
            logs: log_tx,
            errors: err_tx,
            released,
        };
        (live, LogFeed::from_parts(vec![], Some(sub)))
    }

    #[tokio::test]
    async fn cancel_during_blocked_send() {
        let (live, feed) = live_feed();
        live.logs.send(log(0)).await.unwrap();
        live.logs.send(log(1)).await.unwrap();

        // capacity 1 and never read: the second send blocks
        let (sink_tx, _sink_rx) = mpsc::channel(1);
        let cancel = CancelSignal::new();
        let task = tokio::spawn(watch(feed, schema(), decoder(), sink_tx, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("forwarder stuck on full sink")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(live.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_during_blocked_send() {
        let (live, feed) = live_feed();
        live.logs.send(log(0)).await.unwrap();
        live.logs.send(log(1)).await.unwrap();

        let (sink_tx, _sink_rx) = mpsc::channel(1);
        let task = tokio::spawn(watch(feed, schema(), decoder(), sink_tx, CancelSignal::new()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        live.errors.send(FeedError::Closed).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("forwarder stuck on full sink")
            .unwrap();
        assert!(matches!(result, Err(StreamError::Feed(FeedError::Closed))));
        assert_eq!(live.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_sink_is_clean_exit() {
        let (live, feed) = live_feed();
        live.logs.send(log(0)).await.unwrap();
        let (sink_tx, sink_rx) = mpsc::channel(4);
        drop(sink_rx);

        let result = watch(feed, schema(), decoder(), sink_tx, CancelSignal::new()).await;
        assert!(result.is_ok());
        assert_eq!(live.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn decode_failure_terminates() {
        let (live, feed) = live_feed();
        let mut bad = log(0);
        bad.topics.clear();
        live.logs.send(bad).await.unwrap();
        let (sink_tx, mut sink_rx) = mpsc::channel(4);

        let result = watch(feed, schema(), decoder(), sink_tx, CancelSignal::new()).await;
        assert!(result.unwrap_err().is_decode_error());
        assert!(sink_rx.recv().await.is_none());
        assert_eq!(live.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handle_unsubscribe_and_wait() {
        let (live, feed) = live_feed();
        let (sink_tx, mut sink_rx) = mpsc::channel(4);
        let handle = spawn_watch(feed, schema(), decoder(), sink_tx);

        live.logs.send(log(5)).await.unwrap();
        let got = sink_rx.recv().await.unwrap();
        assert_eq!(got.raw.log_index, 5);

        handle.unsubscribe();
        handle.unsubscribe();
        assert!(handle.wait().await.is_ok());
        assert_eq!(live.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_handle_cancels() {
        let (live, feed) = live_feed();
        let (sink_tx, mut sink_rx) = mpsc::channel(4);
        drop(spawn_watch(feed, schema(), decoder(), sink_tx));

        // forwarder exits and drops its sender
        let closed = tokio::time::timeout(Duration::from_secs(1), sink_rx.recv()).await;
        assert!(matches!(closed, Ok(None)));
        assert_eq!(live.released.load(Ordering::SeqCst), 1);
    }
}
