//! `EventEngine`: binds a log source and a decoder, and opens iterators
//! and watches for contract events.

use crate::cancel::CancelSignal;
use crate::feed::LogFeed;
use crate::forwarder::{self, WatchHandle};
use crate::iterator::EventIterator;
use alloy_primitives::Address;
use chainwatch_core::{
    decoder::LogDecoder,
    error::StreamError,
    event::DecodedEvent,
    filter::{BlockRange, FilterSpec},
    schema::EventSchema,
    source::{LogQuery, LogSource},
    typed::TypedEvent,
};
use chainwatch_evm::EvmDecoder;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Entry point for filtering, iterating and watching contract events.
///
/// # Usage
/// ```no_run
/// # async fn example() -> Result<(), chainwatch_core::StreamError> {
/// use chainwatch_core::{BlockRange, EventSchema, FilterSpec};
/// use chainwatch_stream::{EventEngine, WsLogSource};
/// use std::sync::Arc;
///
/// let engine = EventEngine::new(Arc::new(WsLogSource::new("ws://localhost:8546")));
/// let schema = Arc::new(
///     EventSchema::parse_signature("Transfer(address indexed from, address indexed to, uint256 value)")
///         .expect("valid declaration"),
/// );
/// let mut iter = engine
///     .iterator("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".parse().expect("address"),
///               FilterSpec::any(), schema, BlockRange::from_block(19_000_000))
///     .await?;
/// while iter.next().await {
///     println!("{:?}", iter.event());
/// }
/// iter.close();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EventEngine {
    source: Arc<dyn LogSource>,
    decoder: Arc<dyn LogDecoder>,
}

impl EventEngine {
    /// Engine with the ABI decoder.
    pub fn new(source: Arc<dyn LogSource>) -> Self {
        Self {
            source,
            decoder: Arc::new(EvmDecoder::new()),
        }
    }

    /// Swap in a different decoder.
    pub fn with_decoder(mut self, decoder: Arc<dyn LogDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn source(&self) -> &Arc<dyn LogSource> {
        &self.source
    }

    pub fn decoder(&self) -> &Arc<dyn LogDecoder> {
        &self.decoder
    }

    /// Open the raw feed for one contract event. The filter's signature
    /// position is pinned to `schema`.
    pub async fn open_feed(
        &self,
        address: Address,
        filter: FilterSpec,
        schema: &EventSchema,
        range: BlockRange,
    ) -> Result<LogFeed, StreamError> {
        let query = LogQuery::new(address, filter.for_event(schema), range);
        info!(
            source = self.source.name(),
            event = %schema.name,
            address = %address,
            from = ?range.from,
            to = ?range.to,
            "opening log feed"
        );
        Ok(LogFeed::open(self.source.as_ref(), &query).await?)
    }

    /// Pull-style: an iterator over decoded events.
    pub async fn iterator(
        &self,
        address: Address,
        filter: FilterSpec,
        schema: Arc<EventSchema>,
        range: BlockRange,
    ) -> Result<EventIterator, StreamError> {
        let feed = self.open_feed(address, filter, &schema, range).await?;
        Ok(EventIterator::new(feed, schema, Arc::clone(&self.decoder)))
    }

    /// Pull-style over a domain type: the schema comes from `T` and every
    /// decoded event is mapped through [`TypedEvent::from_decoded`].
    ///
    /// The stream ends after its first error, including a field that does
    /// not map onto `T`.
    pub async fn typed_stream<T>(
        &self,
        address: Address,
        filter: FilterSpec,
        range: BlockRange,
    ) -> Result<impl Stream<Item = Result<T, StreamError>> + Send, StreamError>
    where
        T: TypedEvent + Send + 'static,
    {
        let iter = self
            .iterator(address, filter, Arc::new(T::schema()), range)
            .await?;
        let events = Box::pin(iter.into_stream());
        Ok(futures::stream::unfold(Some(events), |events| async move {
            let mut events = events?;
            match events.next().await? {
                Ok(event) => match event.typed::<T>() {
                    Ok(typed) => Some((Ok(typed), Some(events))),
                    Err(e) => Some((Err(e.into()), None)),
                },
                Err(e) => Some((Err(e), None)),
            }
        }))
    }

    /// Push-style: forward decoded events into `sink` until cancelled,
    /// the feed fails or ends, a log fails to decode, or the sink closes.
    ///
    /// A cancel that fires while the feed is still opening returns `Ok(())`.
    pub async fn watch(
        &self,
        address: Address,
        filter: FilterSpec,
        schema: Arc<EventSchema>,
        range: BlockRange,
        sink: mpsc::Sender<DecodedEvent>,
        cancel: CancelSignal,
    ) -> Result<(), StreamError> {
        let feed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            feed = self.open_feed(address, filter, &schema, range) => feed?,
        };
        forwarder::watch(feed, schema, Arc::clone(&self.decoder), sink, cancel).await
    }

    /// [`watch`](Self::watch) on its own Tokio task.
    pub fn spawn_watch(
        &self,
        address: Address,
        filter: FilterSpec,
        schema: Arc<EventSchema>,
        range: BlockRange,
        sink: mpsc::Sender<DecodedEvent>,
    ) -> WatchHandle {
        let cancel = CancelSignal::new();
        let engine = self.clone();
        let signal = cancel.clone();
        let task = tokio::spawn(async move {
            engine
                .watch(address, filter, schema, range, sink, signal)
                .await
        });
        WatchHandle::new(cancel, task)
    }
}

impl std::fmt::Debug for EventEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEngine")
            .field("source", &self.source.name())
            .finish()
    }
}
