//! `LogFeed`: one ordered stream of raw logs stitched from a historical
//! backlog and a live tail.
//!
//! The live subscription is opened *before* the backlog query, so nothing
//! produced while the backlog is being fetched is lost. Live logs at or
//! below the backlog's last position are replays of the overlap and are
//! dropped (removed/reorg notices always pass through).

use chainwatch_core::{
    error::FeedError,
    event::{LogPosition, RawLog},
    source::{LiveSubscription, LogQuery, LogSource},
};
use std::collections::VecDeque;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, trace};

/// What the feed produced next.
#[derive(Debug)]
pub enum FeedEvent {
    Log(RawLog),
    /// The live subscription reported an error. Buffered logs may remain.
    Failed(FeedError),
    /// Backlog exhausted and the live tail (if any) ended cleanly.
    Finished,
}

#[derive(Debug)]
struct LiveTail {
    sub: LiveSubscription,
    logs_open: bool,
    errors_open: bool,
}

/// Backlog-then-live raw log feed for one query.
#[derive(Debug)]
pub struct LogFeed {
    backlog: VecDeque<RawLog>,
    /// Position of the last backlog log
    tip: Option<LogPosition>,
    live: Option<LiveTail>,
}

fn is_replayed(tip: Option<LogPosition>, log: &RawLog) -> bool {
    !log.removed && tip.is_some_and(|tip| log.position() <= tip)
}

impl LogFeed {
    /// Open a feed against `source`.
    ///
    /// Open-ended ranges get a live subscription; ranges with a start get a
    /// backlog. If the backlog query fails the live subscription is released.
    pub async fn open(source: &dyn LogSource, query: &LogQuery) -> Result<Self, FeedError> {
        let live = if query.range.is_open_ended() {
            Some(source.subscribe_live(query).await?)
        } else {
            None
        };
        let backlog = if query.range.has_backlog() {
            source.query_historical(query).await?
        } else {
            Vec::new()
        };

        debug!(
            source = source.name(),
            address = %query.address,
            backlog = backlog.len(),
            live = live.is_some(),
            "log feed opened"
        );
        Ok(Self::from_parts(backlog, live))
    }

    /// Assemble a feed from an already-fetched backlog and optional live
    /// subscription. The backlog is sorted by position.
    pub fn from_parts(mut backlog: Vec<RawLog>, live: Option<LiveSubscription>) -> Self {
        backlog.sort_by_key(RawLog::position);
        let tip = backlog.last().map(RawLog::position);
        Self {
            backlog: backlog.into(),
            tip,
            live: live.map(|sub| LiveTail {
                sub,
                logs_open: true,
                errors_open: true,
            }),
        }
    }

    /// Wait for the next feed event.
    ///
    /// Queued logs win over a simultaneously pending error, so every log
    /// that arrived before the failure is delivered first. Cancel-safe.
    pub async fn recv(&mut self) -> FeedEvent {
        if let Some(raw) = self.backlog.pop_front() {
            return FeedEvent::Log(raw);
        }
        let tip = self.tip;
        let Some(live) = self.live.as_mut() else {
            return FeedEvent::Finished;
        };

        loop {
            tokio::select! {
                biased;
                log = live.sub.logs.recv(), if live.logs_open => match log {
                    Some(raw) if is_replayed(tip, &raw) => {
                        trace!(position = %raw.position(), "dropping live log already in backlog");
                        continue;
                    }
                    Some(raw) => return FeedEvent::Log(raw),
                    None => live.logs_open = false,
                },
                err = live.sub.errors.recv(), if live.errors_open => match err {
                    Some(e) => return FeedEvent::Failed(e),
                    None => live.errors_open = false,
                },
                else => return FeedEvent::Finished,
            }
        }
    }

    /// Take the next log that is already buffered, without waiting.
    pub fn next_buffered(&mut self) -> Option<RawLog> {
        if let Some(raw) = self.backlog.pop_front() {
            return Some(raw);
        }
        let tip = self.tip;
        let live = self.live.as_mut()?;
        while live.logs_open {
            match live.sub.logs.try_recv() {
                Ok(raw) if is_replayed(tip, &raw) => continue,
                Ok(raw) => return Some(raw),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => live.logs_open = false,
            }
        }
        None
    }

    /// Wait for a live subscription error only.
    ///
    /// Never resolves if there is no live tail or its error channel closed
    /// without an error. Cancel-safe.
    pub async fn recv_error(&mut self) -> FeedError {
        if let Some(live) = self.live.as_mut() {
            if live.errors_open {
                match live.sub.errors.recv().await {
                    Some(e) => return e,
                    None => live.errors_open = false,
                }
            }
        }
        std::future::pending().await
    }

    /// Release the live subscription. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(live) = self.live.as_mut() {
            if !live.sub.unsubscriber.is_released() {
                debug!("releasing live subscription");
            }
            live.sub.unsubscriber.unsubscribe();
        }
    }

    /// Returns `true` if there is a live tail that has not been released.
    pub fn is_subscribed(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| !live.sub.unsubscriber.is_released())
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}
