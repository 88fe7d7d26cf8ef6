//! `WsLogSource`: [`LogSource`] over an Ethereum JSON-RPC WebSocket.
//!
//! - backlog: `eth_getLogs` on a short-lived connection
//! - live tail: `eth_subscribe("logs", filter)` on a dedicated connection
//!   driven by its own task; releasing the subscription sends
//!   `eth_unsubscribe` and closes the socket
//!
//! No reconnection: a dropped socket is reported once on the error channel.

use alloy_primitives::{Address, Bytes, B256, U64};
use async_trait::async_trait;
use chainwatch_core::{
    error::FeedError,
    event::RawLog,
    source::{LiveSubscription, LogQuery, LogSource, Unsubscriber},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsLogSource {
    url: String,
    live_buffer: usize,
    next_id: AtomicU64,
}

impl WsLogSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            live_buffer: 512,
            next_id: AtomicU64::new(1),
        }
    }

    /// Capacity of the live log channel. A slow consumer applies
    /// backpressure to the socket reader once it fills.
    pub fn with_live_buffer(mut self, live_buffer: usize) -> Self {
        self.live_buffer = live_buffer.max(1);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn connect(&self) -> Result<WsStream, FeedError> {
        match connect_async(self.url.as_str()).await {
            Ok((ws, _)) => {
                debug!(url = %self.url, "websocket connected");
                Ok(ws)
            }
            Err(e) => {
                error!(url = %self.url, error = %e, "websocket connect failed");
                Err(FeedError::ConnectionFailed {
                    url: self.url.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Send one request and wait for the response carrying the same id.
    async fn call(
        &self,
        ws: &mut WsStream,
        method: &str,
        params: Value,
    ) -> Result<Value, FeedError> {
        let id = self.request_id();
        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        ws.send(Message::Text(request.to_string()))
            .await
            .map_err(|e| self.socket_error(e))?;

        while let Some(msg) = ws.next().await {
            match msg.map_err(|e| self.socket_error(e))? {
                Message::Text(text) => {
                    let response: Value = serde_json::from_str(&text)?;
                    if response.get("id").and_then(Value::as_u64) == Some(id) {
                        return rpc_result(response);
                    }
                }
                Message::Ping(data) => {
                    let _ = ws.send(Message::Pong(data)).await;
                }
                Message::Close(_) => return Err(FeedError::Closed),
                _ => {}
            }
        }
        Err(FeedError::Closed)
    }

    fn socket_error(&self, e: impl std::fmt::Display) -> FeedError {
        FeedError::ConnectionFailed {
            url: self.url.clone(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl LogSource for WsLogSource {
    async fn query_historical(&self, query: &LogQuery) -> Result<Vec<RawLog>, FeedError> {
        let mut ws = self.connect().await?;
        let result = self
            .call(&mut ws, "eth_getLogs", json!([rpc_filter(query, true)]))
            .await;
        let _ = ws.close(None).await;

        let rpc_logs: Vec<RpcLog> = serde_json::from_value(result?)?;
        let mut logs: Vec<RawLog> = rpc_logs.into_iter().map(RawLog::from).collect();
        logs.sort_by_key(RawLog::position);
        info!(url = %self.url, address = %query.address, count = logs.len(), "backlog fetched");
        Ok(logs)
    }

    async fn subscribe_live(&self, query: &LogQuery) -> Result<LiveSubscription, FeedError> {
        let mut ws = self.connect().await?;
        let result = self
            .call(&mut ws, "eth_subscribe", json!(["logs", rpc_filter(query, false)]))
            .await?;
        let sub_id = result
            .as_str()
            .ok_or_else(|| FeedError::Deserialization(format!("subscription id: {result}")))?
            .to_string();
        info!(url = %self.url, subscription = %sub_id, "live subscription opened");

        let (log_tx, log_rx) = mpsc::channel(self.live_buffer);
        let (err_tx, err_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(run_live(
            ws,
            self.url.clone(),
            sub_id,
            self.request_id(),
            log_tx,
            err_tx,
            stop_rx,
        ));

        let unsubscriber = Unsubscriber::new(move || {
            let _ = stop_tx.send(());
        });
        Ok(LiveSubscription::new(log_rx, err_rx, unsubscriber))
    }

    fn name(&self) -> &str {
        &self.url
    }
}

// ─── Live subscription loop ───────────────────────────────────────────────────

async fn run_live(
    mut ws: WsStream,
    url: String,
    sub_id: String,
    unsubscribe_id: u64,
    logs: mpsc::Sender<RawLog>,
    errors: mpsc::Sender<FeedError>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop => break,
            msg = ws.next() => match msg {
                None => {
                    warn!(url = %url, "websocket stream ended");
                    let _ = errors.send(FeedError::Closed).await;
                    return;
                }
                Some(Err(e)) => {
                    warn!(url = %url, error = %e, "websocket error");
                    let _ = errors
                        .send(FeedError::ConnectionFailed { url: url.clone(), reason: e.to_string() })
                        .await;
                    return;
                }
                Some(Ok(Message::Text(text))) => match parse_notification(&text, &sub_id) {
                    Some(Ok(raw)) => {
                        tokio::select! {
                            _ = &mut stop => break,
                            sent = logs.send(raw) => if sent.is_err() { break },
                        }
                    }
                    Some(Err(e)) => {
                        error!(url = %url, error = %e, "malformed subscription message");
                        let _ = errors.send(e).await;
                        return;
                    }
                    None => {}
                },
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    info!(url = %url, "websocket closed by server");
                    let _ = errors.send(FeedError::Closed).await;
                    return;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    let request = json!({
        "jsonrpc": "2.0",
        "id": unsubscribe_id,
        "method": "eth_unsubscribe",
        "params": [sub_id],
    });
    if let Err(e) = ws.send(Message::Text(request.to_string())).await {
        debug!(url = %url, error = %e, "eth_unsubscribe not sent");
    }
    let _ = ws.close(None).await;
    info!(url = %url, subscription = %sub_id, "live subscription released");
}

// ─── JSON-RPC shapes ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    #[serde(default)]
    block_number: Option<U64>,
    #[serde(default)]
    transaction_index: Option<U64>,
    #[serde(default)]
    log_index: Option<U64>,
    #[serde(default)]
    removed: bool,
    #[serde(default)]
    transaction_hash: Option<B256>,
    #[serde(default)]
    block_hash: Option<B256>,
}

impl From<RpcLog> for RawLog {
    fn from(log: RpcLog) -> Self {
        let quantity = |q: Option<U64>| q.map_or(0, |v| v.to::<u64>());
        RawLog {
            address: log.address,
            topics: log.topics,
            data: log.data,
            block_number: quantity(log.block_number),
            transaction_index: quantity(log.transaction_index),
            log_index: quantity(log.log_index),
            removed: log.removed,
            transaction_hash: log.transaction_hash,
            block_hash: log.block_hash,
        }
    }
}

/// Build the `eth_getLogs` / `eth_subscribe` filter object.
fn rpc_filter(query: &LogQuery, with_range: bool) -> Value {
    let mut filter = json!({
        "address": format!("{:#x}", query.address),
        "topics": query.filter.to_rpc_topics(),
    });
    if with_range {
        filter["fromBlock"] = block_tag(query.range.from, "earliest");
        filter["toBlock"] = block_tag(query.range.to, "latest");
    }
    filter
}

fn block_tag(block: Option<u64>, default: &str) -> Value {
    match block {
        Some(n) => Value::String(format!("0x{n:x}")),
        None => Value::String(default.to_string()),
    }
}

fn rpc_result(mut response: Value) -> Result<Value, FeedError> {
    if let Some(err) = response.get("error") {
        return Err(FeedError::Rpc {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    Ok(response.get_mut("result").map(Value::take).unwrap_or(Value::Null))
}

/// Parse an `eth_subscription` notification for `sub_id`.
/// Returns `None` for anything else (other subscriptions, stray responses).
fn parse_notification(text: &str, sub_id: &str) -> Option<Result<RawLog, FeedError>> {
    let mut v: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Some(Err(e.into())),
    };
    if v.get("method")?.as_str()? != "eth_subscription" {
        return None;
    }
    let params = v.get_mut("params")?;
    if params.get("subscription")?.as_str()? != sub_id {
        return None;
    }
    let result = params.get_mut("result")?.take();
    Some(
        serde_json::from_value::<RpcLog>(result)
            .map(RawLog::from)
            .map_err(FeedError::from),
    )
}
