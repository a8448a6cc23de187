//! WebSocket stream for market data
//!
//! One authenticated connection per session. Subscriptions go out as
//! `{"action":"SUBSCRIBE","channel":...,"marketId":...}` envelopes; an
//! application-layer `{"action":"HEARTBEAT"}` is emitted every 25 seconds.
//! The receive loop uses a short deadline so heartbeat and shutdown checks
//! interleave with reads, and depth diffs are dispatched straight into the
//! orderbook registry.

use super::types::{
    parse_ws_event, LastTrade, WsEvent, CHANNEL_DEPTH_DIFF, CHANNEL_LAST_PRICE, CHANNEL_LAST_TRADE,
};
use crate::infrastructure::orderbook_manager::OrderbookRegistry;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub const DEFAULT_WS_URL: &str = "wss://ws.opinion.trade";

/// Application-layer heartbeat cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
/// Receive deadline; bounds how long heartbeats and shutdown wait.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);
/// Pause before a reconnect attempt.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum WsError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("stream closed")]
    Closed,
}

type Result<T> = std::result::Result<T, WsError>;

/// Thin wrapper over one WebSocket connection.
pub struct MarketStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl MarketStream {
    /// Connect, authenticating with the API key query parameter.
    pub async fn connect(base_url: &str, api_key: &str) -> Result<Self> {
        let url = format!("{base_url}?apikey={api_key}");
        let (ws, _) = connect_async(&url)
            .await
            .map_err(|e| WsError::Connect(e.to_string()))?;
        info!("websocket connected");
        Ok(Self { ws })
    }

    async fn send_json(&mut self, value: serde_json::Value) -> Result<()> {
        self.ws
            .send(Message::Text(value.to_string()))
            .await
            .map_err(|e| WsError::Send(e.to_string()))
    }

    pub async fn subscribe(&mut self, channel: &str, market_id: i64) -> Result<()> {
        self.send_json(json!({
            "action": "SUBSCRIBE",
            "channel": channel,
            "marketId": market_id,
        }))
        .await?;
        debug!(channel, market_id, "subscribed");
        Ok(())
    }

    pub async fn unsubscribe(&mut self, channel: &str, market_id: i64) -> Result<()> {
        self.send_json(json!({
            "action": "UNSUBSCRIBE",
            "channel": channel,
            "marketId": market_id,
        }))
        .await
    }

    pub async fn send_heartbeat(&mut self) -> Result<()> {
        self.send_json(json!({ "action": "HEARTBEAT" })).await
    }

    /// Receive the next event. `Ok(None)` means the deadline elapsed or a
    /// non-data frame arrived; `Err(Closed)` means the connection is gone.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Option<WsEvent>> {
        match tokio::time::timeout(timeout, self.ws.next()).await {
            Err(_) => Ok(None),
            Ok(None) => Err(WsError::Closed),
            Ok(Some(Err(_))) => Err(WsError::Closed),
            Ok(Some(Ok(Message::Text(text)))) => Ok(Some(parse_ws_event(&text))),
            Ok(Some(Ok(Message::Ping(payload)))) => {
                let _ = self.ws.send(Message::Pong(payload)).await;
                Ok(None)
            }
            Ok(Some(Ok(Message::Close(_)))) => Err(WsError::Closed),
            Ok(Some(Ok(_))) => Ok(None),
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Run the market data stream until `running` is cleared.
///
/// Connects, subscribes depth/trade/price for every market, then pumps
/// events: depth diffs go to the registry, trades to the optional channel.
/// Reconnects with a bounded delay if the venue drops the connection.
pub async fn run_market_stream(
    base_url: &str,
    api_key: &str,
    market_ids: &[i64],
    registry: Arc<OrderbookRegistry>,
    trade_tx: Option<UnboundedSender<LastTrade>>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Acquire) {
        let mut stream = match MarketStream::connect(base_url, api_key).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "websocket connect failed, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        let mut subscribed = true;
        for &market_id in market_ids {
            for channel in [CHANNEL_DEPTH_DIFF, CHANNEL_LAST_TRADE, CHANNEL_LAST_PRICE] {
                if let Err(e) = stream.subscribe(channel, market_id).await {
                    warn!(error = %e, market_id, channel, "subscribe failed");
                    subscribed = false;
                    break;
                }
            }
        }
        if !subscribed {
            tokio::time::sleep(RECONNECT_DELAY).await;
            continue;
        }

        let mut last_heartbeat = Instant::now();
        loop {
            if !running.load(Ordering::Acquire) {
                stream.close().await;
                info!("websocket stopped");
                return;
            }

            if last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
                if let Err(e) = stream.send_heartbeat().await {
                    warn!(error = %e, "heartbeat failed, reconnecting");
                    break;
                }
                last_heartbeat = Instant::now();
            }

            match stream.recv(RECV_TIMEOUT).await {
                Ok(Some(WsEvent::Depth(diff))) => registry.dispatch(&diff),
                Ok(Some(WsEvent::Trade(trade))) => {
                    if let Some(tx) = &trade_tx {
                        let _ = tx.send(trade);
                    }
                }
                Ok(Some(WsEvent::Price(price))) => {
                    debug!(
                        market_id = price.market_id,
                        yes = price.yes_price,
                        no = price.no_price,
                        "last price"
                    );
                }
                Ok(Some(WsEvent::Unknown(text))) => {
                    debug!(message = %text, "unrecognized websocket message");
                }
                Ok(None) => {}
                Err(_) => {
                    warn!("websocket connection lost, reconnecting");
                    break;
                }
            }
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
