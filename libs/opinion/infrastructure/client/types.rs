//! Typed DTO layer over the venue wire formats
//!
//! Every consumer above the client sees these fixed-shape records. Fields the
//! venue sometimes omits are `Option` here and are normalized exactly once,
//! at this boundary.

use crate::domain::{OrderStatus, PriceLevel, Side};
use serde::{Deserialize, Serialize};

/// Uniform REST response envelope: `{errno, errmsg, result}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub errno: i64,
    #[serde(default)]
    pub errmsg: String,
    pub result: Option<T>,
}

/// Raw orderbook payload from `get_orderbook`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderbookData {
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

/// Outcome token attached to a market.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketToken {
    #[serde(rename = "tokenId")]
    pub token_id: String,
    #[serde(default)]
    pub ticker: Option<String>,
}

/// Market record as the venue returns it. Binary markets carry yes/no token
/// ids in one of several shapes; categorical markets carry child markets.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketData {
    #[serde(rename = "marketId")]
    pub market_id: i64,
    #[serde(rename = "marketTitle", default)]
    pub market_title: String,
    #[serde(rename = "yesTokenId", default)]
    pub yes_token_id: Option<String>,
    #[serde(rename = "noTokenId", default)]
    pub no_token_id: Option<String>,
    #[serde(default)]
    pub tokens: Vec<MarketToken>,
    #[serde(rename = "childMarkets", default)]
    pub child_markets: Vec<MarketData>,
    /// Trading cutoff, unix seconds.
    #[serde(rename = "cutoffAt", default)]
    pub cutoff_at: Option<i64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(rename = "conditionId", default)]
    pub condition_id: Option<String>,
}

/// Paged list wrapper used by `get_markets`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketListData {
    #[serde(default)]
    pub list: Vec<MarketData>,
}

/// An open (or recently closed) order as reported by the venue.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenOrder {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "tokenId", default)]
    pub token_id: String,
    #[serde(default = "default_side")]
    pub side: Side,
    pub price: String,
    #[serde(rename = "shares", default)]
    pub original_shares: u64,
    #[serde(rename = "filledShares", default)]
    pub filled_shares: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub fee: Option<f64>,
}

fn default_side() -> Side {
    Side::Buy
}

impl OpenOrder {
    pub fn price_f64(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }

    pub fn order_status(&self) -> OrderStatus {
        OrderStatus::parse(&self.status, self.filled_shares, self.original_shares)
    }
}

/// Filters for `get_open_orders`.
#[derive(Debug, Clone, Default)]
pub struct OpenOrderFilter {
    pub market_id: Option<i64>,
    pub token_id: Option<String>,
}

/// A held position.
#[derive(Debug, Clone, Deserialize)]
pub struct Position {
    #[serde(rename = "tokenId")]
    pub token_id: String,
    #[serde(rename = "marketId", default)]
    pub market_id: Option<i64>,
    #[serde(rename = "sharesOwned", default)]
    pub shares_owned: u64,
    #[serde(rename = "avgPrice", default)]
    pub avg_price: Option<f64>,
    #[serde(rename = "currentValue", default)]
    pub current_value: Option<f64>,
    #[serde(default)]
    pub cost: Option<f64>,
}

/// Order placement acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPlacement {
    #[serde(rename = "orderId")]
    pub order_id: String,
}

/// Result of a settlement-layer operation (merge / split / redeem).
#[derive(Debug, Clone, Deserialize)]
pub struct TxResult {
    #[serde(rename = "txHash", default)]
    pub tx_hash: String,
}

/// Order kind sent to the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

/// How much to trade: an exact share count or a quote-token budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderQuantity {
    Shares(u64),
    Quote(f64),
}

/// A fully specified order, ready for signing and submission.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Ignored for market orders.
    pub price: f64,
    pub quantity: OrderQuantity,
}

impl OrderRequest {
    pub fn limit_buy(token_id: impl Into<String>, price: f64, shares: u64) -> Self {
        Self {
            token_id: token_id.into(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price,
            quantity: OrderQuantity::Shares(shares),
        }
    }

    pub fn limit_sell(token_id: impl Into<String>, price: f64, shares: u64) -> Self {
        Self {
            token_id: token_id.into(),
            side: Side::Sell,
            order_type: OrderType::Limit,
            price,
            quantity: OrderQuantity::Shares(shares),
        }
    }

    pub fn market_sell(token_id: impl Into<String>, shares: u64) -> Self {
        Self {
            token_id: token_id.into(),
            side: Side::Sell,
            order_type: OrderType::Market,
            price: 0.0,
            quantity: OrderQuantity::Shares(shares),
        }
    }

    /// Fixed-point price string as the venue expects it.
    pub fn price_string(&self) -> String {
        format!("{:.4}", self.price)
    }

    pub fn shares(&self) -> Option<u64> {
        match self.quantity {
            OrderQuantity::Shares(s) => Some(s),
            OrderQuantity::Quote(_) => None,
        }
    }
}

// =============================================================================
// WebSocket wire types
// =============================================================================

pub const CHANNEL_DEPTH_DIFF: &str = "market.depth.diff";
pub const CHANNEL_LAST_TRADE: &str = "market.last.trade";
pub const CHANNEL_LAST_PRICE: &str = "market.last.price";

/// Single rung mutation: `size == 0` deletes the price level.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthDiff {
    #[serde(rename = "marketId")]
    pub market_id: i64,
    pub side: String,
    pub price: String,
    #[serde(default)]
    pub size: f64,
    /// 1 = YES, 2 = NO.
    #[serde(rename = "outcomeSide", default)]
    pub outcome_side: Option<u8>,
    #[serde(rename = "tokenId", default)]
    pub token_id: Option<String>,
}

impl DepthDiff {
    pub fn price_f64(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }
}

/// Last trade event on a market.
#[derive(Debug, Clone, Deserialize)]
pub struct LastTrade {
    #[serde(rename = "marketId")]
    pub market_id: i64,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub shares: f64,
    #[serde(rename = "outcomeSide", default)]
    pub outcome_side: Option<u8>,
    #[serde(rename = "orderId", default)]
    pub order_id: Option<String>,
}

/// Last price event on a market.
#[derive(Debug, Clone, Deserialize)]
pub struct LastPrice {
    #[serde(rename = "marketId")]
    pub market_id: i64,
    #[serde(rename = "yesPrice", default)]
    pub yes_price: f64,
    #[serde(rename = "noPrice", default)]
    pub no_price: f64,
}

/// Parsed WebSocket event, keyed by channel.
#[derive(Debug, Clone)]
pub enum WsEvent {
    Depth(DepthDiff),
    Trade(LastTrade),
    Price(LastPrice),
    Unknown(String),
}

/// Route a raw WebSocket text frame by its `channel` field.
pub fn parse_ws_event(text: &str) -> WsEvent {
    #[derive(Deserialize)]
    struct ChannelProbe {
        #[serde(default)]
        channel: String,
    }
    let channel = match serde_json::from_str::<ChannelProbe>(text) {
        Ok(probe) => probe.channel,
        Err(_) => return WsEvent::Unknown(text.to_string()),
    };
    match channel.as_str() {
        CHANNEL_DEPTH_DIFF => serde_json::from_str(text)
            .map(WsEvent::Depth)
            .unwrap_or_else(|_| WsEvent::Unknown(text.to_string())),
        CHANNEL_LAST_TRADE => serde_json::from_str(text)
            .map(WsEvent::Trade)
            .unwrap_or_else(|_| WsEvent::Unknown(text.to_string())),
        CHANNEL_LAST_PRICE => serde_json::from_str(text)
            .map(WsEvent::Price)
            .unwrap_or_else(|_| WsEvent::Unknown(text.to_string())),
        _ => WsEvent::Unknown(text.to_string()),
    }
}
