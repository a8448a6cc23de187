//! Venue client facade
//!
//! The `VenueClient` trait is the seam between the trading core and the
//! venue: the engines, fill tracker, stop-loss executor, merge/split
//! service and market registry all depend on it, never on the concrete
//! REST client. Tests implement it with scripted mocks.

pub mod error;
pub mod rest;
pub mod signer;
pub mod types;
pub mod ws;

use async_trait::async_trait;
use error::Result;
use types::{
    MarketData, OpenOrder, OpenOrderFilter, OrderPlacement, OrderRequest, OrderbookData, Position,
    TxResult,
};

pub use error::{VenueError, ERRNO_INSUFFICIENT_BALANCE, ERRNO_REGION_BLOCKED};
pub use rest::{fetch_proxy_address, RestClient, DEFAULT_BASE_URL, DEFAULT_CHAIN_ID};
pub use signer::{OrderSigner, SignerError};
pub use ws::{run_market_stream, MarketStream, WsError, DEFAULT_WS_URL};

/// Typed request/response surface over the venue REST API.
#[async_trait]
pub trait VenueClient: Send + Sync {
    async fn get_orderbook(&self, token_id: &str) -> Result<OrderbookData>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderPlacement>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    async fn get_order(&self, order_id: &str) -> Result<OpenOrder>;

    async fn get_open_orders(&self, filter: &OpenOrderFilter) -> Result<Vec<OpenOrder>>;

    async fn get_positions(&self, market_id: Option<i64>) -> Result<Vec<Position>>;

    /// Quote-token balance available for trading.
    async fn get_balance(&self) -> Result<f64>;

    async fn get_market(&self, market_id: i64) -> Result<MarketData>;

    async fn get_categorical_market(&self, market_id: i64) -> Result<MarketData>;

    async fn get_markets(&self) -> Result<Vec<MarketData>>;

    /// Convert `shares` of YES + `shares` of NO back into quote tokens.
    async fn merge(&self, market_id: i64, shares: u64) -> Result<TxResult>;

    /// Convert `amount` quote tokens into `amount` YES + `amount` NO shares.
    async fn split(&self, market_id: i64, amount: u64) -> Result<TxResult>;

    /// Redeem winning shares after resolution.
    async fn redeem(&self, market_id: i64) -> Result<TxResult>;
}
