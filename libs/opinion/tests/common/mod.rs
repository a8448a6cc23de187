//! Scripted venue client shared by the integration tests.

use async_trait::async_trait;
use opinion::domain::{PriceLevel, Side};
use opinion::infrastructure::client::error::Result as VenueResult;
use opinion::infrastructure::client::types::*;
use opinion::infrastructure::client::{VenueClient, VenueError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub fn level(price: &str, size: &str) -> PriceLevel {
    PriceLevel {
        price: price.to_string(),
        size: size.to_string(),
    }
}

#[derive(Default)]
pub struct MockState {
    pub book: OrderbookData,
    pub orders: HashMap<String, OpenOrder>,
    pub placed: Vec<OrderRequest>,
    pub cancelled: Vec<String>,
    pub positions: HashMap<String, u64>,
    pub balance: f64,
    pub markets: HashMap<i64, MarketData>,
    pub next_order_id: u64,
    /// When set, every placed order is immediately fully filled.
    pub auto_fill: bool,
    /// Errors to serve (and consume) before `place_order` succeeds.
    pub place_failures: Vec<VenueError>,
    /// Errors to serve before merge/split/redeem succeed.
    pub settlement_failures: Vec<VenueError>,
    pub merge_calls: Vec<(i64, u64)>,
    pub split_calls: Vec<(i64, u64)>,
    pub orderbook_calls: u64,
}

pub struct MockVenue {
    pub state: Mutex<MockState>,
}

impl MockVenue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                balance: 1000.0,
                ..MockState::default()
            }),
        })
    }

    pub fn set_book(&self, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) {
        let mut state = self.state.lock();
        state.book = OrderbookData { bids, asks };
    }

    pub fn set_position(&self, token_id: &str, shares: u64) {
        self.state.lock().positions.insert(token_id.to_string(), shares);
    }

    pub fn set_market(&self, market: MarketData) {
        self.state.lock().markets.insert(market.market_id, market);
    }

    /// Mark `filled` shares executed on an order; status recomputes from the
    /// counts unless overridden.
    pub fn fill_order(&self, order_id: &str, filled: u64) {
        let mut state = self.state.lock();
        if let Some(order) = state.orders.get_mut(order_id) {
            order.filled_shares = filled;
        }
    }

    pub fn set_order_status(&self, order_id: &str, status: &str) {
        let mut state = self.state.lock();
        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = status.to_string();
        }
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.state.lock().placed.clone()
    }

    pub fn placed_on_side(&self, side: Side) -> Vec<OrderRequest> {
        self.state
            .lock()
            .placed
            .iter()
            .filter(|o| o.side == side)
            .cloned()
            .collect()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().cancelled.clone()
    }

    /// Order id of the resting order at `price` on `side`, if any.
    pub fn order_id_at(&self, side: Side, price: f64) -> Option<String> {
        self.state
            .lock()
            .orders
            .values()
            .find(|o| o.side == side && (o.price_f64() - price).abs() < 1e-9)
            .map(|o| o.order_id.clone())
    }
}

pub fn binary_market(market_id: i64, yes_token: &str, no_token: &str) -> MarketData {
    MarketData {
        market_id,
        market_title: format!("market {market_id}"),
        yes_token_id: Some(yes_token.to_string()),
        no_token_id: Some(no_token.to_string()),
        tokens: Vec::new(),
        child_markets: Vec::new(),
        cutoff_at: None,
        volume: None,
        condition_id: None,
    }
}

#[async_trait]
impl VenueClient for MockVenue {
    async fn get_orderbook(&self, _token_id: &str) -> VenueResult<OrderbookData> {
        let mut state = self.state.lock();
        state.orderbook_calls += 1;
        Ok(OrderbookData {
            bids: state.book.bids.clone(),
            asks: state.book.asks.clone(),
        })
    }

    async fn place_order(&self, order: &OrderRequest) -> VenueResult<OrderPlacement> {
        let mut state = self.state.lock();
        if !state.place_failures.is_empty() {
            return Err(state.place_failures.remove(0));
        }
        state.next_order_id += 1;
        let order_id = format!("o{}", state.next_order_id);
        let shares = order.shares().unwrap_or(0);
        let auto_fill = state.auto_fill;
        state.orders.insert(
            order_id.clone(),
            OpenOrder {
                order_id: order_id.clone(),
                token_id: order.token_id.clone(),
                side: order.side,
                price: order.price_string(),
                original_shares: shares,
                filled_shares: if auto_fill { shares } else { 0 },
                status: "live".into(),
                fee: None,
            },
        );
        state.placed.push(order.clone());
        Ok(OrderPlacement { order_id })
    }

    async fn cancel_order(&self, order_id: &str) -> VenueResult<()> {
        let mut state = self.state.lock();
        state.cancelled.push(order_id.to_string());
        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = "cancelled".into();
        }
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> VenueResult<OpenOrder> {
        self.state
            .lock()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| VenueError::NotFound(order_id.to_string()))
    }

    async fn get_open_orders(&self, filter: &OpenOrderFilter) -> VenueResult<Vec<OpenOrder>> {
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .filter(|o| {
                filter
                    .token_id
                    .as_deref()
                    .map_or(true, |t| o.token_id == t)
            })
            .cloned()
            .collect())
    }

    async fn get_positions(&self, _market_id: Option<i64>) -> VenueResult<Vec<Position>> {
        Ok(self
            .state
            .lock()
            .positions
            .iter()
            .map(|(token_id, &shares)| Position {
                token_id: token_id.clone(),
                market_id: None,
                shares_owned: shares,
                avg_price: None,
                current_value: None,
                cost: None,
            })
            .collect())
    }

    async fn get_balance(&self) -> VenueResult<f64> {
        Ok(self.state.lock().balance)
    }

    async fn get_market(&self, market_id: i64) -> VenueResult<MarketData> {
        self.state
            .lock()
            .markets
            .get(&market_id)
            .cloned()
            .ok_or_else(|| VenueError::NotFound(format!("market {market_id}")))
    }

    async fn get_categorical_market(&self, market_id: i64) -> VenueResult<MarketData> {
        Err(VenueError::NotFound(format!("categorical {market_id}")))
    }

    async fn get_markets(&self) -> VenueResult<Vec<MarketData>> {
        Ok(self.state.lock().markets.values().cloned().collect())
    }

    async fn merge(&self, market_id: i64, shares: u64) -> VenueResult<TxResult> {
        let mut state = self.state.lock();
        if !state.settlement_failures.is_empty() {
            return Err(state.settlement_failures.remove(0));
        }
        state.merge_calls.push((market_id, shares));
        // Burn the pair, credit the quote.
        if let Some(market) = state.markets.get(&market_id).cloned() {
            for token in [market.yes_token_id, market.no_token_id].into_iter().flatten() {
                if let Some(held) = state.positions.get_mut(&token) {
                    *held = held.saturating_sub(shares);
                }
            }
        }
        state.balance += shares as f64;
        Ok(TxResult {
            tx_hash: format!("0xmerge{market_id}"),
        })
    }

    async fn split(&self, market_id: i64, amount: u64) -> VenueResult<TxResult> {
        let mut state = self.state.lock();
        if !state.settlement_failures.is_empty() {
            return Err(state.settlement_failures.remove(0));
        }
        state.split_calls.push((market_id, amount));
        if let Some(market) = state.markets.get(&market_id).cloned() {
            for token in [market.yes_token_id, market.no_token_id].into_iter().flatten() {
                *state.positions.entry(token).or_insert(0) += amount;
            }
        }
        state.balance -= amount as f64;
        Ok(TxResult {
            tx_hash: format!("0xsplit{market_id}"),
        })
    }

    async fn redeem(&self, market_id: i64) -> VenueResult<TxResult> {
        let mut state = self.state.lock();
        if !state.settlement_failures.is_empty() {
            return Err(state.settlement_failures.remove(0));
        }
        Ok(TxResult {
            tx_hash: format!("0xredeem{market_id}"),
        })
    }
}
