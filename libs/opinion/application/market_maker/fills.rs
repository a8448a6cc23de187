//! Fill detection
//!
//! Watches tracked order ids and turns cumulative `filled_shares` growth
//! into incremental fill events. Events are idempotent against the
//! cumulative count: re-delivering the same cumulative value produces no
//! event, and `filled_shares` is only ever allowed to grow.
//!
//! Polling mode asks the venue for each order's status once per tick.
//! Streaming mode feeds last-trade events from the WebSocket; both paths
//! converge on the same cumulative bookkeeping. The order's limit price is
//! authoritative for the execution price.

use crate::domain::{OrderStatus, Side};
use crate::infrastructure::client::types::LastTrade;
use crate::infrastructure::client::{VenueClient, VenueError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One incremental execution on a tracked order.
#[derive(Debug, Clone)]
pub struct FillEvent {
    pub order_id: String,
    pub side: Side,
    pub price: f64,
    pub delta_shares: u64,
    pub cumulative_shares: u64,
    pub fee: f64,
}

/// Result of one polling pass.
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub fills: Vec<FillEvent>,
    /// Orders that reached FILLED this pass (and were untracked).
    pub completed: Vec<String>,
    /// Orders that reached CANCELLED this pass (and were untracked).
    pub cancelled: Vec<String>,
}

#[derive(Debug, Clone)]
struct WatchedOrder {
    side: Side,
    price: f64,
    last_filled: u64,
}

pub struct FillTracker {
    client: Arc<dyn VenueClient>,
    watched: HashMap<String, WatchedOrder>,
}

impl FillTracker {
    pub fn new(client: Arc<dyn VenueClient>) -> Self {
        Self {
            client,
            watched: HashMap::new(),
        }
    }

    /// Start watching an order. The limit price given here is what fill
    /// events will report.
    pub fn track(&mut self, order_id: &str, side: Side, price: f64) {
        self.watched.insert(
            order_id.to_string(),
            WatchedOrder {
                side,
                price,
                last_filled: 0,
            },
        );
    }

    pub fn untrack(&mut self, order_id: &str) {
        self.watched.remove(order_id);
    }

    pub fn is_tracked(&self, order_id: &str) -> bool {
        self.watched.contains_key(order_id)
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        self.watched.keys().cloned().collect()
    }

    /// Advance the cumulative count for an order; returns the (positive)
    /// delta, or None for duplicates and regressions.
    fn advance(&mut self, order_id: &str, cumulative: u64) -> Option<FillEvent> {
        let watched = self.watched.get_mut(order_id)?;
        if cumulative <= watched.last_filled {
            return None;
        }
        let delta = cumulative - watched.last_filled;
        watched.last_filled = cumulative;
        Some(FillEvent {
            order_id: order_id.to_string(),
            side: watched.side,
            price: watched.price,
            delta_shares: delta,
            cumulative_shares: cumulative,
            fee: 0.0,
        })
    }

    /// Poll every tracked order once.
    pub async fn poll(&mut self) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        for order_id in self.tracked_ids() {
            let order = match self.client.get_order(&order_id).await {
                Ok(order) => order,
                Err(VenueError::NotFound(_)) => {
                    // The venue forgot it; assume cancelled elsewhere.
                    warn!(order_id = %order_id, "tracked order vanished from venue");
                    self.untrack(&order_id);
                    outcome.cancelled.push(order_id);
                    continue;
                }
                Err(e) => {
                    debug!(order_id = %order_id, error = %e, "order status poll failed");
                    continue;
                }
            };
            if let Some(mut event) = self.advance(&order_id, order.filled_shares) {
                event.fee = order.fee.unwrap_or(0.0);
                outcome.fills.push(event);
            }
            match order.order_status() {
                OrderStatus::Filled => {
                    self.untrack(&order_id);
                    outcome.completed.push(order_id);
                }
                OrderStatus::Cancelled => {
                    self.untrack(&order_id);
                    outcome.cancelled.push(order_id);
                }
                _ => {}
            }
        }
        outcome
    }

    /// Streaming mode: fold a last-trade event into the tracker if it names
    /// one of our orders. The trade's share count is added to the cumulative
    /// total; duplicates with no growth are dropped by `advance`.
    pub fn on_trade(&mut self, trade: &LastTrade) -> Option<FillEvent> {
        let order_id = trade.order_id.as_deref()?;
        let watched = self.watched.get(order_id)?;
        let cumulative = watched.last_filled + trade.shares.max(0.0) as u64;
        self.advance(order_id, cumulative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::client::error::Result as VenueResult;
    use crate::infrastructure::client::types::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Venue stub that serves scripted order statuses.
    struct ScriptedVenue {
        orders: Mutex<HashMap<String, OpenOrder>>,
    }

    impl ScriptedVenue {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                orders: Mutex::new(HashMap::new()),
            })
        }

        fn set_order(&self, order_id: &str, filled: u64, original: u64, status: &str) {
            self.orders.lock().insert(
                order_id.to_string(),
                OpenOrder {
                    order_id: order_id.to_string(),
                    token_id: "tok".into(),
                    side: Side::Buy,
                    price: "0.50".into(),
                    original_shares: original,
                    filled_shares: filled,
                    status: status.into(),
                    fee: None,
                },
            );
        }
    }

    #[async_trait]
    impl VenueClient for ScriptedVenue {
        async fn get_order(&self, order_id: &str) -> VenueResult<OpenOrder> {
            self.orders
                .lock()
                .get(order_id)
                .cloned()
                .ok_or_else(|| VenueError::NotFound(order_id.to_string()))
        }

        async fn get_orderbook(&self, _: &str) -> VenueResult<OrderbookData> {
            unimplemented!()
        }
        async fn place_order(&self, _: &OrderRequest) -> VenueResult<OrderPlacement> {
            unimplemented!()
        }
        async fn cancel_order(&self, _: &str) -> VenueResult<()> {
            unimplemented!()
        }
        async fn get_open_orders(&self, _: &OpenOrderFilter) -> VenueResult<Vec<OpenOrder>> {
            unimplemented!()
        }
        async fn get_positions(&self, _: Option<i64>) -> VenueResult<Vec<Position>> {
            unimplemented!()
        }
        async fn get_balance(&self) -> VenueResult<f64> {
            unimplemented!()
        }
        async fn get_market(&self, _: i64) -> VenueResult<MarketData> {
            unimplemented!()
        }
        async fn get_categorical_market(&self, _: i64) -> VenueResult<MarketData> {
            unimplemented!()
        }
        async fn get_markets(&self) -> VenueResult<Vec<MarketData>> {
            unimplemented!()
        }
        async fn merge(&self, _: i64, _: u64) -> VenueResult<TxResult> {
            unimplemented!()
        }
        async fn split(&self, _: i64, _: u64) -> VenueResult<TxResult> {
            unimplemented!()
        }
        async fn redeem(&self, _: i64) -> VenueResult<TxResult> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_partial_then_full_fill() {
        let venue = ScriptedVenue::new();
        let mut tracker = FillTracker::new(venue.clone());
        tracker.track("o1", Side::Buy, 0.50);

        venue.set_order("o1", 4, 10, "live");
        let outcome = tracker.poll().await;
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.fills[0].delta_shares, 4);
        assert_eq!(outcome.fills[0].cumulative_shares, 4);
        assert!(outcome.completed.is_empty());

        venue.set_order("o1", 10, 10, "live");
        let outcome = tracker.poll().await;
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.fills[0].delta_shares, 6);
        assert_eq!(outcome.completed, vec!["o1".to_string()]);
        assert!(!tracker.is_tracked("o1"));
    }

    #[tokio::test]
    async fn test_duplicate_cumulative_is_noop() {
        let venue = ScriptedVenue::new();
        let mut tracker = FillTracker::new(venue.clone());
        tracker.track("o1", Side::Sell, 0.60);

        venue.set_order("o1", 4, 10, "live");
        assert_eq!(tracker.poll().await.fills.len(), 1);
        // Same cumulative value again: no event.
        assert!(tracker.poll().await.fills.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_order_untracked() {
        let venue = ScriptedVenue::new();
        let mut tracker = FillTracker::new(venue.clone());
        tracker.track("o1", Side::Buy, 0.50);
        venue.set_order("o1", 0, 10, "cancelled");
        let outcome = tracker.poll().await;
        assert!(outcome.fills.is_empty());
        assert_eq!(outcome.cancelled, vec!["o1".to_string()]);
        assert!(!tracker.is_tracked("o1"));
    }

    #[tokio::test]
    async fn test_streaming_trade_events() {
        let venue = ScriptedVenue::new();
        let mut tracker = FillTracker::new(venue);
        tracker.track("o1", Side::Buy, 0.50);

        let trade = LastTrade {
            market_id: 1,
            side: "buy".into(),
            price: "0.50".into(),
            shares: 5.0,
            outcome_side: Some(1),
            order_id: Some("o1".into()),
        };
        let event = tracker.on_trade(&trade).unwrap();
        assert_eq!(event.delta_shares, 5);

        // Trades on unknown orders are ignored.
        let other = LastTrade {
            order_id: Some("other".into()),
            ..trade
        };
        assert!(tracker.on_trade(&other).is_none());
    }
}
