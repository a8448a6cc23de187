//! Local L2 orderbook replica
//!
//! Per-token ladder seeded from a REST snapshot and maintained by WebSocket
//! diff messages. Prices are stored as integer micros for exact comparison;
//! levels are kept sorted (bids descending, asks ascending) so the top of
//! book is always element 0. Zero-size entries are deletions and are never
//! stored.

use super::types::{micros_to_price, price_to_micros};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::warn;

/// Price level as returned by the venue REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: String,
    pub size: String,
}

impl PriceLevel {
    pub fn price_f64(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }

    pub fn size_f64(&self) -> f64 {
        self.size.parse().unwrap_or(0.0)
    }
}

/// Which side of the book a level or diff belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSideKind {
    Bids,
    Asks,
}

impl BookSideKind {
    /// Parse the venue's wire spelling ("bids" / "asks").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bids" => Some(BookSideKind::Bids),
            "asks" => Some(BookSideKind::Asks),
            _ => None,
        }
    }
}

/// Origin of the most recent mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSource {
    Snapshot,
    WsDiff,
}

/// One side of the ladder: (price_micros, size) kept sorted.
#[derive(Debug, Clone)]
pub struct BookSide {
    levels: Vec<(u64, f64)>,
    is_bid: bool,
}

impl BookSide {
    fn new(is_bid: bool) -> Self {
        Self {
            levels: Vec::with_capacity(32),
            is_bid,
        }
    }

    fn replace(&mut self, levels: &[PriceLevel]) {
        self.levels.clear();
        for level in levels {
            let size = level.size_f64();
            if size > 0.0 {
                self.levels.push((price_to_micros(level.price_f64()), size));
            }
        }
        if self.is_bid {
            self.levels.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        } else {
            self.levels.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        }
        self.levels.dedup_by_key(|(p, _)| *p);
    }

    /// Insert, update or delete one rung. `size == 0` deletes; deleting an
    /// unknown price is a no-op.
    fn apply(&mut self, price_micros: u64, size: f64) {
        let is_bid = self.is_bid;
        let found = self.levels.binary_search_by(|(p, _)| {
            if is_bid {
                p.cmp(&price_micros).reverse()
            } else {
                p.cmp(&price_micros)
            }
        });
        match found {
            Ok(idx) => {
                if size <= 0.0 {
                    self.levels.remove(idx);
                } else {
                    self.levels[idx].1 = size;
                }
            }
            Err(idx) => {
                if size > 0.0 {
                    self.levels.insert(idx, (price_micros, size));
                }
            }
        }
    }

    /// Best rung as (price, size).
    pub fn best(&self) -> Option<(f64, f64)> {
        self.levels
            .first()
            .map(|&(p, s)| (micros_to_price(p), s))
    }

    /// Rung at a 1-based ladder position (1 = top of book).
    pub fn at_rung(&self, rung: usize) -> Option<(f64, f64)> {
        if rung == 0 {
            return None;
        }
        self.levels
            .get(rung - 1)
            .map(|&(p, s)| (micros_to_price(p), s))
    }

    /// Aggregated quote-token depth over the top `levels` rungs.
    pub fn depth(&self, levels: usize) -> f64 {
        self.levels
            .iter()
            .take(levels)
            .map(|&(p, s)| micros_to_price(p) * s)
            .sum()
    }

    pub fn levels(&self) -> Vec<(f64, f64)> {
        self.levels
            .iter()
            .map(|&(p, s)| (micros_to_price(p), s))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Complete replica for one outcome token.
#[derive(Debug, Clone)]
pub struct Orderbook {
    pub token_id: String,
    bids: BookSide,
    asks: BookSide,
    pub last_rest_refresh: Option<Instant>,
    pub last_ws_message: Option<Instant>,
    pub source: Option<BookSource>,
}

impl Orderbook {
    pub fn new(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            bids: BookSide::new(true),
            asks: BookSide::new(false),
            last_rest_refresh: None,
            last_ws_message: None,
            source: None,
        }
    }

    /// Atomically replace both sides from a REST snapshot.
    pub fn seed_from_snapshot(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids.replace(bids);
        self.asks.replace(asks);
        self.last_rest_refresh = Some(Instant::now());
        self.source = Some(BookSource::Snapshot);
        self.check_crossed();
    }

    /// Apply one incremental diff.
    pub fn apply_diff(&mut self, side: BookSideKind, price: f64, size: f64) {
        if price <= 0.0 {
            return;
        }
        let micros = price_to_micros(price);
        match side {
            BookSideKind::Bids => self.bids.apply(micros, size),
            BookSideKind::Asks => self.asks.apply(micros, size),
        }
        self.last_ws_message = Some(Instant::now());
        self.source = Some(BookSource::WsDiff);
        self.check_crossed();
    }

    fn check_crossed(&self) {
        if let (Some((bid, _)), Some((ask, _))) = (self.best_bid(), self.best_ask()) {
            if bid >= ask {
                warn!(
                    token_id = %self.token_id,
                    bid1 = bid,
                    ask1 = ask,
                    "crossed book received from venue"
                );
            }
        }
    }

    pub fn best_bid(&self) -> Option<(f64, f64)> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<(f64, f64)> {
        self.asks.best()
    }

    pub fn bid1_price(&self) -> f64 {
        self.best_bid().map(|(p, _)| p).unwrap_or(0.0)
    }

    pub fn ask1_price(&self) -> f64 {
        self.best_ask().map(|(p, _)| p).unwrap_or(0.0)
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn bid_depth(&self, levels: usize) -> f64 {
        self.bids.depth(levels)
    }

    pub fn ask_depth(&self, levels: usize) -> f64 {
        self.asks.depth(levels)
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Compact one-line summary for logging.
    pub fn format_summary(&self) -> String {
        let bid = self
            .best_bid()
            .map(|(p, s)| format!("{:.4} ({:.0})", p, s))
            .unwrap_or_else(|| "-".to_string());
        let ask = self
            .best_ask()
            .map(|(p, s)| format!("{:.4} ({:.0})", p, s))
            .unwrap_or_else(|| "-".to_string());
        format!("bid1 {} | ask1 {}", bid, ask)
    }
}
