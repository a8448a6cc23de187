//! Shared trading domain types and price arithmetic
//!
//! Prices are probabilities in [0.0, 1.0]. The venue displays them as cents
//! (price x 100). All price equality checks go through the fixed absolute
//! tolerance below; the orderbook ladder itself stores integer micros so
//! comparisons inside the hot path are exact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Absolute tolerance for price equality in [0, 1] units.
pub const PRICE_EPS: f64 = 1e-6;

/// Looser tolerance used when comparing our resting order price against the
/// top of book while deciding whether to re-quote.
pub const REQUOTE_EPS: f64 = 1e-3;

/// Convert a probability price to integer micros (0.75 -> 750_000).
#[inline]
pub fn price_to_micros(price: f64) -> u64 {
    (price * 1_000_000.0).round() as u64
}

/// Convert integer micros back to a probability price.
#[inline]
pub fn micros_to_price(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

/// Price equality under the fixed tolerance.
#[inline]
pub fn prices_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < PRICE_EPS
}

/// Round a quote amount to the venue's two-decimal precision.
#[inline]
pub fn round_quote(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a resting order as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl OrderStatus {
    /// Normalize the venue's status strings.
    pub fn parse(status: &str, filled: u64, original: u64) -> Self {
        match status.to_uppercase().as_str() {
            "FILLED" | "MATCHED" | "DONE" => OrderStatus::Filled,
            "CANCELLED" | "CANCELED" => OrderStatus::Cancelled,
            _ => {
                if original > 0 && filled >= original {
                    OrderStatus::Filled
                } else if filled > 0 {
                    OrderStatus::PartiallyFilled
                } else {
                    OrderStatus::Open
                }
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// Append-only record of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub price: f64,
    pub shares: u64,
    pub amount: f64,
    pub account: String,
    pub order_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_micros_round_trip() {
        assert_eq!(price_to_micros(0.75), 750_000);
        assert_eq!(price_to_micros(1.0), 1_000_000);
        assert_eq!(price_to_micros(0.123456), 123_456);
        assert!(prices_equal(micros_to_price(750_000), 0.75));
    }

    #[test]
    fn test_prices_equal_tolerance() {
        assert!(prices_equal(0.5, 0.5 + 1e-7));
        assert!(!prices_equal(0.5, 0.5 + 1e-5));
    }

    #[test]
    fn test_order_status_parse() {
        assert_eq!(OrderStatus::parse("FILLED", 0, 10), OrderStatus::Filled);
        assert_eq!(OrderStatus::parse("live", 0, 10), OrderStatus::Open);
        assert_eq!(
            OrderStatus::parse("live", 4, 10),
            OrderStatus::PartiallyFilled
        );
        assert_eq!(OrderStatus::parse("live", 10, 10), OrderStatus::Filled);
        assert_eq!(OrderStatus::parse("canceled", 0, 10), OrderStatus::Cancelled);
    }

    #[test]
    fn test_round_quote() {
        assert_eq!(round_quote(10.006), 10.01);
        assert_eq!(round_quote(9.994), 9.99);
        assert_eq!(round_quote(5.0), 5.0);
    }
}
