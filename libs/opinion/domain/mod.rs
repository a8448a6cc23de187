//! Domain layer: pure data structures and math, no I/O.

pub mod calculator;
pub mod orderbook;
pub mod types;

pub use calculator::{
    amount_from_shares, distribution_ratios, position_shares, shares_from_amount, DistributionMode,
};
pub use orderbook::{BookSide, BookSideKind, BookSource, Orderbook, PriceLevel};
pub use types::{
    micros_to_price, price_to_micros, prices_equal, round_quote, OrderStatus, Side, TradeRecord,
    PRICE_EPS, REQUOTE_EPS,
};
