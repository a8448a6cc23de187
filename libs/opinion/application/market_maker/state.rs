//! Per-engine run state
//!
//! Owned exclusively by the engine that writes it; everyone else reads a
//! cloned snapshot. Tallies are cumulative and updated only through
//! `record_buy` / `record_sell`, which keep realized PnL, spread profit and
//! drawdown tracking consistent with the trade history.

use crate::domain::{Side, TradeRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// One tracked grid lot: a filled buy waiting for (or paired with) its sell.
#[derive(Debug, Clone)]
pub struct GridPosition {
    pub buy_price: f64,
    pub shares: u64,
    pub buy_time: DateTime<Utc>,
    pub sell_order_id: Option<String>,
    pub sell_price: f64,
}

/// A live grid buy order.
#[derive(Debug, Clone)]
pub struct GridBuyOrder {
    pub order_id: String,
    pub price: f64,
    pub amount: f64,
    pub level: usize,
}

/// A live grid sell order, remembering the buy it pairs with.
#[derive(Debug, Clone)]
pub struct GridSellOrder {
    pub order_id: String,
    pub price: f64,
    pub shares: u64,
    pub buy_price: f64,
}

#[derive(Debug, Clone)]
pub struct MarketMakerState {
    pub running: bool,

    // Reference prices recorded on the first tick, for the deviation rail.
    pub reference_bid1: f64,
    pub reference_ask1: f64,
    pub reference_mid: f64,

    // Live dual-quote orders.
    pub buy_order_id: Option<String>,
    pub buy_order_price: f64,
    pub sell_order_id: Option<String>,
    pub sell_order_price: f64,

    // Cumulative tallies.
    pub total_buy_shares: u64,
    pub total_buy_cost: f64,
    pub total_sell_shares: u64,
    pub total_sell_revenue: f64,
    pub realized_pnl: f64,
    pub spread_profit: f64,
    pub matched_shares: u64,
    pub buy_trade_count: u64,
    pub sell_trade_count: u64,
    pub peak_pnl: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
    pub total_fees: f64,
    pub min_buy_price: f64,
    pub max_buy_price: f64,
    pub min_sell_price: f64,
    pub max_sell_price: f64,

    // Protection flags.
    pub stop_loss_triggered: bool,
    pub position_limit_reached: bool,
    pub depth_insufficient: bool,
    pub price_boundary_hit: bool,
    pub depth_drop_triggered: bool,

    // Bounded depth histories for the drop gate.
    pub bid_depth_history: VecDeque<f64>,
    pub ask_depth_history: VecDeque<f64>,

    // Grid bookkeeping.
    pub grid_positions: Vec<GridPosition>,
    pub grid_buy_orders: Vec<GridBuyOrder>,
    pub grid_sell_orders: Vec<GridSellOrder>,

    pub trade_history: Vec<TradeRecord>,

    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for MarketMakerState {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketMakerState {
    pub fn new() -> Self {
        Self {
            running: false,
            reference_bid1: 0.0,
            reference_ask1: 0.0,
            reference_mid: 0.0,
            buy_order_id: None,
            buy_order_price: 0.0,
            sell_order_id: None,
            sell_order_price: 0.0,
            total_buy_shares: 0,
            total_buy_cost: 0.0,
            total_sell_shares: 0,
            total_sell_revenue: 0.0,
            realized_pnl: 0.0,
            spread_profit: 0.0,
            matched_shares: 0,
            buy_trade_count: 0,
            sell_trade_count: 0,
            peak_pnl: 0.0,
            max_drawdown: 0.0,
            max_drawdown_percent: 0.0,
            total_fees: 0.0,
            min_buy_price: f64::INFINITY,
            max_buy_price: 0.0,
            min_sell_price: f64::INFINITY,
            max_sell_price: 0.0,
            stop_loss_triggered: false,
            position_limit_reached: false,
            depth_insufficient: false,
            price_boundary_hit: false,
            depth_drop_triggered: false,
            bid_depth_history: VecDeque::new(),
            ask_depth_history: VecDeque::new(),
            grid_positions: Vec::new(),
            grid_buy_orders: Vec::new(),
            grid_sell_orders: Vec::new(),
            trade_history: Vec::new(),
            start_time: None,
            end_time: None,
        }
    }

    /// Shares currently held according to our own tallies.
    pub fn held_shares(&self) -> u64 {
        self.total_buy_shares.saturating_sub(self.total_sell_shares)
    }

    /// Average price paid per share bought, if anything was bought.
    pub fn avg_buy_cost(&self) -> Option<f64> {
        if self.total_buy_shares > 0 {
            Some(self.total_buy_cost / self.total_buy_shares as f64)
        } else {
            None
        }
    }

    pub fn avg_sell_price(&self) -> Option<f64> {
        if self.total_sell_shares > 0 {
            Some(self.total_sell_revenue / self.total_sell_shares as f64)
        } else {
            None
        }
    }

    /// Mark-to-market PnL of the open position at `mark_price`.
    pub fn unrealized_pnl(&self, mark_price: f64) -> f64 {
        let held = self.held_shares() as f64;
        match self.avg_buy_cost() {
            Some(avg) => held * (mark_price - avg),
            None => 0.0,
        }
    }

    /// Record a buy execution.
    pub fn record_buy(
        &mut self,
        price: f64,
        shares: u64,
        fee: f64,
        account: &str,
        order_id: &str,
    ) {
        let amount = price * shares as f64;
        self.total_buy_shares += shares;
        self.total_buy_cost += amount;
        self.total_fees += fee;
        self.buy_trade_count += 1;
        self.min_buy_price = self.min_buy_price.min(price);
        self.max_buy_price = self.max_buy_price.max(price);
        self.trade_history.push(TradeRecord {
            timestamp: Utc::now(),
            side: Side::Buy,
            price,
            shares,
            amount,
            account: account.to_string(),
            order_id: order_id.to_string(),
        });
        self.refresh_matched();
    }

    /// Record a sell execution.
    pub fn record_sell(
        &mut self,
        price: f64,
        shares: u64,
        fee: f64,
        account: &str,
        order_id: &str,
    ) {
        let amount = price * shares as f64;
        self.total_sell_shares += shares;
        self.total_sell_revenue += amount;
        self.total_fees += fee;
        self.sell_trade_count += 1;
        self.min_sell_price = self.min_sell_price.min(price);
        self.max_sell_price = self.max_sell_price.max(price);
        self.trade_history.push(TradeRecord {
            timestamp: Utc::now(),
            side: Side::Sell,
            price,
            shares,
            amount,
            account: account.to_string(),
            order_id: order_id.to_string(),
        });
        self.refresh_matched();
    }

    /// Recompute matched shares, spread profit, realized PnL and drawdown
    /// from the cumulative tallies.
    fn refresh_matched(&mut self) {
        self.matched_shares = self.total_buy_shares.min(self.total_sell_shares);
        if let (Some(avg_buy), Some(avg_sell)) = (self.avg_buy_cost(), self.avg_sell_price()) {
            self.spread_profit = self.matched_shares as f64 * (avg_sell - avg_buy);
            self.realized_pnl =
                self.total_sell_revenue - self.matched_shares as f64 * avg_buy - self.total_fees;
        }
        self.peak_pnl = self.peak_pnl.max(self.realized_pnl);
        let drawdown = self.peak_pnl - self.realized_pnl;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
            if self.peak_pnl.abs() > f64::EPSILON {
                self.max_drawdown_percent = drawdown / self.peak_pnl.abs() * 100.0;
            }
        }
    }

    /// Append one tick's depth samples, keeping the ring bounded.
    pub fn push_depth(&mut self, bid_depth: f64, ask_depth: f64, window: usize) {
        let cap = window + 1;
        self.bid_depth_history.push_back(bid_depth);
        self.ask_depth_history.push_back(ask_depth);
        while self.bid_depth_history.len() > cap {
            self.bid_depth_history.pop_front();
        }
        while self.ask_depth_history.len() > cap {
            self.ask_depth_history.pop_front();
        }
    }

    /// Percent drop from the earliest to the latest ring sample.
    pub fn depth_drop_percent(history: &VecDeque<f64>) -> Option<f64> {
        if history.len() < 2 {
            return None;
        }
        let earliest = *history.front()?;
        let current = *history.back()?;
        if earliest <= 0.0 {
            return None;
        }
        Some((earliest - current) / earliest * 100.0)
    }

    pub fn clear_depth_history(&mut self) {
        self.bid_depth_history.clear();
        self.ask_depth_history.clear();
    }

    /// Assemble the end-of-session summary.
    pub fn summary(&self, account: &str, token_id: &str) -> SessionSummary {
        SessionSummary {
            account: account.to_string(),
            token_id: token_id.to_string(),
            total_buy_shares: self.total_buy_shares,
            total_sell_shares: self.total_sell_shares,
            avg_buy_price: self.avg_buy_cost(),
            avg_sell_price: self.avg_sell_price(),
            realized_pnl: self.realized_pnl,
            spread_profit: self.spread_profit,
            matched_shares: self.matched_shares,
            buy_trade_count: self.buy_trade_count,
            sell_trade_count: self.sell_trade_count,
            total_fees: self.total_fees,
            peak_pnl: self.peak_pnl,
            max_drawdown: self.max_drawdown,
            stop_loss_triggered: self.stop_loss_triggered,
            position_limit_reached: self.position_limit_reached,
            depth_drop_triggered: self.depth_drop_triggered,
            price_boundary_hit: self.price_boundary_hit,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// Per-engine summary emitted on shutdown.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub account: String,
    pub token_id: String,
    pub total_buy_shares: u64,
    pub total_sell_shares: u64,
    pub avg_buy_price: Option<f64>,
    pub avg_sell_price: Option<f64>,
    pub realized_pnl: f64,
    pub spread_profit: f64,
    pub matched_shares: u64,
    pub buy_trade_count: u64,
    pub sell_trade_count: u64,
    pub total_fees: f64,
    pub peak_pnl: f64,
    pub max_drawdown: f64,
    pub stop_loss_triggered: bool,
    pub position_limit_reached: bool,
    pub depth_drop_triggered: bool,
    pub price_boundary_hit: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}
