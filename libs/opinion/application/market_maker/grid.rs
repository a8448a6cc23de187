//! Grid strategy
//!
//! A ladder of stacked bids at `bid1 - i * level_spread`, each paired on
//! fill with an ask at `buy_price + grid_profit_spread`. Sold lots realize
//! their spread; with auto-rebalance a fresh bid replaces each completed
//! round trip at the current top of book.

use super::engine::{EngineError, FillReport, MarketMakerEngine};
use super::state::{GridBuyOrder, GridPosition, GridSellOrder};
use crate::domain::{prices_equal, shares_from_amount, Orderbook, Side, PRICE_EPS};
use chrono::Utc;
use tracing::{debug, info};

impl MarketMakerEngine {
    pub(crate) async fn grid_step(
        &mut self,
        book: &Orderbook,
        report: &FillReport,
        place_allowed: bool,
    ) -> Result<(), EngineError> {
        self.grid_reconcile_buys(report);
        self.grid_reconcile_sells(book, report, place_allowed).await?;
        self.grid_pair_positions(place_allowed).await?;
        self.grid_top_up(book, place_allowed).await?;
        Ok(())
    }

    /// Filled buys become tracked lots awaiting their paired sell.
    fn grid_reconcile_buys(&mut self, report: &FillReport) {
        for completed in report.completed.iter().filter(|c| c.side == Side::Buy) {
            let mut state = self.state.write();
            let Some(idx) = state
                .grid_buy_orders
                .iter()
                .position(|o| o.order_id == completed.order_id)
            else {
                continue;
            };
            let order = state.grid_buy_orders.remove(idx);
            let shares = if completed.shares > 0 {
                completed.shares
            } else {
                shares_from_amount(order.amount, order.price)
            };
            info!(
                account = %self.account(),
                price = order.price,
                shares,
                "grid buy filled"
            );
            state.grid_positions.push(GridPosition {
                buy_price: order.price,
                shares,
                buy_time: Utc::now(),
                sell_order_id: None,
                sell_price: 0.0,
            });
        }
    }

    /// Filled sells close their lot; optionally re-bid at the top of book.
    async fn grid_reconcile_sells(
        &mut self,
        book: &Orderbook,
        report: &FillReport,
        place_allowed: bool,
    ) -> Result<(), EngineError> {
        let mut rebalance_count = 0usize;
        for completed in report.completed.iter().filter(|c| c.side == Side::Sell) {
            let mut state = self.state.write();
            let Some(idx) = state
                .grid_sell_orders
                .iter()
                .position(|o| o.order_id == completed.order_id)
            else {
                continue;
            };
            let sell = state.grid_sell_orders.remove(idx);
            state
                .grid_positions
                .retain(|p| p.sell_order_id.as_deref() != Some(completed.order_id.as_str()));
            info!(
                account = %self.account(),
                buy_price = sell.buy_price,
                sell_price = sell.price,
                shares = sell.shares,
                profit = (sell.price - sell.buy_price) * sell.shares as f64,
                "grid round trip complete"
            );
            drop(state);
            rebalance_count += 1;
        }

        if self.cfg.grid_auto_rebalance && rebalance_count > 0 && place_allowed {
            let limit_reached = self.state.read().position_limit_reached;
            if !limit_reached {
                if let Some((bid1, _)) = book.best_bid() {
                    for _ in 0..rebalance_count {
                        self.grid_place_buy(bid1, 0).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Ensure every open lot has a live paired sell. This covers both fresh
    /// fills and sells that were cancelled out from under us.
    async fn grid_pair_positions(&mut self, place_allowed: bool) -> Result<(), EngineError> {
        if !place_allowed {
            return Ok(());
        }
        if self.cfg.grid_profit_spread + PRICE_EPS < self.cfg.grid_min_profit_spread {
            debug!(
                account = %self.account(),
                "grid profit spread below minimum, leaving lots unpaired"
            );
            return Ok(());
        }
        let unpaired: Vec<(f64, u64)> = self
            .state
            .read()
            .grid_positions
            .iter()
            .filter(|p| p.sell_order_id.is_none())
            .map(|p| (p.buy_price, p.shares))
            .collect();

        for (buy_price, shares) in unpaired {
            let sell_price = buy_price + self.cfg.grid_profit_spread;
            if sell_price >= 1.0 || shares == 0 {
                continue;
            }
            if let Some(order_id) = self.place(Side::Sell, sell_price, shares).await? {
                let mut state = self.state.write();
                if let Some(position) = state
                    .grid_positions
                    .iter_mut()
                    .find(|p| p.sell_order_id.is_none() && prices_equal(p.buy_price, buy_price))
                {
                    position.sell_order_id = Some(order_id.clone());
                    position.sell_price = sell_price;
                }
                state.grid_sell_orders.push(GridSellOrder {
                    order_id,
                    price: sell_price,
                    shares,
                    buy_price,
                });
            }
        }
        Ok(())
    }

    /// Keep `grid_levels` bids resting, stacked downward from bid1 and
    /// uniqued by price.
    async fn grid_top_up(&mut self, book: &Orderbook, place_allowed: bool) -> Result<(), EngineError> {
        if !place_allowed {
            return Ok(());
        }
        if self.state.read().position_limit_reached {
            return Ok(());
        }
        let Some((bid1, _)) = book.best_bid() else {
            return Ok(());
        };

        for level in 0..self.cfg.grid_levels {
            if self.state.read().grid_buy_orders.len() >= self.cfg.grid_levels {
                break;
            }
            let price = bid1 - level as f64 * self.cfg.grid_level_spread;
            if price <= PRICE_EPS {
                break;
            }
            self.grid_place_buy(price, level).await?;
        }
        Ok(())
    }

    async fn grid_place_buy(&mut self, price: f64, level: usize) -> Result<(), EngineError> {
        {
            // The ladder never exceeds its level count and never doubles up
            // on a price, regardless of which path places the bid.
            let state = self.state.read();
            if state.grid_buy_orders.len() >= self.cfg.grid_levels {
                return Ok(());
            }
            if state.grid_buy_orders.iter().any(|o| prices_equal(o.price, price)) {
                return Ok(());
            }
        }
        if !self.price_within_buy_rails(price) {
            debug!(account = %self.account(), price, "grid level outside price rails, skipped");
            return Ok(());
        }
        let amount = self.cfg.grid_amount_per_level;
        let shares = shares_from_amount(amount, price);
        if shares == 0 {
            return Ok(());
        }
        if let Some(order_id) = self.place(Side::Buy, price, shares).await? {
            self.state.write().grid_buy_orders.push(GridBuyOrder {
                order_id,
                price,
                amount,
                level,
            });
        }
        Ok(())
    }

    fn price_within_buy_rails(&self, price: f64) -> bool {
        if self.cfg.max_buy_price > 0.0 && price > self.cfg.max_buy_price + PRICE_EPS {
            return false;
        }
        let reference_mid = self.state.read().reference_mid;
        if self.cfg.max_deviation > 0.0
            && reference_mid > 0.0
            && price > reference_mid * (1.0 + self.cfg.max_deviation) + PRICE_EPS
        {
            return false;
        }
        true
    }
}
