//! Market-maker control loop
//!
//! One engine per (account, token). Each tick takes a consistent replica
//! snapshot, reconciles fills, walks the protection gates in order (depth,
//! depth-drop, spread, position, stop-loss) and then runs the active
//! strategy: dual-quote here, grid in the sibling module.
//!
//! Network errors inside a tick are logged and absorbed at the tick
//! boundary; only account-fatal rejections (e.g. region blocked) stop the
//! engine. Lock discipline: state guards are scoped and never held across
//! an await.

use super::config::{ConfigError, DropAction, MarketMakerConfig};
use super::fills::{FillTracker, PollOutcome};
use super::state::{MarketMakerState, SessionSummary};
use super::stop_loss::StopLossExecutor;
use crate::domain::calculator::CalcError;
use crate::domain::{
    distribution_ratios, shares_from_amount, Orderbook, Side, PRICE_EPS, REQUOTE_EPS,
};
use crate::infrastructure::client::types::OrderRequest;
use crate::infrastructure::client::{VenueClient, VenueError};
use crate::infrastructure::orderbook_manager::OrderbookManager;
use crate::infrastructure::positions;
use crate::infrastructure::submitter::OrderSubmitter;
use chrono::Utc;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("fatal for account: {0}")]
    FatalAccount(VenueError),

    #[error(transparent)]
    Calc(#[from] CalcError),
}

/// Completed order surfaced to the strategy step.
#[derive(Debug, Clone)]
pub(crate) struct CompletedOrder {
    pub order_id: String,
    pub side: Side,
    pub price: f64,
    pub shares: u64,
}

/// What this tick's fill reconciliation produced.
#[derive(Debug, Default)]
pub(crate) struct FillReport {
    pub completed: Vec<CompletedOrder>,
    pub cancelled: Vec<String>,
}

pub struct MarketMakerEngine {
    account: String,
    pub(crate) cfg: MarketMakerConfig,
    pub(crate) client: Arc<dyn VenueClient>,
    pub(crate) submitter: OrderSubmitter,
    book: Arc<OrderbookManager>,
    pub(crate) state: Arc<RwLock<MarketMakerState>>,
    pub(crate) fills: FillTracker,
    /// Placement-time metadata, kept until the order leaves the book.
    order_meta: HashMap<String, (Side, f64)>,
    /// Cumulative filled shares per tracked order.
    filled_totals: HashMap<String, u64>,
}

impl MarketMakerEngine {
    pub fn new(
        account: impl Into<String>,
        cfg: MarketMakerConfig,
        client: Arc<dyn VenueClient>,
        book: Arc<OrderbookManager>,
    ) -> Result<Self, EngineError> {
        cfg.validate()?;
        let account = account.into();
        Ok(Self {
            submitter: OrderSubmitter::new(Arc::clone(&client), account.clone()),
            fills: FillTracker::new(Arc::clone(&client)),
            account,
            cfg,
            client,
            book,
            state: Arc::new(RwLock::new(MarketMakerState::new())),
            order_meta: HashMap::new(),
            filled_totals: HashMap::new(),
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn config(&self) -> &MarketMakerConfig {
        &self.cfg
    }

    /// Shared handle observers use to snapshot or stop this engine.
    pub fn state_handle(&self) -> Arc<RwLock<MarketMakerState>> {
        Arc::clone(&self.state)
    }

    pub fn snapshot_state(&self) -> MarketMakerState {
        self.state.read().clone()
    }

    /// Run until `running` is cleared, then cancel outstanding orders and
    /// return the session summary.
    pub async fn run(&mut self) -> SessionSummary {
        {
            let mut state = self.state.write();
            state.running = true;
            state.start_time = Some(Utc::now());
        }
        info!(
            account = %self.account,
            token_id = %self.cfg.token_id,
            strategy = if self.cfg.grid_enabled { "grid" } else { "dual-quote" },
            "market maker started"
        );

        let interval = Duration::from_millis(self.cfg.check_interval_ms);
        loop {
            if !self.state.read().running {
                break;
            }
            if let Err(e) = self.tick().await {
                match e {
                    EngineError::FatalAccount(err) => {
                        error!(account = %self.account, error = %err, "fatal account error, stopping engine");
                        break;
                    }
                    other => warn!(account = %self.account, error = %other, "tick failed"),
                }
            }
            self.interruptible_sleep(interval).await;
        }

        self.shutdown_orders().await;
        let summary = {
            let mut state = self.state.write();
            state.running = false;
            state.end_time = Some(Utc::now());
            state.summary(&self.account, &self.cfg.token_id)
        };
        info!(
            account = %self.account,
            bought = summary.total_buy_shares,
            sold = summary.total_sell_shares,
            realized_pnl = summary.realized_pnl,
            max_drawdown = summary.max_drawdown,
            "market maker stopped"
        );
        summary
    }

    async fn interruptible_sleep(&self, duration: Duration) {
        let check = Duration::from_millis(50);
        let mut elapsed = Duration::ZERO;
        while elapsed < duration && self.state.read().running {
            tokio::time::sleep(check.min(duration - elapsed)).await;
            elapsed += check;
        }
    }

    /// One pass of the control loop. Public so tests and tooling can drive
    /// the engine without the timer.
    pub async fn tick(&mut self) -> Result<(), EngineError> {
        let book = self.book.snapshot();
        if book.is_empty() {
            debug!(account = %self.account, "replica empty, skipping tick");
            return Ok(());
        }

        self.record_reference(&book);

        let outcome = self.fills.poll().await;
        let report = self.apply_fills(outcome);

        if !self.depth_gate(&book).await {
            return Ok(());
        }
        if self.depth_drop_gate(&book).await? {
            return Ok(());
        }

        let place_allowed = match book.spread() {
            Some(spread) if spread < self.cfg.min_spread - PRICE_EPS => {
                debug!(
                    account = %self.account,
                    spread,
                    min_spread = self.cfg.min_spread,
                    "spread below minimum, pausing placement"
                );
                false
            }
            Some(_) => true,
            None => false,
        };

        let held = self.position_gate(&book).await?;

        if self.stop_loss_gate(&book, held).await? {
            return Ok(());
        }

        if self.cfg.grid_enabled {
            self.grid_step(&book, &report, place_allowed).await?;
        } else {
            self.dual_quote_step(&book, &report, place_allowed).await?;
        }
        Ok(())
    }

    fn record_reference(&self, book: &Orderbook) {
        let mut state = self.state.write();
        if state.reference_mid > 0.0 {
            return;
        }
        if let (Some((bid1, _)), Some((ask1, _))) = (book.best_bid(), book.best_ask()) {
            state.reference_bid1 = bid1;
            state.reference_ask1 = ask1;
            state.reference_mid = (bid1 + ask1) / 2.0;
            info!(
                account = %self.account,
                bid1,
                ask1,
                mid = state.reference_mid,
                "reference prices recorded"
            );
        }
    }

    // =========================================================================
    // Fill reconciliation
    // =========================================================================

    pub(crate) fn apply_fills(&mut self, outcome: PollOutcome) -> FillReport {
        let mut report = FillReport::default();

        for fill in &outcome.fills {
            *self
                .filled_totals
                .entry(fill.order_id.clone())
                .or_default() += fill.delta_shares;
            let mut state = self.state.write();
            match fill.side {
                Side::Buy => state.record_buy(
                    fill.price,
                    fill.delta_shares,
                    fill.fee,
                    &self.account,
                    &fill.order_id,
                ),
                Side::Sell => state.record_sell(
                    fill.price,
                    fill.delta_shares,
                    fill.fee,
                    &self.account,
                    &fill.order_id,
                ),
            }
            info!(
                account = %self.account,
                order_id = %fill.order_id,
                side = %fill.side,
                price = fill.price,
                shares = fill.delta_shares,
                "fill"
            );
        }

        for order_id in outcome.completed {
            let shares = self.filled_totals.remove(&order_id).unwrap_or(0);
            if let Some((side, price)) = self.order_meta.remove(&order_id) {
                self.clear_quote_if_matches(&order_id);
                report.completed.push(CompletedOrder {
                    order_id,
                    side,
                    price,
                    shares,
                });
            }
        }

        for order_id in outcome.cancelled {
            self.filled_totals.remove(&order_id);
            self.order_meta.remove(&order_id);
            self.clear_quote_if_matches(&order_id);
            let mut state = self.state.write();
            state.grid_buy_orders.retain(|o| o.order_id != order_id);
            state.grid_sell_orders.retain(|o| o.order_id != order_id);
            for position in &mut state.grid_positions {
                if position.sell_order_id.as_deref() == Some(order_id.as_str()) {
                    position.sell_order_id = None;
                }
            }
            drop(state);
            report.cancelled.push(order_id);
        }

        report
    }

    fn clear_quote_if_matches(&self, order_id: &str) {
        let mut state = self.state.write();
        if state.buy_order_id.as_deref() == Some(order_id) {
            state.buy_order_id = None;
            state.buy_order_price = 0.0;
        }
        if state.sell_order_id.as_deref() == Some(order_id) {
            state.sell_order_id = None;
            state.sell_order_price = 0.0;
        }
    }

    // =========================================================================
    // Protection gates
    // =========================================================================

    /// Returns false when the tick must stop here.
    async fn depth_gate(&mut self, book: &Orderbook) -> bool {
        if self.cfg.min_orderbook_depth <= 0.0 {
            return true;
        }
        let bid_depth = book.bid_depth(5);
        let ask_depth = book.ask_depth(5);
        if bid_depth < self.cfg.min_orderbook_depth || ask_depth < self.cfg.min_orderbook_depth {
            let first = !self.state.read().depth_insufficient;
            if first {
                warn!(
                    account = %self.account,
                    bid_depth,
                    ask_depth,
                    required = self.cfg.min_orderbook_depth,
                    "orderbook depth insufficient, cancelling quotes"
                );
            }
            self.cancel_all_live_orders().await;
            self.state.write().depth_insufficient = true;
            false
        } else {
            let mut state = self.state.write();
            if state.depth_insufficient {
                info!(account = %self.account, "orderbook depth recovered");
                state.depth_insufficient = false;
            }
            true
        }
    }

    /// Returns true when the drop gate tripped and handled the tick.
    async fn depth_drop_gate(&mut self, book: &Orderbook) -> Result<bool, EngineError> {
        let bid_depth = book.bid_depth(10);
        let ask_depth = book.ask_depth(10);
        let (bid_drop, ask_drop) = {
            let mut state = self.state.write();
            state.push_depth(bid_depth, ask_depth, self.cfg.depth_drop_window);
            (
                MarketMakerState::depth_drop_percent(&state.bid_depth_history),
                MarketMakerState::depth_drop_percent(&state.ask_depth_history),
            )
        };

        let threshold = self.cfg.depth_drop_threshold;
        let tripped = [bid_drop, ask_drop]
            .iter()
            .flatten()
            .any(|&drop| drop >= threshold);
        if !tripped || !self.cfg.auto_cancel_on_depth_drop {
            return Ok(false);
        }

        warn!(
            account = %self.account,
            bid_drop = ?bid_drop,
            ask_drop = ?ask_drop,
            threshold,
            action = ?self.cfg.emergency_position_action,
            "liquidity collapse detected, emergency cancel"
        );
        self.cancel_all_live_orders().await;

        match self.cfg.emergency_position_action {
            DropAction::Hold => {}
            DropAction::SellAll => self.emergency_sell(book, 100.0).await?,
            DropAction::SellPartial => {
                self.emergency_sell(book, self.cfg.emergency_sell_percent).await?
            }
        }

        let mut state = self.state.write();
        state.depth_drop_triggered = true;
        state.clear_depth_history();
        // An emergency is terminal for this engine.
        state.running = false;
        Ok(true)
    }

    async fn emergency_sell(&mut self, book: &Orderbook, percent: f64) -> Result<(), EngineError> {
        let held = self.current_position().await;
        let to_sell = (held as f64 * percent / 100.0).floor() as u64;
        if to_sell == 0 {
            return Ok(());
        }
        let bid1 = book.bid1_price();
        info!(
            account = %self.account,
            held,
            to_sell,
            percent,
            "emergency position sell"
        );
        let order = OrderRequest::market_sell(&self.cfg.token_id, to_sell);
        match self.submitter.submit(&order).await {
            Ok(outcome) => {
                if let Some(order_id) = outcome.order_id {
                    // The best bid is the reference execution price.
                    self.track_order(&order_id, Side::Sell, bid1);
                }
                Ok(())
            }
            Err(e) if e.is_fatal_for_account() => Err(EngineError::FatalAccount(e)),
            Err(e) => {
                warn!(account = %self.account, error = %e, "emergency sell failed");
                Ok(())
            }
        }
    }

    /// Venue-reported position, falling back to our own tallies.
    async fn current_position(&self) -> u64 {
        match positions::token_balance(self.client.as_ref(), &self.cfg.token_id).await {
            Ok(shares) => shares,
            Err(e) => {
                debug!(account = %self.account, error = %e, "position query failed, using tallies");
                self.state.read().held_shares()
            }
        }
    }

    /// Evaluates position limits; returns the current held shares.
    async fn position_gate(&mut self, book: &Orderbook) -> Result<u64, EngineError> {
        let held = self.current_position().await;
        if !self.cfg.has_position_limit() {
            return Ok(held);
        }

        let mut reached = false;
        if self.cfg.max_position_shares > 0 && held >= self.cfg.max_position_shares {
            reached = true;
        }
        if self.cfg.max_position_amount > 0.0 {
            let mark = self
                .state
                .read()
                .avg_buy_cost()
                .or_else(|| book.mid_price())
                .unwrap_or(0.0);
            if held as f64 * mark >= self.cfg.max_position_amount {
                reached = true;
            }
        }
        if self.cfg.max_position_percent > 0.0 {
            if let Some(mid) = book.mid_price() {
                match self.client.get_balance().await {
                    Ok(balance) => {
                        let value = held as f64 * mid;
                        let net_worth = balance + value;
                        if net_worth > 0.0
                            && value / net_worth * 100.0 >= self.cfg.max_position_percent
                        {
                            reached = true;
                        }
                    }
                    Err(e) => debug!(account = %self.account, error = %e, "balance query failed"),
                }
            }
        }

        let was_reached = self.state.read().position_limit_reached;
        if reached && !was_reached {
            warn!(account = %self.account, held, "position limit reached, suppressing buys");
            self.cancel_live_buys().await;
        } else if !reached && was_reached {
            info!(account = %self.account, held, "position back under limit");
        }
        self.state.write().position_limit_reached = reached;
        Ok(held)
    }

    /// Returns true when a stop trigger fired and the engine is stopping.
    async fn stop_loss_gate(&mut self, book: &Orderbook, held: u64) -> Result<bool, EngineError> {
        if !self.cfg.has_stop_loss() || held == 0 {
            return Ok(false);
        }
        let bid1 = match book.best_bid() {
            Some((price, _)) => price,
            None => return Ok(false),
        };

        let (unrealized, cost_basis) = {
            let state = self.state.read();
            let avg = state.avg_buy_cost().unwrap_or(bid1);
            (state.unrealized_pnl(bid1), held as f64 * avg)
        };

        let triggered = (self.cfg.stop_loss_price > 0.0 && bid1 < self.cfg.stop_loss_price)
            || (self.cfg.stop_loss_amount > 0.0 && unrealized <= -self.cfg.stop_loss_amount)
            || (self.cfg.stop_loss_percent > 0.0
                && cost_basis > 0.0
                && unrealized / cost_basis <= -self.cfg.stop_loss_percent / 100.0);
        if !triggered {
            return Ok(false);
        }

        warn!(
            account = %self.account,
            bid1,
            unrealized,
            "stop-loss triggered, liquidating"
        );
        self.cancel_all_live_orders().await;

        let executor = StopLossExecutor::new(
            &self.client,
            &self.submitter,
            &self.cfg.token_id,
            self.cfg.min_depth_levels,
            self.cfg.min_depth_amount,
        );
        let report = executor.execute(&self.book).await;
        {
            let mut state = self.state.write();
            for &(price, shares) in &report.executions {
                state.record_sell(price, shares, 0.0, &self.account, "stop-loss");
            }
            state.stop_loss_triggered = true;
            state.running = false;
        }
        if report.remaining > 0 {
            warn!(
                account = %self.account,
                remaining = report.remaining,
                iterations = report.iterations,
                "stop-loss exhausted its budget with shares remaining"
            );
        }
        Ok(true)
    }

    // =========================================================================
    // Dual-quote strategy
    // =========================================================================

    async fn dual_quote_step(
        &mut self,
        book: &Orderbook,
        _report: &FillReport,
        place_allowed: bool,
    ) -> Result<(), EngineError> {
        self.manage_bid(book, place_allowed).await?;
        self.manage_ask(book, place_allowed).await?;
        Ok(())
    }

    /// Desired bid: one step above bid1, but never closer than min_spread to
    /// ask1 and never above the hard rails.
    fn bid_target(&self, bid1: f64, ask1: f64) -> f64 {
        let mut desired = (bid1 + self.cfg.price_step).min(ask1 - self.cfg.min_spread);
        if self.cfg.max_buy_price > 0.0 {
            desired = desired.min(self.cfg.max_buy_price);
        }
        let reference_mid = self.state.read().reference_mid;
        if self.cfg.max_deviation > 0.0 && reference_mid > 0.0 {
            desired = desired.min(reference_mid * (1.0 + self.cfg.max_deviation));
        }
        desired
    }

    /// Desired ask: one step under ask1, floored by min_spread over bid1,
    /// the hard rails and (in cost mode) the cost floor.
    fn ask_target(&self, bid1: f64, ask1: f64, cost_floor: Option<f64>) -> f64 {
        let mut desired = (ask1 - self.cfg.price_step).max(bid1 + self.cfg.min_spread);
        if self.cfg.min_sell_price > 0.0 {
            desired = desired.max(self.cfg.min_sell_price);
        }
        let reference_mid = self.state.read().reference_mid;
        if self.cfg.max_deviation > 0.0 && reference_mid > 0.0 {
            desired = desired.max(reference_mid * (1.0 - self.cfg.max_deviation));
        }
        if let Some(floor) = cost_floor {
            desired = desired.max(floor);
        }
        desired
    }

    /// Cost floor for the ask when cost-based selling is active and viable.
    fn cost_floor(&self) -> Option<f64> {
        if !self.cfg.cost_sell_enabled {
            return None;
        }
        if self.cfg.sell_profit_spread < self.cfg.min_cost_profit_spread {
            // Not enough margin configured; fall back to market-follow.
            return None;
        }
        self.state
            .read()
            .avg_buy_cost()
            .map(|avg| avg + self.cfg.sell_profit_spread)
    }

    async fn manage_bid(&mut self, book: &Orderbook, place_allowed: bool) -> Result<(), EngineError> {
        let (bid1, ask1) = match (book.best_bid(), book.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => (bid, ask),
            _ => return Ok(()),
        };
        let (live, own_price, limit_reached) = {
            let state = self.state.read();
            (
                state.buy_order_id.clone(),
                state.buy_order_price,
                state.position_limit_reached,
            )
        };

        match live {
            None => {
                if !place_allowed || limit_reached {
                    return Ok(());
                }
                if self.cfg.layered_enabled && self.place_layered(book, Side::Buy).await? {
                    return Ok(());
                }
                let price = self.bid_target(bid1, ask1);
                if price <= PRICE_EPS {
                    return Ok(());
                }
                let amount = self.draw_amount();
                let shares = shares_from_amount(amount, price);
                if shares == 0 {
                    return Ok(());
                }
                if let Some(order_id) = self.place(Side::Buy, price, shares).await? {
                    let mut state = self.state.write();
                    state.buy_order_id = Some(order_id);
                    state.buy_order_price = price;
                }
            }
            Some(order_id) => {
                // Chase only when someone outbid us.
                if bid1 <= own_price + REQUOTE_EPS {
                    return Ok(());
                }
                let desired = self.bid_target(bid1, ask1);
                if desired <= own_price + PRICE_EPS {
                    let mut state = self.state.write();
                    if !state.price_boundary_hit {
                        warn!(
                            account = %self.account,
                            own_price,
                            bid1,
                            "bid pinned at price boundary"
                        );
                    }
                    state.price_boundary_hit = true;
                    return Ok(());
                }
                self.cancel_order(&order_id).await;
                {
                    let mut state = self.state.write();
                    state.buy_order_id = None;
                    state.buy_order_price = 0.0;
                }
                if !place_allowed || limit_reached {
                    return Ok(());
                }
                let amount = self.draw_amount();
                let shares = shares_from_amount(amount, desired);
                if shares == 0 {
                    return Ok(());
                }
                if let Some(new_id) = self.place(Side::Buy, desired, shares).await? {
                    let mut state = self.state.write();
                    state.buy_order_id = Some(new_id);
                    state.buy_order_price = desired;
                }
            }
        }
        Ok(())
    }

    async fn manage_ask(&mut self, book: &Orderbook, place_allowed: bool) -> Result<(), EngineError> {
        let (bid1, ask1) = match (book.best_bid(), book.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => (bid, ask),
            _ => return Ok(()),
        };
        let (live, own_price, held) = {
            let state = self.state.read();
            (
                state.sell_order_id.clone(),
                state.sell_order_price,
                state.held_shares(),
            )
        };
        let cost_floor = self.cost_floor();

        match live {
            None => {
                if !place_allowed || held == 0 {
                    return Ok(());
                }
                if self.cfg.layered_enabled && self.place_layered(book, Side::Sell).await? {
                    return Ok(());
                }
                let price = self.ask_target(bid1, ask1, cost_floor);
                if price <= PRICE_EPS || price >= 1.0 {
                    return Ok(());
                }
                if let Some(order_id) = self.place(Side::Sell, price, held).await? {
                    let mut state = self.state.write();
                    state.sell_order_id = Some(order_id);
                    state.sell_order_price = price;
                }
            }
            Some(order_id) => {
                let undercut = ask1 < own_price - REQUOTE_EPS;
                let can_raise = cost_floor
                    .map(|floor| ask1 > own_price + REQUOTE_EPS && ask1 > floor + PRICE_EPS)
                    .unwrap_or(false);
                if !undercut && !can_raise {
                    return Ok(());
                }
                let desired = self.ask_target(bid1, ask1, cost_floor);
                let improves = if undercut {
                    desired < own_price - PRICE_EPS
                } else {
                    desired > own_price + PRICE_EPS
                };
                if !improves {
                    if undercut {
                        let mut state = self.state.write();
                        if !state.price_boundary_hit {
                            warn!(
                                account = %self.account,
                                own_price,
                                ask1,
                                "ask pinned at price boundary"
                            );
                        }
                        state.price_boundary_hit = true;
                    }
                    return Ok(());
                }
                self.cancel_order(&order_id).await;
                {
                    let mut state = self.state.write();
                    state.sell_order_id = None;
                    state.sell_order_price = 0.0;
                }
                let held_now = self.state.read().held_shares();
                if !place_allowed || held_now == 0 {
                    return Ok(());
                }
                if let Some(new_id) = self.place(Side::Sell, desired, held_now).await? {
                    let mut state = self.state.write();
                    state.sell_order_id = Some(new_id);
                    state.sell_order_price = desired;
                }
            }
        }
        Ok(())
    }

    /// Layered fan-out: one order per configured rung, sizes split by the
    /// distribution ratios. Returns false when the ladder is too shallow,
    /// letting the caller fall back to a single order.
    async fn place_layered(&mut self, book: &Orderbook, side: Side) -> Result<bool, EngineError> {
        let rungs = self.cfg.price_levels.clone();
        let max_rung = *rungs.iter().max().expect("validated non-empty");
        let min_rung = *rungs.iter().min().expect("validated non-empty");
        let depth = match side {
            Side::Buy => book.bids().len(),
            Side::Sell => book.asks().len(),
        };
        if depth < max_rung {
            return Ok(false);
        }
        let ratios = distribution_ratios(
            rungs.len(),
            self.cfg.distribution,
            self.cfg.custom_ratios.as_deref(),
        )?;

        let held = self.state.read().held_shares();
        if side == Side::Sell && held == 0 {
            return Ok(true);
        }
        let total_amount = self.draw_amount();

        let mut assigned: u64 = 0;
        for (i, &rung) in rungs.iter().enumerate() {
            let (price, _) = match side {
                Side::Buy => book.bids().at_rung(rung),
                Side::Sell => book.asks().at_rung(rung),
            }
            .expect("depth checked above");

            if !self.price_within_rails(side, price) {
                debug!(account = %self.account, price, rung, "layer outside price rails, skipped");
                continue;
            }

            let shares = match side {
                Side::Sell => {
                    let is_last = i + 1 == rungs.len();
                    if is_last {
                        held - assigned
                    } else {
                        let part = (held as f64 * ratios[i]).floor() as u64;
                        assigned += part;
                        part
                    }
                }
                Side::Buy => shares_from_amount(total_amount * ratios[i], price),
            };
            if shares == 0 {
                continue;
            }

            if let Some(order_id) = self.place(side, price, shares).await? {
                if rung == min_rung {
                    // The order nearest the top of book is the canonical one.
                    let mut state = self.state.write();
                    match side {
                        Side::Buy => {
                            state.buy_order_id = Some(order_id);
                            state.buy_order_price = price;
                        }
                        Side::Sell => {
                            state.sell_order_id = Some(order_id);
                            state.sell_order_price = price;
                        }
                    }
                }
            }
        }
        Ok(true)
    }

    fn price_within_rails(&self, side: Side, price: f64) -> bool {
        let reference_mid = self.state.read().reference_mid;
        match side {
            Side::Buy => {
                if self.cfg.max_buy_price > 0.0 && price > self.cfg.max_buy_price + PRICE_EPS {
                    return false;
                }
                if self.cfg.max_deviation > 0.0
                    && reference_mid > 0.0
                    && price > reference_mid * (1.0 + self.cfg.max_deviation) + PRICE_EPS
                {
                    return false;
                }
            }
            Side::Sell => {
                if self.cfg.min_sell_price > 0.0 && price < self.cfg.min_sell_price - PRICE_EPS {
                    return false;
                }
                if self.cfg.max_deviation > 0.0
                    && reference_mid > 0.0
                    && price < reference_mid * (1.0 - self.cfg.max_deviation) - PRICE_EPS
                {
                    return false;
                }
            }
        }
        true
    }

    // =========================================================================
    // Order plumbing shared by both strategies
    // =========================================================================

    pub(crate) fn draw_amount(&self) -> f64 {
        let (min, max) = (self.cfg.order_amount_min, self.cfg.order_amount_max);
        if (max - min).abs() < f64::EPSILON {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    fn track_order(&mut self, order_id: &str, side: Side, price: f64) {
        self.fills.track(order_id, side, price);
        self.order_meta
            .insert(order_id.to_string(), (side, price));
    }

    /// Submit a limit order and start tracking it. Business rejections are
    /// absorbed (balance problems set the position-limit flag); only
    /// account-fatal errors propagate.
    pub(crate) async fn place(
        &mut self,
        side: Side,
        price: f64,
        shares: u64,
    ) -> Result<Option<String>, EngineError> {
        let order = match side {
            Side::Buy => OrderRequest::limit_buy(&self.cfg.token_id, price, shares),
            Side::Sell => OrderRequest::limit_sell(&self.cfg.token_id, price, shares),
        };
        match self.submitter.submit(&order).await {
            Ok(outcome) => {
                if let Some(order_id) = outcome.order_id {
                    self.track_order(&order_id, side, price);
                    Ok(Some(order_id))
                } else {
                    Ok(None)
                }
            }
            Err(e) if e.is_fatal_for_account() => Err(EngineError::FatalAccount(e)),
            Err(VenueError::InsufficientBalance { available }) => {
                warn!(
                    account = %self.account,
                    available = ?available,
                    "balance exhausted, treating as position limit"
                );
                self.state.write().position_limit_reached = true;
                Ok(None)
            }
            Err(e) => {
                warn!(account = %self.account, side = %side, price, error = %e, "placement rejected");
                Ok(None)
            }
        }
    }

    pub(crate) async fn cancel_order(&mut self, order_id: &str) {
        let _ = self.submitter.cancel(order_id).await;
        self.fills.untrack(order_id);
        self.order_meta.remove(order_id);
        self.filled_totals.remove(order_id);
    }

    async fn cancel_live_buys(&mut self) {
        let (buy_id, grid_buys) = {
            let state = self.state.read();
            (
                state.buy_order_id.clone(),
                state
                    .grid_buy_orders
                    .iter()
                    .map(|o| o.order_id.clone())
                    .collect::<Vec<_>>(),
            )
        };
        if let Some(order_id) = buy_id {
            self.cancel_order(&order_id).await;
            let mut state = self.state.write();
            state.buy_order_id = None;
            state.buy_order_price = 0.0;
        }
        for order_id in grid_buys {
            self.cancel_order(&order_id).await;
            self.state
                .write()
                .grid_buy_orders
                .retain(|o| o.order_id != order_id);
        }
    }

    pub(crate) async fn cancel_all_live_orders(&mut self) {
        self.cancel_live_buys().await;
        let (sell_id, grid_sells) = {
            let state = self.state.read();
            (
                state.sell_order_id.clone(),
                state
                    .grid_sell_orders
                    .iter()
                    .map(|o| o.order_id.clone())
                    .collect::<Vec<_>>(),
            )
        };
        if let Some(order_id) = sell_id {
            self.cancel_order(&order_id).await;
            let mut state = self.state.write();
            state.sell_order_id = None;
            state.sell_order_price = 0.0;
        }
        for order_id in grid_sells {
            self.cancel_order(&order_id).await;
            let mut state = self.state.write();
            state.grid_sell_orders.retain(|o| o.order_id != order_id);
            for position in &mut state.grid_positions {
                if position.sell_order_id.as_deref() == Some(order_id.as_str()) {
                    position.sell_order_id = None;
                }
            }
        }
    }

    /// Best-effort cancellation of everything still resting, used on
    /// shutdown. Failures are logged, never fatal.
    pub(crate) async fn shutdown_orders(&mut self) {
        debug!(account = %self.account, "cancelling outstanding orders");
        self.cancel_all_live_orders().await;
    }
}
