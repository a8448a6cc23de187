//! Stop-loss liquidation
//!
//! Drives the position to zero under a slippage budget. A deep buy side
//! takes the fast path: one marketable limit at the best bid for the full
//! size. A thin book gets the bounded loop: sell at the current best bid,
//! wait briefly for fills, chase if the bid moves, and give up after the
//! iteration budget rather than bleeding forever.

use crate::infrastructure::client::types::OrderRequest;
use crate::infrastructure::client::VenueClient;
use crate::infrastructure::orderbook_manager::OrderbookManager;
use crate::infrastructure::positions;
use crate::infrastructure::submitter::OrderSubmitter;
use crate::domain::{prices_equal, OrderStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Maximum thin-path iterations before reporting the remainder.
const MAX_ITERATIONS: usize = 30;
/// How long to wait for fills on one thin-path order.
const FILL_WAIT: Duration = Duration::from_secs(20);
/// Poll cadence while waiting.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What the liquidation actually did.
#[derive(Debug, Default)]
pub struct StopLossReport {
    pub requested: u64,
    /// (price, shares) per recorded execution.
    pub executions: Vec<(f64, u64)>,
    pub remaining: u64,
    pub iterations: usize,
}

impl StopLossReport {
    pub fn sold(&self) -> u64 {
        self.executions.iter().map(|&(_, shares)| shares).sum()
    }
}

pub struct StopLossExecutor<'a> {
    client: &'a Arc<dyn VenueClient>,
    submitter: &'a OrderSubmitter,
    token_id: &'a str,
    min_depth_levels: usize,
    min_depth_amount: f64,
    fill_wait: Duration,
    poll_interval: Duration,
}

impl<'a> StopLossExecutor<'a> {
    pub fn new(
        client: &'a Arc<dyn VenueClient>,
        submitter: &'a OrderSubmitter,
        token_id: &'a str,
        min_depth_levels: usize,
        min_depth_amount: f64,
    ) -> Self {
        Self {
            client,
            submitter,
            token_id,
            min_depth_levels,
            min_depth_amount,
            fill_wait: FILL_WAIT,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Shrink the waiting cadence; test hook.
    pub fn with_timing(mut self, fill_wait: Duration, poll_interval: Duration) -> Self {
        self.fill_wait = fill_wait;
        self.poll_interval = poll_interval;
        self
    }

    pub async fn execute(&self, book: &OrderbookManager) -> StopLossReport {
        let shares = match positions::token_balance(self.client.as_ref(), self.token_id).await {
            Ok(shares) => shares,
            Err(e) => {
                warn!(token_id = %self.token_id, error = %e, "position query failed, nothing liquidated");
                return StopLossReport::default();
            }
        };
        let mut report = StopLossReport {
            requested: shares,
            ..StopLossReport::default()
        };
        if shares == 0 {
            return report;
        }

        let snapshot = book.snapshot();
        let deep = snapshot.bids().len() >= self.min_depth_levels
            && snapshot.bid_depth(self.min_depth_levels) >= self.min_depth_amount;

        if deep {
            if let Some((bid1, _)) = snapshot.best_bid() {
                info!(
                    token_id = %self.token_id,
                    shares,
                    bid1,
                    "deep book, liquidating in one marketable limit"
                );
                let order = OrderRequest::limit_sell(self.token_id, bid1, shares);
                match self.submitter.submit(&order).await {
                    Ok(_) => {
                        report.executions.push((bid1, shares));
                        return report;
                    }
                    Err(e) => {
                        warn!(error = %e, "deep-path sell failed, falling back to thin path");
                    }
                }
            }
        }

        self.thin_path(book, shares, &mut report).await;
        report
    }

    /// Chase the best bid with bounded iterations, selling the remainder
    /// each round.
    async fn thin_path(&self, book: &OrderbookManager, shares: u64, report: &mut StopLossReport) {
        let mut remaining = shares;

        for iteration in 0..MAX_ITERATIONS {
            if remaining == 0 {
                break;
            }
            report.iterations = iteration + 1;

            let Some((bid1, _)) = book.snapshot().best_bid() else {
                debug!(token_id = %self.token_id, "no bids, waiting");
                sleep(self.poll_interval).await;
                continue;
            };

            let order = OrderRequest::limit_sell(self.token_id, bid1, remaining);
            let order_id = match self.submitter.submit(&order).await {
                Ok(outcome) => match outcome.order_id {
                    Some(order_id) => order_id,
                    None => continue,
                },
                Err(e) => {
                    warn!(error = %e, "thin-path sell failed");
                    sleep(self.poll_interval).await;
                    continue;
                }
            };

            let mut filled: u64 = 0;
            let deadline = tokio::time::Instant::now() + self.fill_wait;
            let mut terminal = false;
            while tokio::time::Instant::now() < deadline {
                sleep(self.poll_interval).await;
                match self.client.get_order(&order_id).await {
                    Ok(order) => {
                        filled = order.filled_shares;
                        if order.order_status() == OrderStatus::Filled {
                            terminal = true;
                            break;
                        }
                    }
                    Err(e) => debug!(error = %e, "fill poll failed"),
                }
                // Chase: if the best bid moved away from our price, re-place.
                if let Some((current_bid, _)) = book.snapshot().best_bid() {
                    if !prices_equal(current_bid, bid1) {
                        debug!(old = bid1, new = current_bid, "best bid moved, re-pricing");
                        break;
                    }
                }
            }

            if !terminal {
                let _ = self.submitter.cancel(&order_id).await;
                // Capture anything that filled between the last poll and the
                // cancel.
                if let Ok(order) = self.client.get_order(&order_id).await {
                    filled = filled.max(order.filled_shares);
                }
            }

            if filled > 0 {
                report.executions.push((bid1, filled.min(remaining)));
                remaining = remaining.saturating_sub(filled);
            }
        }

        report.remaining = remaining;
        if remaining > 0 {
            warn!(
                token_id = %self.token_id,
                remaining,
                "liquidation budget exhausted with shares left"
            );
        } else {
            info!(token_id = %self.token_id, sold = report.sold(), "position fully liquidated");
        }
    }
}
