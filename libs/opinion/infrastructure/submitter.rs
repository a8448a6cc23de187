//! Order submitter
//!
//! Thin layer between the strategies and the venue: submits a built order,
//! retries transient network faults with linear backoff, and normalizes the
//! venue's delayed-success quirk (an error body carrying a transaction hash)
//! into a successful outcome.

use crate::infrastructure::client::types::{OrderPlacement, OrderRequest};
use crate::infrastructure::client::{VenueClient, VenueError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Maximum submission attempts for one order.
const MAX_ATTEMPTS: u32 = 3;
/// Backoff after attempt `n` is `BACKOFF_BASE * (n + 1)`.
const BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Outcome of a submission: a resting order id, or a settlement hash when
/// the venue reported delayed success.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub order_id: Option<String>,
    pub tx_hash: Option<String>,
}

impl SubmitOutcome {
    fn placed(placement: OrderPlacement) -> Self {
        Self {
            order_id: Some(placement.order_id),
            tx_hash: None,
        }
    }

    fn delayed(hash: String) -> Self {
        Self {
            order_id: None,
            tx_hash: Some(hash),
        }
    }
}

/// Per-account submitter.
pub struct OrderSubmitter {
    client: Arc<dyn VenueClient>,
    account: String,
    backoff_base: Duration,
}

impl OrderSubmitter {
    pub fn new(client: Arc<dyn VenueClient>, account: impl Into<String>) -> Self {
        Self {
            client,
            account: account.into(),
            backoff_base: BACKOFF_BASE,
        }
    }

    /// Shrink the retry backoff; test hook.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Submit an order, retrying only transient network faults.
    pub async fn submit(&self, order: &OrderRequest) -> Result<SubmitOutcome, VenueError> {
        let mut last_error = VenueError::Network("no attempt made".to_string());
        for attempt in 0..MAX_ATTEMPTS {
            match self.client.place_order(order).await {
                Ok(placement) => {
                    info!(
                        account = %self.account,
                        token_id = %order.token_id,
                        side = %order.side,
                        price = order.price,
                        order_id = %placement.order_id,
                        "order placed"
                    );
                    return Ok(SubmitOutcome::placed(placement));
                }
                Err(VenueError::DelayedSuccess { hash }) => {
                    info!(account = %self.account, tx_hash = %hash, "order settled with delayed success");
                    return Ok(SubmitOutcome::delayed(hash));
                }
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let backoff = self.backoff_base * (attempt + 1);
                    warn!(
                        account = %self.account,
                        attempt = attempt + 1,
                        error = %e,
                        backoff = ?backoff,
                        "transient submit failure, retrying"
                    );
                    last_error = e;
                    sleep(backoff).await;
                }
                Err(e) => {
                    warn!(account = %self.account, error = %e, "order rejected");
                    return Err(e);
                }
            }
        }
        Err(last_error)
    }

    /// Cancel one order. Failures are returned, not retried; callers decide
    /// whether a failed cancel matters.
    pub async fn cancel(&self, order_id: &str) -> Result<(), VenueError> {
        match self.client.cancel_order(order_id).await {
            Ok(()) => {
                debug!(account = %self.account, order_id, "order cancelled");
                Ok(())
            }
            Err(VenueError::NotFound(_)) => {
                // Already gone (filled or cancelled elsewhere).
                debug!(account = %self.account, order_id, "cancel target already gone");
                Ok(())
            }
            Err(e) => {
                warn!(account = %self.account, order_id, error = %e, "cancel failed");
                Err(e)
            }
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }
}
