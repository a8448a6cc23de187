//! Merge / split / redeem service
//!
//! Atomic conversions between complementary YES + NO share pairs and the
//! quote token, with bounded retry on transient chain errors. The venue
//! occasionally reports these as failures while still landing the
//! transaction; a `DelayedSuccess` carrying the hash is treated as success.

use crate::infrastructure::client::types::TxResult;
use crate::infrastructure::client::{VenueClient, VenueError};
use crate::infrastructure::market_info::get_market_info;
use crate::infrastructure::positions::token_balance;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

/// Retry attempts for one settlement call.
const MAX_ATTEMPTS: u32 = 3;
/// Backoff after attempt `n` is `BACKOFF_BASE * (n + 1)`: 2s, then 4s.
const BACKOFF_BASE: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum MergeSplitError {
    #[error("cannot merge {requested} shares: holding {yes} YES / {no} NO")]
    InsufficientPair { requested: u64, yes: u64, no: u64 },

    #[error("market {0} has no YES/NO token pair")]
    NotBinary(i64),

    #[error(transparent)]
    Venue(#[from] VenueError),
}

pub type Result<T> = std::result::Result<T, MergeSplitError>;

pub struct MergeSplitService {
    client: Arc<dyn VenueClient>,
    account: String,
    backoff_base: Duration,
}

impl MergeSplitService {
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

    /// Merge `shares` YES + `shares` NO back into quote tokens.
    ///
    /// Precondition: the account holds at least `shares` of both outcomes.
    pub async fn merge(&self, market_id: i64, shares: u64) -> Result<TxResult> {
        let info = get_market_info(self.client.as_ref(), market_id).await?;
        let (yes_token, no_token) = match (&info.yes_token_id, &info.no_token_id) {
            (Some(yes), Some(no)) => (yes.clone(), no.clone()),
            _ => return Err(MergeSplitError::NotBinary(market_id)),
        };
        let yes_held = token_balance(self.client.as_ref(), &yes_token).await?;
        let no_held = token_balance(self.client.as_ref(), &no_token).await?;
        if shares > yes_held.min(no_held) {
            return Err(MergeSplitError::InsufficientPair {
                requested: shares,
                yes: yes_held,
                no: no_held,
            });
        }

        let result = self
            .with_retry("merge", || self.client.merge(market_id, shares))
            .await?;
        info!(
            account = %self.account,
            market_id,
            shares,
            tx_hash = %result.tx_hash,
            "merged outcome pair into quote"
        );
        Ok(result)
    }

    /// Split `amount` quote tokens into `amount` YES + `amount` NO shares.
    pub async fn split(&self, market_id: i64, amount: u64) -> Result<TxResult> {
        let result = self
            .with_retry("split", || self.client.split(market_id, amount))
            .await?;
        info!(
            account = %self.account,
            market_id,
            amount,
            tx_hash = %result.tx_hash,
            "split quote into outcome pair"
        );
        Ok(result)
    }

    /// Redeem winning shares after market resolution.
    pub async fn redeem(&self, market_id: i64) -> Result<TxResult> {
        let result = self
            .with_retry("redeem", || self.client.redeem(market_id))
            .await?;
        info!(account = %self.account, market_id, tx_hash = %result.tx_hash, "redeemed");
        Ok(result)
    }

    async fn with_retry<F, Fut>(&self, op: &str, call: F) -> Result<TxResult>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<TxResult, VenueError>>,
    {
        let mut last_error = VenueError::Network("no attempt made".to_string());
        for attempt in 0..MAX_ATTEMPTS {
            match call().await {
                Ok(result) => return Ok(result),
                Err(VenueError::DelayedSuccess { hash }) => {
                    info!(account = %self.account, op, tx_hash = %hash, "delayed success");
                    return Ok(TxResult { tx_hash: hash });
                }
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let backoff = self.backoff_base * (attempt + 1);
                    warn!(
                        account = %self.account,
                        op,
                        attempt = attempt + 1,
                        error = %e,
                        backoff = ?backoff,
                        "transient settlement failure, retrying"
                    );
                    last_error = e;
                    sleep(backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_error.into())
    }
}
