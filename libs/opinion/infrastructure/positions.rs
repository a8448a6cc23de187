//! Position helpers over the venue client
//!
//! Zero-share entries are dropped at this boundary so callers only ever see
//! live positions.

use crate::infrastructure::client::types::Position;
use crate::infrastructure::client::{VenueClient, VenueError};
use std::time::Duration;
use tokio::time::sleep;

/// Aggregate view of an account's positions.
#[derive(Debug, Clone, Default)]
pub struct PositionSummary {
    pub total_value: f64,
    pub total_cost: f64,
    pub total_pnl: f64,
    pub pnl_percent: f64,
    pub position_count: usize,
}

/// Direction a position is expected to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionDirection {
    Increase,
    Decrease,
}

/// Fetch positions, optionally filtered by market and token.
pub async fn get_positions(
    client: &dyn VenueClient,
    market_id: Option<i64>,
    token_id: Option<&str>,
) -> Result<Vec<Position>, VenueError> {
    let positions = client.get_positions(market_id).await?;
    Ok(positions
        .into_iter()
        .filter(|p| p.shares_owned > 0)
        .filter(|p| token_id.map_or(true, |t| p.token_id == t))
        .collect())
}

/// Shares held of one token.
pub async fn token_balance(client: &dyn VenueClient, token_id: &str) -> Result<u64, VenueError> {
    let positions = get_positions(client, None, Some(token_id)).await?;
    Ok(positions.first().map(|p| p.shares_owned).unwrap_or(0))
}

/// Summarize all live positions.
pub async fn summary(client: &dyn VenueClient) -> Result<PositionSummary, VenueError> {
    let positions = get_positions(client, None, None).await?;
    let total_value: f64 = positions.iter().filter_map(|p| p.current_value).sum();
    let total_cost: f64 = positions.iter().filter_map(|p| p.cost).sum();
    let total_pnl = total_value - total_cost;
    let pnl_percent = if total_cost > 0.0 {
        total_pnl / total_cost * 100.0
    } else {
        0.0
    };
    Ok(PositionSummary {
        total_value,
        total_cost,
        total_pnl,
        pnl_percent,
        position_count: positions.len(),
    })
}

/// Poll until the token balance moves in the expected direction, or time out.
/// Returns (moved, latest_balance).
pub async fn wait_for_position_update(
    client: &dyn VenueClient,
    token_id: &str,
    initial_balance: u64,
    direction: PositionDirection,
    timeout: Duration,
    check_interval: Duration,
) -> (bool, u64) {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if let Ok(current) = token_balance(client, token_id).await {
            let moved = match direction {
                PositionDirection::Increase => current > initial_balance,
                PositionDirection::Decrease => current < initial_balance,
            };
            if moved {
                return (true, current);
            }
        }
        sleep(check_interval).await;
    }
    (false, initial_balance)
}
