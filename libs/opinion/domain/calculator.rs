//! Pure order sizing math
//!
//! Share/amount conversions and the ratio tables used by layered quoting.
//! Everything here is deterministic and side-effect free.

use super::types::PRICE_EPS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CalcError {
    #[error("distribution requires at least one level")]
    NoLevels,

    #[error("custom ratios missing or wrong length: expected {expected}, got {got}")]
    RatioLength { expected: usize, got: usize },

    #[error("custom ratios must all be positive")]
    NonPositiveRatio,
}

/// Whole shares purchasable with `amount` at `price`.
pub fn shares_from_amount(amount: f64, price: f64) -> u64 {
    if price > PRICE_EPS && amount > 0.0 {
        (amount / price).floor() as u64
    } else {
        0
    }
}

/// Quote amount for `shares` at `price`.
pub fn amount_from_shares(shares: u64, price: f64) -> f64 {
    shares as f64 * price
}

/// Whole shares for a fraction of a quote balance.
pub fn position_shares(balance: f64, price: f64, ratio: f64) -> u64 {
    shares_from_amount(balance * ratio, price)
}

/// How order size is spread across ladder levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
    Uniform,
    Pyramid,
    InversePyramid,
    Custom,
}

impl Default for DistributionMode {
    fn default() -> Self {
        DistributionMode::Uniform
    }
}

/// Normalized per-level ratios for `n` levels.
///
/// Uniform: equal weights. Pyramid: weights 1..n (small near the top of
/// book). InversePyramid: weights n..1. Custom: caller weights, normalized.
/// All returned ratios are positive and sum to 1 within float tolerance.
pub fn distribution_ratios(
    n: usize,
    mode: DistributionMode,
    custom: Option<&[f64]>,
) -> Result<Vec<f64>, CalcError> {
    if n == 0 {
        return Err(CalcError::NoLevels);
    }
    let weights: Vec<f64> = match mode {
        DistributionMode::Uniform => vec![1.0; n],
        DistributionMode::Pyramid => (1..=n).map(|i| i as f64).collect(),
        DistributionMode::InversePyramid => (1..=n).rev().map(|i| i as f64).collect(),
        DistributionMode::Custom => {
            let ratios = custom.unwrap_or(&[]);
            if ratios.len() != n {
                return Err(CalcError::RatioLength {
                    expected: n,
                    got: ratios.len(),
                });
            }
            if ratios.iter().any(|&r| r <= 0.0) {
                return Err(CalcError::NonPositiveRatio);
            }
            ratios.to_vec()
        }
    };
    let total: f64 = weights.iter().sum();
    Ok(weights.into_iter().map(|w| w / total).collect())
}
