//! Market-maker strategy configuration
//!
//! All prices are probabilities in [0, 1]; amounts are quote tokens.
//! Zero means "disabled" for optional limits, matching the venue convention
//! of leaving rails off unless set. `validate()` enforces the invariants the
//! engine relies on, so an engine never starts from a bad config.

use crate::domain::DistributionMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// What to do with the position after an emergency cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropAction {
    /// Cancel orders only, keep the whole position.
    Hold,
    /// Cancel orders, then sell the entire position.
    SellAll,
    /// Cancel orders, then sell `emergency_sell_percent` of the position.
    SellPartial,
}

impl Default for DropAction {
    fn default() -> Self {
        DropAction::Hold
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMakerConfig {
    // Target
    #[serde(default)]
    pub market_id: i64,
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub market_title: String,

    // Quoting
    /// Pause placement when ask1 - bid1 falls below this.
    #[serde(default = "default_min_spread")]
    pub min_spread: f64,
    /// Minimum increment when chasing the top of book.
    #[serde(default = "default_price_step")]
    pub price_step: f64,

    // Price boundaries (hard rails; 0 disables)
    #[serde(default)]
    pub max_buy_price: f64,
    #[serde(default)]
    pub min_sell_price: f64,
    /// Max relative deviation from the startup mid, e.g. 0.1 = 10%.
    #[serde(default)]
    pub max_deviation: f64,

    // Depth gate (0 disables)
    /// Required quote depth across the top 5 levels of each side.
    #[serde(default)]
    pub min_orderbook_depth: f64,

    // Sizing
    #[serde(default = "default_order_amount_min")]
    pub order_amount_min: f64,
    #[serde(default = "default_order_amount_max")]
    pub order_amount_max: f64,

    // Position limits (at least one must be set)
    #[serde(default)]
    pub max_position_shares: u64,
    #[serde(default)]
    pub max_position_amount: f64,
    /// Percent of net worth, e.g. 25 = 25%.
    #[serde(default)]
    pub max_position_percent: f64,

    // Stop-loss (at most one may be set)
    #[serde(default)]
    pub stop_loss_percent: f64,
    #[serde(default)]
    pub stop_loss_amount: f64,
    #[serde(default)]
    pub stop_loss_price: f64,

    // Cadence
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    // Stop-loss depth probe
    #[serde(default = "default_min_depth_levels")]
    pub min_depth_levels: usize,
    #[serde(default = "default_min_depth_amount")]
    pub min_depth_amount: f64,

    // Depth-drop protection
    /// Percent drop across the window that trips the gate.
    #[serde(default = "default_depth_drop_threshold")]
    pub depth_drop_threshold: f64,
    /// Window length in ticks.
    #[serde(default = "default_depth_drop_window")]
    pub depth_drop_window: usize,
    #[serde(default = "default_true")]
    pub auto_cancel_on_depth_drop: bool,
    #[serde(default)]
    pub emergency_position_action: DropAction,
    #[serde(default)]
    pub emergency_sell_percent: f64,

    // Layered quoting
    #[serde(default)]
    pub layered_enabled: bool,
    /// Ladder positions, 1-based: [1, 5, 10] quotes at rungs 1, 5 and 10.
    #[serde(default = "default_price_levels")]
    pub price_levels: Vec<usize>,
    #[serde(default)]
    pub distribution: DistributionMode,
    #[serde(default)]
    pub custom_ratios: Option<Vec<f64>>,

    // Cost-based selling
    #[serde(default)]
    pub cost_sell_enabled: bool,
    /// Ask = average cost + this.
    #[serde(default = "default_sell_profit_spread")]
    pub sell_profit_spread: f64,
    #[serde(default = "default_min_cost_profit_spread")]
    pub min_cost_profit_spread: f64,

    // Grid strategy
    #[serde(default)]
    pub grid_enabled: bool,
    /// Paired sell = buy price + this.
    #[serde(default = "default_grid_profit_spread")]
    pub grid_profit_spread: f64,
    #[serde(default = "default_grid_min_profit_spread")]
    pub grid_min_profit_spread: f64,
    #[serde(default = "default_grid_levels")]
    pub grid_levels: usize,
    #[serde(default = "default_grid_level_spread")]
    pub grid_level_spread: f64,
    #[serde(default = "default_grid_amount_per_level")]
    pub grid_amount_per_level: f64,
    #[serde(default = "default_true")]
    pub grid_auto_rebalance: bool,
}

fn default_min_spread() -> f64 {
    0.001
}
fn default_price_step() -> f64 {
    0.001
}
fn default_order_amount_min() -> f64 {
    5.0
}
fn default_order_amount_max() -> f64 {
    20.0
}
fn default_check_interval_ms() -> u64 {
    2000
}
fn default_min_depth_levels() -> usize {
    5
}
fn default_min_depth_amount() -> f64 {
    100.0
}
fn default_depth_drop_threshold() -> f64 {
    50.0
}
fn default_depth_drop_window() -> usize {
    3
}
fn default_price_levels() -> Vec<usize> {
    vec![1]
}
fn default_sell_profit_spread() -> f64 {
    0.01
}
fn default_min_cost_profit_spread() -> f64 {
    0.005
}
fn default_grid_profit_spread() -> f64 {
    0.01
}
fn default_grid_min_profit_spread() -> f64 {
    0.005
}
fn default_grid_levels() -> usize {
    5
}
fn default_grid_level_spread() -> f64 {
    0.01
}
fn default_grid_amount_per_level() -> f64 {
    10.0
}
fn default_true() -> bool {
    true
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("empty config deserializes from defaults")
    }
}

impl MarketMakerConfig {
    /// Load and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: MarketMakerConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn has_position_limit(&self) -> bool {
        self.max_position_shares > 0
            || self.max_position_amount > 0.0
            || self.max_position_percent > 0.0
    }

    pub fn has_stop_loss(&self) -> bool {
        self.stop_loss_percent > 0.0 || self.stop_loss_amount > 0.0 || self.stop_loss_price > 0.0
    }

    pub fn validate(&self) -> Result<()> {
        fn fail(msg: impl Into<String>) -> Result<()> {
            Err(ConfigError::Validation(msg.into()))
        }

        if self.token_id.is_empty() {
            return fail("token_id is required");
        }
        if !self.has_position_limit() {
            return fail(
                "at least one position limit is required \
                 (max_position_shares, max_position_amount or max_position_percent)",
            );
        }
        let stops_set = [
            self.stop_loss_percent > 0.0,
            self.stop_loss_amount > 0.0,
            self.stop_loss_price > 0.0,
        ]
        .iter()
        .filter(|&&s| s)
        .count();
        if stops_set > 1 {
            return fail("at most one stop-loss trigger may be set");
        }
        if self.grid_enabled && self.layered_enabled {
            return fail("grid_enabled and layered_enabled are mutually exclusive");
        }
        if self.min_spread < 0.0 || self.price_step <= 0.0 {
            return fail("min_spread must be >= 0 and price_step > 0");
        }
        if self.order_amount_min <= 0.0 || self.order_amount_max < self.order_amount_min {
            return fail("order amount range must satisfy 0 < min <= max");
        }
        if self.check_interval_ms == 0 {
            return fail("check_interval_ms must be > 0");
        }
        for &bound in &[self.max_buy_price, self.min_sell_price, self.stop_loss_price] {
            if bound < 0.0 || bound > 1.0 {
                return fail("price bounds must lie in [0, 1]");
            }
        }
        if self.max_deviation < 0.0 {
            return fail("max_deviation must be >= 0");
        }
        if self.depth_drop_window < 1 {
            return fail("depth_drop_window must be >= 1");
        }
        if self.emergency_position_action == DropAction::SellPartial
            && !(0.0 < self.emergency_sell_percent && self.emergency_sell_percent <= 100.0)
        {
            return fail("emergency_sell_percent must be in (0, 100] for sell_partial");
        }
        if self.layered_enabled {
            if self.price_levels.is_empty() || self.price_levels.contains(&0) {
                return fail("price_levels must be non-empty, 1-based rung positions");
            }
            if self.distribution == DistributionMode::Custom {
                let ratios = self.custom_ratios.as_deref().unwrap_or(&[]);
                if ratios.len() != self.price_levels.len() {
                    return fail("custom_ratios must match price_levels in length");
                }
                if ratios.iter().any(|&r| r <= 0.0) {
                    return fail("custom_ratios must all be positive");
                }
            }
        }
        if self.grid_enabled {
            if self.grid_levels == 0 {
                return fail("grid_levels must be >= 1");
            }
            if self.grid_level_spread <= 0.0 || self.grid_amount_per_level <= 0.0 {
                return fail("grid level spread and amount must be positive");
            }
            if self.grid_profit_spread < self.grid_min_profit_spread {
                return fail("grid_profit_spread must be >= grid_min_profit_spread");
            }
        }
        if self.cost_sell_enabled && self.sell_profit_spread <= 0.0 {
            return fail("sell_profit_spread must be positive when cost_sell_enabled");
        }
        Ok(())
    }
}
