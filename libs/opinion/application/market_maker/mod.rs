//! Market-maker application: config, state, engine, strategies, fan-out.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod fills;
pub mod grid;
pub mod state;
pub mod stop_loss;

pub use config::{DropAction, MarketMakerConfig};
pub use coordinator::{
    batch_specs, filter_by_balance, single_market_specs, Coordinator, EngineSpec,
    InsufficientAccount,
};
pub use engine::{EngineError, MarketMakerEngine};
pub use fills::{FillEvent, FillTracker, PollOutcome};
pub use state::{
    GridBuyOrder, GridPosition, GridSellOrder, MarketMakerState, SessionSummary,
};
pub use stop_loss::{StopLossExecutor, StopLossReport};
