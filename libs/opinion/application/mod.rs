//! Application layer: the trading strategies and their orchestration.

pub mod market_maker;

pub use market_maker::{
    Coordinator, EngineSpec, MarketMakerConfig, MarketMakerEngine, MarketMakerState,
    SessionSummary,
};
