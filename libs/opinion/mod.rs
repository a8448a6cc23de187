//! Opinion Trading Bot
//!
//! Core library for a multi-account market-making agent on the Opinion
//! binary-outcome prediction market.

// Core layers (Clean Architecture)
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod utils;

// Re-export commonly used items from the domain layer
pub use domain::{Orderbook, OrderStatus, PriceLevel, Side, TradeRecord};

// Re-export from infrastructure
pub use infrastructure::{
    init_tracing, AccountConfig, MarketRegistry, MergeSplitService, OrderSigner, OrderbookManager,
    OrderbookRegistry, ProxyCache, RestClient, VenueClient, VenueError,
};

// Re-export from the application layer
pub use application::{
    Coordinator, EngineSpec, MarketMakerConfig, MarketMakerEngine, MarketMakerState,
    SessionSummary,
};

// Re-export utils
pub use utils::ProcessSupervisor;
