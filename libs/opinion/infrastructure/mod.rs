//! Infrastructure layer: venue client, shared services, configuration.

pub mod client;
pub mod config;
pub mod logging;
pub mod market_info;
pub mod market_registry;
pub mod merge_split;
pub mod orderbook_manager;
pub mod positions;
pub mod submitter;

pub use client::{
    OrderSigner, RestClient, VenueClient, VenueError, DEFAULT_BASE_URL, DEFAULT_WS_URL,
};
pub use config::{load_accounts, load_accounts_from_dir, AccountConfig, ProxyCache};
pub use logging::init_tracing;
pub use market_info::{get_child_markets, get_market_info, MarketInfo};
pub use market_registry::{MarketRegistry, MarketSummary, DEFAULT_REFRESH_INTERVAL};
pub use merge_split::{MergeSplitError, MergeSplitService};
pub use orderbook_manager::{
    OrderbookManager, OrderbookRegistry, UpdateCallback, DEFAULT_WS_TIMEOUT,
};
pub use submitter::{OrderSubmitter, SubmitOutcome};
