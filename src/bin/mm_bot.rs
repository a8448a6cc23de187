//! Multi-account market maker runner
//!
//! Wires accounts, strategy config, the shared orderbook registry and the
//! fan-out coordinator, then trades until a termination signal arrives.
//!
//! Environment:
//! - `OPINION_ACCOUNTS_FILE` — account list (or a directory of lists)
//! - `OPINION_MM_CONFIG` — strategy YAML
//! - `OPINION_BASE_URL` / `OPINION_WS_URL` — venue endpoints (optional)
//! - `OPINION_LOG` — log level (optional, `RUST_LOG` overrides)

use anyhow::{Context, Result};
use opinion::application::market_maker::single_market_specs;
use opinion::infrastructure::client::{DEFAULT_BASE_URL, DEFAULT_WS_URL};
use opinion::infrastructure::{
    client::ws::run_market_stream, load_accounts, load_accounts_from_dir, DEFAULT_WS_TIMEOUT,
};
use opinion::{
    Coordinator, MarketMakerConfig, MarketRegistry, OrderSigner, OrderbookRegistry,
    ProcessSupervisor, ProxyCache, RestClient, VenueClient,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let log_level = std::env::var("OPINION_LOG").unwrap_or_else(|_| "info".to_string());
    opinion::init_tracing(&log_level);

    let base_url =
        std::env::var("OPINION_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let ws_url = std::env::var("OPINION_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string());
    let accounts_path = std::env::var("OPINION_ACCOUNTS_FILE")
        .context("OPINION_ACCOUNTS_FILE must point to an account list")?;
    let config_path = std::env::var("OPINION_MM_CONFIG")
        .context("OPINION_MM_CONFIG must point to a strategy YAML")?;

    let config = MarketMakerConfig::load(&config_path)
        .with_context(|| format!("loading strategy config from {config_path}"))?;

    let cache = ProxyCache::new("proxy_cache.json");
    let accounts = if Path::new(&accounts_path).is_dir() {
        load_accounts_from_dir(&accounts_path, &cache, &base_url).await?
    } else {
        load_accounts(&accounts_path, &cache, &base_url).await?
    };
    info!(accounts = accounts.len(), market_id = config.market_id, "starting market maker");

    // One venue client per account, each with its own signing context.
    let mut clients: Vec<(String, Arc<dyn VenueClient>)> = Vec::new();
    let api_key = accounts
        .first()
        .map(|a| a.api_key.clone())
        .unwrap_or_default();
    for account in &accounts {
        let signer = OrderSigner::new(&account.private_key)
            .with_context(|| format!("bad signing key for account {}", account.remark))?;
        let client = Arc::new(RestClient::new(
            base_url.clone(),
            account.api_key.clone(),
            signer,
            account.remark.clone(),
        ));
        clients.push((account.remark.clone(), client));
    }

    let shared_client = Arc::clone(&clients[0].1);
    let market_registry =
        MarketRegistry::initialize(Arc::clone(&shared_client), true, Duration::from_secs(60)).await;
    if let Some(market) = market_registry.get_by_id(config.market_id) {
        info!(title = %market.title, end_time = ?market.end_time, "target market");
    }

    let orderbooks = Arc::new(OrderbookRegistry::new(
        Arc::clone(&shared_client),
        DEFAULT_WS_TIMEOUT,
    ));

    let supervisor = ProcessSupervisor::new();
    supervisor.install_signal_handler();

    // Market data stream: depth diffs into the registry.
    let stream_flag = supervisor.run_flag();
    let stream_registry = Arc::clone(&orderbooks);
    let stream_market_ids = vec![config.market_id];
    let stream_task = tokio::spawn(async move {
        run_market_stream(
            &ws_url,
            &api_key,
            &stream_market_ids,
            stream_registry,
            None,
            stream_flag,
        )
        .await;
    });

    let mut coordinator = Coordinator::new(Arc::clone(&orderbooks));
    let specs = single_market_specs(clients, &config);
    coordinator.start(specs).await?;

    supervisor.wait_for_shutdown().await;

    info!("shutting down, cancelling outstanding orders");
    let summaries = coordinator.stop_all().await;
    for summary in &summaries {
        info!(
            account = %summary.account,
            bought = summary.total_buy_shares,
            sold = summary.total_sell_shares,
            realized_pnl = summary.realized_pnl,
            spread_profit = summary.spread_profit,
            max_drawdown = summary.max_drawdown,
            stop_loss = summary.stop_loss_triggered,
            depth_drop = summary.depth_drop_triggered,
            "session summary"
        );
    }
    market_registry.shutdown();
    if let Err(e) = stream_task.await {
        warn!(error = %e, "market stream task ended abnormally");
    }
    Ok(())
}
