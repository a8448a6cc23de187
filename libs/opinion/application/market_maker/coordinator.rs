//! Fan-out coordinator
//!
//! Runs one engine per (account, token) on its own task. Engines are fully
//! isolated from each other; replicas are shared by reference through the
//! orderbook registry, one per token. Shutdown flips every engine's running
//! flag, lets each cancel its own orders, and joins workers under a bounded
//! timeout.

use super::config::MarketMakerConfig;
use super::engine::{EngineError, MarketMakerEngine};
use super::state::{MarketMakerState, SessionSummary};
use crate::infrastructure::client::VenueClient;
use crate::infrastructure::orderbook_manager::OrderbookRegistry;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Default join timeout on shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One engine to launch: an account identity bound to a strategy config.
pub struct EngineSpec {
    pub account: String,
    pub client: Arc<dyn VenueClient>,
    pub config: MarketMakerConfig,
    /// Outcome routed to this token's replica (1 = YES, 2 = NO).
    pub outcome_side: u8,
}

impl EngineSpec {
    pub fn new(
        account: impl Into<String>,
        client: Arc<dyn VenueClient>,
        config: MarketMakerConfig,
    ) -> Self {
        Self {
            account: account.into(),
            client,
            config,
            outcome_side: 1,
        }
    }
}

/// Build specs for the single-market topology: one config template fanned
/// across many accounts.
pub fn single_market_specs(
    accounts: Vec<(String, Arc<dyn VenueClient>)>,
    template: &MarketMakerConfig,
) -> Vec<EngineSpec> {
    accounts
        .into_iter()
        .map(|(account, client)| EngineSpec::new(account, client, template.clone()))
        .collect()
}

/// Build specs for the batch topology: many markets, each with its own
/// disjoint account subset.
pub fn batch_specs(
    batches: Vec<(MarketMakerConfig, Vec<(String, Arc<dyn VenueClient>)>)>,
) -> Vec<EngineSpec> {
    batches
        .into_iter()
        .flat_map(|(config, accounts)| {
            accounts
                .into_iter()
                .map(move |(account, client)| EngineSpec::new(account, client, config.clone()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// An account whose balance fell short of the requirement.
#[derive(Debug, Clone)]
pub struct InsufficientAccount {
    pub remark: String,
    pub balance: f64,
    pub required: f64,
}

/// Partition accounts by quote balance. Accounts whose balance query fails
/// are reported as insufficient with a zero balance.
pub async fn filter_by_balance(
    accounts: &[(String, Arc<dyn VenueClient>)],
    min_balance: f64,
) -> (Vec<String>, Vec<InsufficientAccount>) {
    let mut sufficient = Vec::new();
    let mut insufficient = Vec::new();
    for (remark, client) in accounts {
        match client.get_balance().await {
            Ok(balance) if balance >= min_balance => sufficient.push(remark.clone()),
            Ok(balance) => insufficient.push(InsufficientAccount {
                remark: remark.clone(),
                balance,
                required: min_balance,
            }),
            Err(e) => {
                warn!(account = %remark, error = %e, "balance query failed");
                insufficient.push(InsufficientAccount {
                    remark: remark.clone(),
                    balance: 0.0,
                    required: min_balance,
                });
            }
        }
    }
    (sufficient, insufficient)
}

struct EngineHandle {
    account: String,
    token_id: String,
    state: Arc<RwLock<MarketMakerState>>,
    task: JoinHandle<SessionSummary>,
}

pub struct Coordinator {
    registry: Arc<OrderbookRegistry>,
    engines: Vec<EngineHandle>,
    join_timeout: Duration,
}

impl Coordinator {
    pub fn new(registry: Arc<OrderbookRegistry>) -> Self {
        Self {
            registry,
            engines: Vec::new(),
            join_timeout: JOIN_TIMEOUT,
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    /// Spawn one engine per spec. Replicas are created (and seeded) lazily,
    /// shared across every engine quoting the same token.
    pub async fn start(&mut self, specs: Vec<EngineSpec>) -> Result<(), EngineError> {
        for spec in specs {
            let manager = self.registry.ensure(
                &spec.config.token_id,
                spec.config.market_id,
                spec.outcome_side,
                None,
            );
            if !manager.is_running() {
                if let Err(e) = manager.start().await {
                    warn!(token_id = %spec.config.token_id, error = %e, "replica seed failed, engine will retry via watchdog");
                }
            }

            let account = spec.account.clone();
            let token_id = spec.config.token_id.clone();
            let mut engine =
                MarketMakerEngine::new(spec.account, spec.config, spec.client, manager)?;
            let state = engine.state_handle();
            let task = tokio::spawn(async move { engine.run().await });
            self.engines.push(EngineHandle {
                account,
                token_id,
                state,
                task,
            });
        }
        info!(engines = self.engines.len(), "coordinator started");
        Ok(())
    }

    /// Observable run-time snapshots, one per engine.
    pub fn states(&self) -> Vec<(String, MarketMakerState)> {
        self.engines
            .iter()
            .map(|handle| (handle.account.clone(), handle.state.read().clone()))
            .collect()
    }

    /// Stop everything: flip the flags, let engines cancel their own orders
    /// on the way out, join with a bounded timeout, and collect summaries.
    pub async fn stop_all(&mut self) -> Vec<SessionSummary> {
        for handle in &self.engines {
            handle.state.write().running = false;
        }

        let mut summaries = Vec::new();
        for mut handle in self.engines.drain(..) {
            match tokio::time::timeout(self.join_timeout, &mut handle.task).await {
                Ok(Ok(summary)) => summaries.push(summary),
                Ok(Err(join_error)) => {
                    warn!(account = %handle.account, error = %join_error, "engine task failed");
                    summaries.push(handle.state.read().summary(&handle.account, &handle.token_id));
                }
                Err(_) => {
                    warn!(account = %handle.account, "engine join timed out, aborting task");
                    handle.task.abort();
                    summaries.push(handle.state.read().summary(&handle.account, &handle.token_id));
                }
            }
        }

        self.registry.stop_all();
        info!(engines = summaries.len(), "coordinator stopped");
        summaries
    }
}
