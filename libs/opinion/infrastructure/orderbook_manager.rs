//! Orderbook manager and multi-token registry
//!
//! "Seed from REST, maintain over WebSocket, resync on silence": each token
//! gets one `OrderbookManager` holding the shared replica behind a mutex. A
//! watchdog task refetches the REST snapshot whenever the stream has been
//! silent past the configured deadline, and every applied diff re-arms it.
//!
//! Engines never hold the lock while deciding; they take a deep-copy
//! snapshot and reason from that.

use crate::domain::{BookSideKind, Orderbook};
use crate::infrastructure::client::types::DepthDiff;
use crate::infrastructure::client::{VenueClient, VenueError};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default silence deadline before a REST resync.
pub const DEFAULT_WS_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback invoked with a fresh snapshot after every replica mutation.
pub type UpdateCallback = Arc<dyn Fn(&Orderbook) + Send + Sync>;

/// Per-token replica owner: REST seeding, WS diff application, watchdog.
pub struct OrderbookManager {
    client: Arc<dyn VenueClient>,
    token_id: String,
    ws_timeout: Duration,
    book: Arc<Mutex<Orderbook>>,
    /// Last time either a diff or a snapshot touched the book.
    last_activity: Arc<Mutex<Instant>>,
    running: Arc<AtomicBool>,
    resync_count: Arc<AtomicU64>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
    on_update: Option<UpdateCallback>,
}

impl OrderbookManager {
    pub fn new(
        client: Arc<dyn VenueClient>,
        token_id: impl Into<String>,
        ws_timeout: Duration,
        on_update: Option<UpdateCallback>,
    ) -> Self {
        let token_id = token_id.into();
        Self {
            client,
            book: Arc::new(Mutex::new(Orderbook::new(token_id.clone()))),
            token_id,
            ws_timeout,
            last_activity: Arc::new(Mutex::new(Instant::now())),
            running: Arc::new(AtomicBool::new(false)),
            resync_count: Arc::new(AtomicU64::new(0)),
            watchdog: Mutex::new(None),
            on_update,
        }
    }

    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    /// Number of watchdog-triggered REST resyncs so far.
    pub fn resync_count(&self) -> u64 {
        self.resync_count.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Seed via REST and arm the watchdog.
    pub async fn start(self: &Arc<Self>) -> Result<(), VenueError> {
        self.refresh().await?;
        self.running.store(true, Ordering::Release);
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.watchdog_loop().await;
        });
        *self.watchdog.lock() = Some(handle);
        info!(token_id = %self.token_id, "orderbook manager started");
        Ok(())
    }

    /// Stop the watchdog. The replica stays readable.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.watchdog.lock().take() {
            handle.abort();
        }
        debug!(token_id = %self.token_id, "orderbook manager stopped");
    }

    /// Force a REST snapshot into the replica.
    pub async fn refresh(&self) -> Result<(), VenueError> {
        let data = self.client.get_orderbook(&self.token_id).await?;
        let snapshot = {
            let mut book = self.book.lock();
            book.seed_from_snapshot(&data.bids, &data.asks);
            book.clone()
        };
        *self.last_activity.lock() = Instant::now();
        if let Some(callback) = &self.on_update {
            callback(&snapshot);
        }
        debug!(token_id = %self.token_id, summary = %snapshot.format_summary(), "snapshot applied");
        Ok(())
    }

    /// Seed directly from already-fetched levels. Also used by tests.
    pub fn seed_from_snapshot(
        &self,
        bids: &[crate::domain::PriceLevel],
        asks: &[crate::domain::PriceLevel],
    ) {
        let snapshot = {
            let mut book = self.book.lock();
            book.seed_from_snapshot(bids, asks);
            book.clone()
        };
        *self.last_activity.lock() = Instant::now();
        if let Some(callback) = &self.on_update {
            callback(&snapshot);
        }
    }

    /// Apply one incremental diff and re-arm the watchdog.
    pub fn apply_diff(&self, diff: &DepthDiff) {
        let side = match BookSideKind::parse(&diff.side) {
            Some(side) => side,
            None => {
                debug!(side = %diff.side, "ignoring diff with unknown side");
                return;
            }
        };
        let snapshot = {
            let mut book = self.book.lock();
            book.apply_diff(side, diff.price_f64(), diff.size);
            book.clone()
        };
        *self.last_activity.lock() = Instant::now();
        if let Some(callback) = &self.on_update {
            callback(&snapshot);
        }
    }

    /// Deep copy of the replica for lock-free reasoning.
    pub fn snapshot(&self) -> Orderbook {
        self.book.lock().clone()
    }

    async fn watchdog_loop(&self) {
        while self.running.load(Ordering::Acquire) {
            let elapsed = self.last_activity.lock().elapsed();
            if elapsed >= self.ws_timeout {
                warn!(
                    token_id = %self.token_id,
                    silent_for = ?elapsed,
                    "stream silent past deadline, resyncing over REST"
                );
                self.resync_count.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.refresh().await {
                    warn!(token_id = %self.token_id, error = %e, "watchdog resync failed");
                    // Back off a full period rather than hammering the API.
                    *self.last_activity.lock() = Instant::now();
                }
                continue;
            }
            tokio::time::sleep(self.ws_timeout - elapsed).await;
        }
    }
}

/// Routes diffs to per-token replicas and centralizes their lifecycle.
///
/// Diffs arrive keyed by `(market_id, outcome_side)`; `ensure` registers the
/// mapping to a token when the replica is created. Read path after handle
/// acquisition is lock-free (`DashMap` shard reads + snapshot copies).
pub struct OrderbookRegistry {
    client: Arc<dyn VenueClient>,
    ws_timeout: Duration,
    managers: DashMap<String, Arc<OrderbookManager>>,
    routes: DashMap<(i64, u8), String>,
}

impl OrderbookRegistry {
    pub fn new(client: Arc<dyn VenueClient>, ws_timeout: Duration) -> Self {
        Self {
            client,
            ws_timeout,
            managers: DashMap::new(),
            routes: DashMap::new(),
        }
    }

    /// Idempotently create (or fetch) the replica for a token and register
    /// its diff route.
    pub fn ensure(
        &self,
        token_id: &str,
        market_id: i64,
        outcome_side: u8,
        on_update: Option<UpdateCallback>,
    ) -> Arc<OrderbookManager> {
        let manager = self
            .managers
            .entry(token_id.to_string())
            .or_insert_with(|| {
                Arc::new(OrderbookManager::new(
                    Arc::clone(&self.client),
                    token_id,
                    self.ws_timeout,
                    on_update,
                ))
            })
            .clone();
        self.routes
            .insert((market_id, outcome_side), token_id.to_string());
        manager
    }

    pub fn get(&self, token_id: &str) -> Option<Arc<OrderbookManager>> {
        self.managers.get(token_id).map(|entry| entry.clone())
    }

    /// Route a depth diff to its replica. Unknown targets are dropped.
    pub fn dispatch(&self, diff: &DepthDiff) {
        let token_id = match &diff.token_id {
            Some(token_id) => Some(token_id.clone()),
            None => diff
                .outcome_side
                .and_then(|outcome| self.routes.get(&(diff.market_id, outcome)))
                .map(|entry| entry.clone()),
        };
        match token_id.and_then(|id| self.get(&id)) {
            Some(manager) => manager.apply_diff(diff),
            None => debug!(
                market_id = diff.market_id,
                outcome_side = ?diff.outcome_side,
                "diff for unsubscribed token dropped"
            ),
        }
    }

    /// Start every replica (REST seed + watchdog). Returns how many started.
    pub async fn start_all(&self) -> usize {
        let mut started = 0;
        let managers: Vec<Arc<OrderbookManager>> =
            self.managers.iter().map(|entry| entry.clone()).collect();
        for manager in managers {
            match manager.start().await {
                Ok(()) => started += 1,
                Err(e) => warn!(token_id = %manager.token_id(), error = %e, "failed to start replica"),
            }
        }
        started
    }

    pub fn stop_all(&self) {
        for entry in self.managers.iter() {
            entry.stop();
        }
    }
}
