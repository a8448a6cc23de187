//! Cached market list with background refresh
//!
//! Single source of truth for the active-market list. A background worker
//! refetches on an interval; readers always get cloned snapshots, sorted by
//! end time ascending. No module-level state: the registry is an explicit
//! handle injected where needed.

use crate::infrastructure::client::types::MarketData;
use crate::infrastructure::client::VenueClient;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Cached summary of one market.
#[derive(Debug, Clone)]
pub struct MarketSummary {
    pub market_id: i64,
    pub title: String,
    pub end_time: Option<DateTime<Utc>>,
    pub is_categorical: bool,
    pub volume: f64,
}

impl MarketSummary {
    fn from_data(data: &MarketData) -> Self {
        Self {
            market_id: data.market_id,
            title: data.market_title.clone(),
            end_time: data
                .cutoff_at
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            is_categorical: !data.child_markets.is_empty(),
            volume: data.volume.unwrap_or(0.0),
        }
    }
}

pub struct MarketRegistry {
    client: Arc<dyn VenueClient>,
    cache: RwLock<Vec<MarketSummary>>,
    refreshed_at: RwLock<Option<Instant>>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MarketRegistry {
    /// Fetch the initial list and optionally spawn the refresh worker.
    pub async fn initialize(
        client: Arc<dyn VenueClient>,
        auto_refresh: bool,
        refresh_interval: Duration,
    ) -> Arc<Self> {
        let registry = Arc::new(Self {
            client,
            cache: RwLock::new(Vec::new()),
            refreshed_at: RwLock::new(None),
            running: AtomicBool::new(true),
            worker: Mutex::new(None),
        });

        registry.refresh_now().await;

        if auto_refresh {
            let worker_registry = Arc::clone(&registry);
            let handle = tokio::spawn(async move {
                while worker_registry.running.load(Ordering::Acquire) {
                    tokio::time::sleep(refresh_interval).await;
                    if !worker_registry.running.load(Ordering::Acquire) {
                        break;
                    }
                    worker_registry.refresh_now().await;
                }
            });
            *registry.worker.lock() = Some(handle);
            info!(interval = ?refresh_interval, "market registry auto-refresh started");
        }

        registry
    }

    /// Refetch and replace the cache. Failures keep the previous snapshot.
    pub async fn refresh_now(&self) {
        match self.client.get_markets().await {
            Ok(markets) => {
                let mut summaries: Vec<MarketSummary> =
                    markets.iter().map(MarketSummary::from_data).collect();
                // Soonest-ending first; undated markets sort last.
                summaries.sort_by_key(|m| m.end_time.unwrap_or(DateTime::<Utc>::MAX_UTC));
                let count = summaries.len();
                *self.cache.write() = summaries;
                *self.refreshed_at.write() = Some(Instant::now());
                debug!(count, "market list refreshed");
            }
            Err(e) => warn!(error = %e, "market list refresh failed, keeping stale cache"),
        }
    }

    /// Cloned snapshot of the cached list.
    pub fn markets(&self) -> Vec<MarketSummary> {
        self.cache.read().clone()
    }

    /// Linear scan; the list is small (tens of markets).
    pub fn get_by_id(&self, market_id: i64) -> Option<MarketSummary> {
        self.cache
            .read()
            .iter()
            .find(|m| m.market_id == market_id)
            .cloned()
    }

    /// Case-insensitive title / id search.
    pub fn search(&self, keyword: &str) -> Vec<MarketSummary> {
        let keyword = keyword.to_lowercase();
        self.cache
            .read()
            .iter()
            .filter(|m| {
                m.title.to_lowercase().contains(&keyword)
                    || m.market_id.to_string().contains(&keyword)
            })
            .cloned()
            .collect()
    }

    pub fn cache_age(&self) -> Option<Duration> {
        self.refreshed_at.read().map(|at| at.elapsed())
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}
