//! Token registry
//!
//! TTL-indexed set of actively tracked tokens. Adding a token opens its
//! monitoring pipeline; a fixed-interval sweep retires tokens that migrated
//! or outlived their TTL. Retirement always destroys the pipeline handle
//! before the map entry goes away, so a stream callback can never write into
//! a token that no longer exists.

use crate::correlation::RelationEngine;
use crate::migration::MigrationDetector;
use crate::registry_store::WalletRegistryStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Opens the monitoring pipeline for a mint. Injected so the registry never
/// knows how subscriptions are built (and tests can stub them).
pub type PipelineSpawner = Arc<dyn Fn(String) -> JoinHandle<()> + Send + Sync>;

struct TrackedToken {
    #[allow(dead_code)]
    tracked_since: DateTime<Utc>,
    expires_at: Instant,
    pipeline: JoinHandle<()>,
}

pub struct TokenRegistry {
    tokens: Mutex<HashMap<String, TrackedToken>>,
    ttl: Duration,
    engine: Arc<RelationEngine>,
    registry_store: Option<Arc<WalletRegistryStore>>,
    spawner: PipelineSpawner,
}

impl TokenRegistry {
    pub fn new(
        ttl: Duration,
        engine: Arc<RelationEngine>,
        registry_store: Option<Arc<WalletRegistryStore>>,
        spawner: PipelineSpawner,
    ) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            ttl,
            engine,
            registry_store,
            spawner,
        }
    }

    /// Start tracking `mint`. Already-tracked mints are a no-op.
    pub async fn add_token(&self, mint: &str) {
        let mut tokens = self.tokens.lock().await;
        if tokens.contains_key(mint) {
            debug!(mint = %mint, "token already tracked");
            return;
        }

        let expires_at = Instant::now() + self.ttl;
        let pipeline = (self.spawner)(mint.to_string());
        tokens.insert(
            mint.to_string(),
            TrackedToken {
                tracked_since: Utc::now(),
                expires_at,
                pipeline,
            },
        );
        info!(
            mint = %mint,
            ttl_secs = self.ttl.as_secs(),
            "tracking token"
        );
    }

    /// Stop tracking `mint`, destroying its pipeline first. Removing an
    /// absent token is a no-op, not an error.
    pub async fn remove_token(&self, mint: &str) {
        {
            let mut tokens = self.tokens.lock().await;
            let Some(tracked) = tokens.get(mint) else {
                return;
            };
            tracked.pipeline.abort();
            tokens.remove(mint);
        }
        self.engine.drop_token(mint).await;
        if let Some(store) = &self.registry_store {
            store.remove_token(mint).await;
        }
        info!(mint = %mint, "stopped tracking token");
    }

    pub async fn contains(&self, mint: &str) -> bool {
        self.tokens.lock().await.contains_key(mint)
    }

    pub async fn tracked_count(&self) -> usize {
        self.tokens.lock().await.len()
    }

    /// One sweep over the tracked set: migrated tokens go first, then TTL
    /// expiries. The map lock is released before any await.
    pub async fn sweep_once(&self, migration: &MigrationDetector) {
        let snapshot: Vec<(String, Instant)> = {
            let tokens = self.tokens.lock().await;
            tokens
                .iter()
                .map(|(mint, tracked)| (mint.clone(), tracked.expires_at))
                .collect()
        };

        let now = Instant::now();
        for (mint, expires_at) in snapshot {
            if migration.check_token(&mint).await {
                info!(mint = %mint, "token migrated, retiring early");
                self.remove_token(&mint).await;
                continue;
            }
            if now >= expires_at {
                info!(mint = %mint, "token expired, retiring");
                self.remove_token(&mint).await;
            }
        }
    }

    /// Fixed-interval retirement sweep. Runs until the task is aborted.
    pub async fn run_sweeper(self: Arc<Self>, migration: Arc<MigrationDetector>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sweep_once(&migration).await;
        }
    }
}
