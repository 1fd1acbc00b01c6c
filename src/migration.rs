//! Migration detector
//!
//! Independent feed consumer watching the migration authority. When a pool
//! initialization shows up in the instruction logs, the launched token's
//! mint is remembered for a bounded window so the token registry can end
//! tracking early. The registry polls this detector; nothing is pushed.

use crate::config::FeedConfig;
use crate::feed::{decode::decode_transaction, transactions_filter, FeedClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info};
use yellowstone_grpc_proto::prelude::CommitmentLevel;

/// Log fragment emitted by the pool initialization instruction.
const POOL_INITIALIZATION_LOG: &str = "initialize2";

/// Substring convention identifying launchpad mints in the account-key list.
const MINT_SUFFIX: &str = "pump";

pub struct MigrationDetector {
    feed: FeedConfig,
    migration_program: String,
    /// mint -> when the migrated verdict lapses. Expired entries are pruned
    /// lazily on lookup.
    tokens: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl MigrationDetector {
    pub fn new(feed: FeedConfig, migration_program: String, ttl: Duration) -> Self {
        Self {
            feed,
            migration_program,
            tokens: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Whether `mint` migrated within the retention window.
    pub async fn check_token(&self, mint: &str) -> bool {
        let mut tokens = self.tokens.lock().await;
        match tokens.get(mint) {
            Some(expires_at) if *expires_at > Instant::now() => true,
            Some(_) => {
                tokens.remove(mint);
                false
            }
            None => false,
        }
    }

    /// Remember that `mint` migrated. Re-marking an already-tracked mint
    /// keeps the original expiry.
    pub async fn mark_migrated(&self, mint: &str) {
        let mut tokens = self.tokens.lock().await;
        if tokens.contains_key(mint) {
            return;
        }
        tokens.insert(mint.to_string(), Instant::now() + self.ttl);
        info!(mint = %mint, "token migrated");
    }

    /// Drive the migration subscription until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        let (update_tx, mut update_rx) = mpsc::channel(256);
        let request = transactions_filter(
            "migration",
            vec![self.migration_program.clone()],
            CommitmentLevel::Processed,
        );
        let mut feed = FeedClient::new(self.feed.clone());

        let consumer = async {
            while let Some(update) = update_rx.recv().await {
                let Some(decoded) = decode_transaction(&update) else {
                    continue;
                };
                if !has_pool_initialization(&decoded.log_messages) {
                    continue;
                }
                match migrated_mint(&decoded.account_keys) {
                    Some(mint) => self.mark_migrated(mint).await,
                    None => {
                        debug!(
                            signature = %decoded.signature,
                            "pool initialization without a launchpad mint"
                        );
                    }
                }
            }
        };

        tokio::select! {
            _ = feed.run(request, update_tx) => {}
            _ = consumer => {}
        }
    }
}

fn has_pool_initialization(log_messages: &[String]) -> bool {
    log_messages
        .iter()
        .any(|log| log.contains(POOL_INITIALIZATION_LOG))
}

fn migrated_mint(account_keys: &[String]) -> Option<&String> {
    account_keys.iter().find(|key| key.contains(MINT_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(ttl: Duration) -> MigrationDetector {
        let feed = FeedConfig {
            endpoint: "http://primary:10000".to_string(),
            backup_endpoint: "http://backup:10000".to_string(),
            x_token: None,
        };
        MigrationDetector::new(feed, "migrationProgram111".to_string(), ttl)
    }

    #[test]
    fn finds_pool_initialization_in_logs() {
        let logs = vec![
            "Program log: pre".to_string(),
            "Program log: initialize2: InitializeInstruction2".to_string(),
        ];
        assert!(has_pool_initialization(&logs));
        assert!(!has_pool_initialization(&["Program log: swap".to_string()]));
    }

    #[test]
    fn picks_the_launchpad_mint_from_account_keys() {
        let keys = vec![
            "migrationProgram111".to_string(),
            "FwLzsN8bwpXp8zwrfFSEWtkHzmTGCQcDSZEZpump".to_string(),
            "someVault".to_string(),
        ];
        assert_eq!(
            migrated_mint(&keys).unwrap(),
            "FwLzsN8bwpXp8zwrfFSEWtkHzmTGCQcDSZEZpump"
        );
        assert!(migrated_mint(&["vault".to_string()]).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn migrated_memory_lapses_after_ttl() {
        let detector = detector(Duration::from_secs(60));
        detector.mark_migrated("mintApump").await;
        assert!(detector.check_token("mintApump").await);
        assert!(!detector.check_token("otherMint").await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!detector.check_token("mintApump").await);
        // the lapsed entry was pruned, not just hidden
        assert!(detector.tokens.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remarking_keeps_original_expiry() {
        let detector = detector(Duration::from_secs(60));
        detector.mark_migrated("mintApump").await;
        tokio::time::advance(Duration::from_secs(30)).await;
        detector.mark_migrated("mintApump").await;
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!detector.check_token("mintApump").await);
    }
}
