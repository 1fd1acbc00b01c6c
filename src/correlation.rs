//! Relation correlation engine
//!
//! Tracks, per token, which key accounts funded which downstream wallets and
//! counts how many distinct key accounts converge on the same wallet. A
//! wallet reaching the threshold is promoted to the blacklist by a separate
//! emission sweep, with its full relation chain preserved for audit.
//!
//! Both maps live behind one mutex held only across synchronous mutation,
//! never across I/O, so event-driven inserts and the sweep cannot lose
//! updates to each other.

use crate::blacklist::BlacklistStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Per-wallet occurrence record, global across tokens.
///
/// `count` is capped at the blacklist threshold; relations beyond the cap
/// still extend `all_relations` for audit but stop incrementing. The
/// snapshot fields are frozen by the increment that reaches the threshold.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceRecord {
    pub count: u32,
    pub first_key_account: String,
    pub triggering_token: String,
    pub relational_accounts: Vec<String>,
    /// One entry per discovered relation: `[key_account, ...its funded list]`.
    pub all_relations: Vec<Vec<String>>,
    /// Distinct `(token, key_account)` relations already counted. Makes
    /// re-delivery of the same transfer a no-op.
    relation_keys: HashSet<(String, String)>,
}

#[derive(Default)]
struct EngineState {
    /// token -> key account -> ordered, de-duplicated funded wallets.
    /// Dropped wholesale when the token is retired.
    trackers: HashMap<String, HashMap<String, Vec<String>>>,
    /// wallet -> occurrence record; persists across token retirements.
    matches: HashMap<String, OccurrenceRecord>,
    /// Wallets already reported to the blacklist store.
    emitted: HashSet<String>,
}

pub struct RelationEngine {
    state: Mutex<EngineState>,
    threshold: u32,
}

impl RelationEngine {
    pub fn new(threshold: u32) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            threshold: threshold.max(1),
        }
    }

    /// Register `wallet` as a key account for `token` before its first
    /// onward transfer is seen (an early buyer, typically).
    pub async fn track_key_account(&self, token: &str, wallet: &str) {
        let mut state = self.state.lock().await;
        state
            .trackers
            .entry(token.to_string())
            .or_default()
            .entry(wallet.to_string())
            .or_default();
    }

    /// Record that `key_account` moved qualifying funds to/from `funded`
    /// under `token`, then re-derive the cross-references for that token.
    ///
    /// Feeding the same `(key_account, funded)` pair again is a no-op
    /// insert; the occurrence count only moves on a relation not seen
    /// before.
    pub async fn record(&self, token: &str, key_account: &str, funded: &str) {
        let mut state = self.state.lock().await;
        let accounts = state
            .trackers
            .entry(token.to_string())
            .or_default()
            .entry(key_account.to_string())
            .or_default();
        if !accounts.iter().any(|account| account == funded) {
            accounts.push(funded.to_string());
        }
        self.update_matches(&mut state, token);
    }

    /// Cross-reference pass over one token's key accounts: every wallet in a
    /// funded list gains one occurrence per distinct key account connected
    /// to it. Scans are re-runnable; already-counted relations are skipped.
    fn update_matches(&self, state: &mut EngineState, token: &str) {
        let EngineState {
            trackers, matches, ..
        } = state;
        let Some(tracker) = trackers.get(token) else {
            return;
        };

        for (key_account, funded_accounts) in tracker {
            for wallet in funded_accounts {
                let record = matches.entry(wallet.clone()).or_default();
                let relation = (token.to_string(), key_account.clone());
                if !record.relation_keys.insert(relation) {
                    continue;
                }

                let mut chain = Vec::with_capacity(funded_accounts.len() + 1);
                chain.push(key_account.clone());
                chain.extend(funded_accounts.iter().cloned());
                record.all_relations.push(chain);

                if record.count < self.threshold {
                    record.count += 1;
                    if record.count == self.threshold {
                        // first-crossing snapshot; later relations extend
                        // all_relations only
                        record.first_key_account = key_account.clone();
                        record.triggering_token = token.to_string();
                        record.relational_accounts = funded_accounts.clone();
                        debug!(
                            wallet = %wallet,
                            token = %token,
                            "wallet crossed relation threshold"
                        );
                    }
                }
            }
        }
    }

    /// Drop all correlation state for a retired token. The wallet-level
    /// occurrence records stay.
    pub async fn drop_token(&self, token: &str) {
        let mut state = self.state.lock().await;
        if state.trackers.remove(token).is_some() {
            debug!(token = %token, "dropped relation tracker");
        }
    }

    /// Occurrence record for a wallet, if any.
    pub async fn occurrence(&self, wallet: &str) -> Option<OccurrenceRecord> {
        self.state.lock().await.matches.get(wallet).cloned()
    }

    pub async fn tracked_token_count(&self) -> usize {
        self.state.lock().await.trackers.len()
    }

    /// One emission pass: persist every wallet at or past the threshold that
    /// has not been reported yet. A failed persist stays un-emitted and is
    /// retried on the next pass. Returns how many wallets were newly
    /// reported.
    pub async fn emit_pass(&self, store: &BlacklistStore) -> usize {
        let candidates: Vec<(String, OccurrenceRecord)> = {
            let state = self.state.lock().await;
            state
                .matches
                .iter()
                .filter(|(wallet, record)| {
                    record.count >= self.threshold && !state.emitted.contains(*wallet)
                })
                .map(|(wallet, record)| (wallet.clone(), record.clone()))
                .collect()
        };

        let mut reported = 0;
        for (wallet, record) in candidates {
            match store.add(&wallet, &record.triggering_token).await {
                Ok(inserted) => {
                    let chains = record
                        .all_relations
                        .iter()
                        .enumerate()
                        .map(|(i, chain)| format!("[{}] {}", i + 1, chain.join(" -> ")))
                        .collect::<Vec<_>>()
                        .join("\n");
                    info!(
                        wallet = %wallet,
                        token = %record.triggering_token,
                        count = record.count,
                        key_account = %record.first_key_account,
                        relational_accounts = %record.relational_accounts.join(", "),
                        already_persisted = !inserted,
                        "wallet blacklisted\n{chains}"
                    );
                    self.state.lock().await.emitted.insert(wallet);
                    reported += 1;
                }
                Err(e) => {
                    error!(
                        wallet = %wallet,
                        error = %e,
                        "failed to persist blacklisted wallet, retrying next sweep"
                    );
                }
            }
        }
        reported
    }

    /// Fixed-interval emission sweep. Runs until the task is aborted.
    pub async fn run_sweeper(self: Arc<Self>, store: Arc<BlacklistStore>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.emit_pass(&store).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_is_idempotent() {
        let engine = RelationEngine::new(3);
        engine.record("tokenT", "keyA", "walletX").await;
        engine.record("tokenT", "keyA", "walletX").await;

        let record = engine.occurrence("walletX").await.unwrap();
        assert_eq!(record.count, 1);
        assert_eq!(record.all_relations.len(), 1);
    }

    #[tokio::test]
    async fn single_funder_counts_once() {
        let engine = RelationEngine::new(3);
        engine.record("tokenT", "keyA", "walletX").await;
        let record = engine.occurrence("walletX").await.unwrap();
        assert_eq!(record.count, 1);
        assert!(record.triggering_token.is_empty());
    }

    #[tokio::test]
    async fn threshold_snapshot_is_frozen_at_first_crossing() {
        let engine = RelationEngine::new(3);
        engine.record("tokenT", "keyA1", "walletX").await;
        engine.record("tokenT", "keyA2", "walletX").await;
        engine.record("tokenT", "keyA3", "walletX").await;

        let record = engine.occurrence("walletX").await.unwrap();
        assert_eq!(record.count, 3);
        assert_eq!(record.triggering_token, "tokenT");
        let frozen_key = record.first_key_account.clone();
        let frozen_relational = record.relational_accounts.clone();

        // a fourth relation keeps the audit trail growing but not the count
        engine.record("tokenT", "keyA4", "walletX").await;
        let record = engine.occurrence("walletX").await.unwrap();
        assert_eq!(record.count, 3);
        assert_eq!(record.first_key_account, frozen_key);
        assert_eq!(record.relational_accounts, frozen_relational);
        assert_eq!(record.all_relations.len(), 4);
    }

    #[tokio::test]
    async fn retired_token_state_is_dropped_but_records_persist() {
        let engine = RelationEngine::new(3);
        engine.record("tokenT", "keyA1", "walletX").await;
        engine.record("tokenT", "keyA2", "walletX").await;
        assert_eq!(engine.tracked_token_count().await, 1);

        engine.drop_token("tokenT").await;
        assert_eq!(engine.tracked_token_count().await, 0);
        // dropping twice is harmless
        engine.drop_token("tokenT").await;

        let record = engine.occurrence("walletX").await.unwrap();
        assert_eq!(record.count, 2);
    }
}
