//! Per-token monitoring pipeline
//!
//! One task per tracked token. It watches the token's buy stream to seed key
//! accounts, opens a wallet stream per account of interest, and feeds every
//! qualifying transfer through the gate checks into the relation engine.
//! All streams live in one `JoinSet`, so aborting the pipeline (TTL expiry,
//! migration) tears down every subscription it ever opened.

use crate::blacklist::BlacklistStore;
use crate::config::FeedConfig;
use crate::correlation::RelationEngine;
use crate::feed::classifier::{classify, MIN_TRANSFER_LAMPORTS};
use crate::feed::decode::{decode_transaction, DecodedTransaction};
use crate::feed::{transactions_filter, FeedClient};
use crate::gates::GateChecker;
use crate::registry_store::WalletRegistryStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use yellowstone_grpc_proto::prelude::CommitmentLevel;

/// Everything a pipeline needs besides its mint, constructed once at startup
/// and shared by reference.
pub struct PipelineDeps {
    pub feed: FeedConfig,
    pub engine: Arc<RelationEngine>,
    pub gates: Arc<GateChecker>,
    pub blacklist: Arc<BlacklistStore>,
    pub registry_store: Option<Arc<WalletRegistryStore>>,
}

pub fn spawn_token_pipeline(mint: String, deps: Arc<PipelineDeps>) -> JoinHandle<()> {
    tokio::spawn(run_token_pipeline(mint, deps))
}

async fn run_token_pipeline(mint: String, deps: Arc<PipelineDeps>) {
    let mut streams = JoinSet::new();

    let (buy_tx, mut buy_rx) = mpsc::channel(256);
    let buy_request = transactions_filter(
        "buys",
        vec![mint.clone()],
        CommitmentLevel::Confirmed,
    );
    let mut buy_feed = FeedClient::new(deps.feed.clone());
    streams.spawn(async move { buy_feed.run(buy_request, buy_tx).await });

    // wallet monitors request tracking of counterparties through this
    // channel; the loop below is its only consumer
    let (track_tx, mut track_rx) = mpsc::channel::<String>(256);
    let mut monitored: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            Some(update) = buy_rx.recv() => {
                let Some(decoded) = decode_transaction(&update) else {
                    continue;
                };
                let Some(buyer) = qualifying_buyer(&decoded) else {
                    continue;
                };
                if deps.blacklist.is_blacklisted(&buyer).await {
                    debug!(wallet = %buyer, mint = %mint, "buyer already blacklisted");
                    continue;
                }
                if deps.gates.is_whitelisted(&buyer).await {
                    debug!(wallet = %buyer, mint = %mint, "buyer is a whitelisted sink");
                    continue;
                }
                info!(
                    mint = %mint,
                    wallet = %buyer,
                    signature = %decoded.signature,
                    "qualifying buy, tracking wallet"
                );
                deps.engine.track_key_account(&mint, &buyer).await;
                if let Some(store) = &deps.registry_store {
                    store.add_wallet(&mint, &buyer).await;
                }
                if track_tx.try_send(buyer).is_err() {
                    warn!(mint = %mint, "tracking queue full, dropping wallet");
                }
            }
            Some(wallet) = track_rx.recv() => {
                if !monitored.insert(wallet.clone()) {
                    continue;
                }
                let deps = deps.clone();
                let mint = mint.clone();
                let track_tx = track_tx.clone();
                streams.spawn(run_wallet_monitor(wallet, mint, deps, track_tx));
            }
            Some(result) = streams.join_next() => {
                if let Err(e) = result {
                    if !e.is_cancelled() {
                        warn!(mint = %mint, error = %e, "pipeline stream task failed");
                    }
                }
            }
            else => break,
        }
    }
}

/// A buy is the fee payer spending at least the transfer floor on the
/// token's stream.
fn qualifying_buyer(decoded: &DecodedTransaction) -> Option<String> {
    let pre = *decoded.pre_balances.first()?;
    let post = *decoded.post_balances.first()?;
    if pre > post && pre - post >= MIN_TRANSFER_LAMPORTS {
        decoded.account_keys.first().cloned()
    } else {
        None
    }
}

/// Watch one wallet's transfers for the lifetime of the token pipeline.
async fn run_wallet_monitor(
    wallet: String,
    token: String,
    deps: Arc<PipelineDeps>,
    track_tx: mpsc::Sender<String>,
) {
    let (update_tx, mut update_rx) = mpsc::channel(256);
    let request = transactions_filter(
        "holders",
        vec![wallet.clone()],
        CommitmentLevel::Finalized,
    );
    let mut feed = FeedClient::new(deps.feed.clone());

    let consumer = async {
        while let Some(update) = update_rx.recv().await {
            let Some(decoded) = decode_transaction(&update) else {
                continue;
            };
            process_wallet_update(&deps, &token, &wallet, &decoded, &track_tx).await;
        }
    };

    tokio::select! {
        _ = feed.run(request, update_tx) => {}
        _ = consumer => {}
    }
}

/// Classify one decoded transaction against a tracked wallet and, when it
/// qualifies, gate-check the counterparty and record the relation.
pub async fn process_wallet_update(
    deps: &PipelineDeps,
    token: &str,
    wallet: &str,
    decoded: &DecodedTransaction,
    track_tx: &mpsc::Sender<String>,
) {
    let Some(event) = classify(decoded, token, wallet) else {
        return;
    };

    info!(
        flow = event.direction.as_str(),
        signature = %event.signature,
        wallet = %wallet,
        counterparty = %event.counterparty_wallet,
        lamports = event.amount_lamports,
        "qualifying transfer"
    );

    if let Some(store) = &deps.registry_store {
        if let Some((wallets, tracked_token)) =
            store.find_match_in_transaction(&decoded.account_keys).await
        {
            if tracked_token != token {
                debug!(
                    token = %token,
                    other_token = %tracked_token,
                    wallets = %wallets.join(", "),
                    "transfer overlaps wallets tracked for another token"
                );
            }
        }
    }

    if deps.gates.is_whitelisted(&event.counterparty_wallet).await {
        // propagation stops at legitimate sinks, but a listed wallet moving
        // funds into one is worth knowing about
        if deps.blacklist.is_blacklisted(wallet).await {
            info!(
                wallet = %wallet,
                sink = %event.counterparty_wallet,
                signature = %event.signature,
                "blacklisted wallet cashing out to whitelisted sink"
            );
        } else {
            debug!(
                sink = %event.counterparty_wallet,
                "counterparty is a whitelisted sink, not following"
            );
        }
        return;
    }

    deps.engine
        .record(token, wallet, &event.counterparty_wallet)
        .await;
    if let Some(store) = &deps.registry_store {
        store.add_wallet(token, &event.counterparty_wallet).await;
    }
    if track_tx.send(event.counterparty_wallet).await.is_err() {
        debug!(token = %token, "pipeline gone, not requesting further tracking");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(keys: &[&str], pre: &[u64], post: &[u64]) -> DecodedTransaction {
        DecodedTransaction {
            signature: "sig".to_string(),
            account_keys: keys.iter().map(|k| k.to_string()).collect(),
            pre_balances: pre.to_vec(),
            post_balances: post.to_vec(),
            log_messages: Vec::new(),
            post_token_mints: Vec::new(),
        }
    }

    #[test]
    fn buyer_must_spend_the_floor() {
        let buy = decoded(&["buyer", "pool"], &[1_000_000_000, 0], &[850_000_000, 150_000_000]);
        assert_eq!(qualifying_buyer(&buy).unwrap(), "buyer");

        let dust = decoded(&["buyer", "pool"], &[1_000_000_000, 0], &[950_000_000, 50_000_000]);
        assert!(qualifying_buyer(&dust).is_none());

        let received = decoded(&["buyer", "pool"], &[0, 0], &[1_000_000_000, 0]);
        assert!(qualifying_buyer(&received).is_none());
    }
}
