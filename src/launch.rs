//! Launch monitor
//!
//! Watches the launchpad program's transaction stream and hands every newly
//! observed mint to the token registry, which owns the tracking lifecycle
//! from there.

use crate::config::FeedConfig;
use crate::feed::{decode::decode_transaction, transactions_filter, FeedClient};
use crate::registry::TokenRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use yellowstone_grpc_proto::prelude::CommitmentLevel;

pub struct LaunchMonitor {
    feed: FeedConfig,
    launch_program: String,
    registry: Arc<TokenRegistry>,
}

impl LaunchMonitor {
    pub fn new(feed: FeedConfig, launch_program: String, registry: Arc<TokenRegistry>) -> Self {
        Self {
            feed,
            launch_program,
            registry,
        }
    }

    /// Drive the launch subscription until the task is aborted.
    pub async fn run(self) {
        let (update_tx, mut update_rx) = mpsc::channel(256);
        let request = transactions_filter(
            "launches",
            vec![self.launch_program.clone()],
            CommitmentLevel::Processed,
        );
        let mut feed = FeedClient::new(self.feed.clone());

        let consumer = async {
            while let Some(update) = update_rx.recv().await {
                let Some(decoded) = decode_transaction(&update) else {
                    continue;
                };
                // the launched token is the first mint in the post balances
                if let Some(mint) = decoded.post_token_mints.first() {
                    self.registry.add_token(mint).await;
                }
            }
        };

        tokio::select! {
            _ = feed.run(request, update_tx) => {}
            _ = consumer => {}
        }
    }
}
