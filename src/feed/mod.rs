//! Resilient Geyser feed client
//!
//! Wraps a duplex gRPC subscription to the update feed. Owns the
//! primary/backup endpoint pair and the reconnect policy: probe the
//! connection, fail over on a dead ping, reopen the stream, and keep going
//! forever. Transport failures never escape this module; the driving loop is
//! the sole retry policy and it has no attempt cap.

pub mod classifier;
pub mod decode;

use crate::config::FeedConfig;
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use yellowstone_grpc_client::{ClientTlsConfig, GeyserGrpcClient, Interceptor};
use yellowstone_grpc_proto::prelude::{
    subscribe_update::UpdateOneof, CommitmentLevel, SubscribeRequest,
    SubscribeRequestFilterTransactions, SubscribeRequestPing, SubscribeUpdate,
};

/// Bounded liveness-probe timeout, distinct from the unbounded reconnect loop.
const PING_TIMEOUT: Duration = Duration::from_secs(3);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Fixed delay before re-probing an unhealthy connection.
const PROBE_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Fixed backoff after a stream terminates.
const STREAM_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Build a transaction-filter subscribe request over an account-include list.
pub fn transactions_filter(
    label: &str,
    account_include: Vec<String>,
    commitment: CommitmentLevel,
) -> SubscribeRequest {
    let mut transactions = HashMap::new();
    transactions.insert(
        label.to_string(),
        SubscribeRequestFilterTransactions {
            vote: Some(false),
            failed: Some(false),
            signature: None,
            account_include,
            account_exclude: Vec::new(),
            account_required: Vec::new(),
            ..Default::default()
        },
    );

    SubscribeRequest {
        transactions,
        commitment: Some(commitment as i32),
        ..Default::default()
    }
}

/// Feed client with ping-pong failover between a primary and backup endpoint.
///
/// Two consecutive probe failures simply toggle back to the endpoint just
/// abandoned; there is no third endpoint.
pub struct FeedClient {
    endpoints: [String; 2],
    active: usize,
    x_token: Option<String>,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            endpoints: [config.endpoint, config.backup_endpoint],
            active: 0,
            x_token: config.x_token,
        }
    }

    pub fn active_endpoint(&self) -> &str {
        &self.endpoints[self.active]
    }

    /// Swap to the other endpoint.
    pub fn fail_over(&mut self) {
        self.active ^= 1;
        warn!(endpoint = %self.active_endpoint(), "feed failover, switching endpoint");
    }

    async fn connect(&self) -> Result<GeyserGrpcClient<impl Interceptor>> {
        let mut builder = GeyserGrpcClient::build_from_shared(self.active_endpoint().to_string())?
            .x_token(self.x_token.clone())?
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(PING_TIMEOUT);
        if self.active_endpoint().starts_with("https://") {
            builder = builder.tls_config(ClientTlsConfig::new().with_native_roots())?;
        }
        Ok(builder.connect().await?)
    }

    /// Connect and issue a liveness probe; on failure, fail over and report
    /// unhealthy so the caller waits before retrying.
    async fn check_connection(&mut self) -> Option<GeyserGrpcClient<impl Interceptor>> {
        let mut client = match self.connect().await {
            Ok(client) => client,
            Err(e) => {
                warn!(endpoint = %self.active_endpoint(), error = %e, "feed connect failed");
                self.fail_over();
                return None;
            }
        };
        match timeout(PING_TIMEOUT, client.ping(1)).await {
            Ok(Ok(_)) => Some(client),
            Ok(Err(e)) => {
                warn!(endpoint = %self.active_endpoint(), error = %e, "feed ping failed");
                self.fail_over();
                None
            }
            Err(_) => {
                warn!(endpoint = %self.active_endpoint(), "feed ping timed out");
                self.fail_over();
                None
            }
        }
    }

    /// Drive the subscription forever, forwarding every update into `updates`.
    ///
    /// Server pings are answered in place and not forwarded. Returns only when
    /// the receiving side of `updates` is gone (the subscription owner tore
    /// the pipeline down); every other termination reconnects after the fixed
    /// backoff.
    pub async fn run(&mut self, request: SubscribeRequest, updates: mpsc::Sender<SubscribeUpdate>) {
        loop {
            if updates.is_closed() {
                return;
            }

            let mut client = match self.check_connection().await {
                Some(client) => client,
                None => {
                    sleep(PROBE_RETRY_DELAY).await;
                    continue;
                }
            };

            let (mut sink, mut stream) = match client.subscribe().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(endpoint = %self.active_endpoint(), error = %e, "feed subscribe failed");
                    sleep(STREAM_RETRY_DELAY).await;
                    continue;
                }
            };

            if let Err(e) = sink.send(request.clone()).await {
                warn!(endpoint = %self.active_endpoint(), error = %e, "feed filter request failed");
                sleep(STREAM_RETRY_DELAY).await;
                continue;
            }

            info!(endpoint = %self.active_endpoint(), "feed subscription open");

            while let Some(item) = stream.next().await {
                match item {
                    Ok(update) => {
                        if matches!(update.update_oneof, Some(UpdateOneof::Ping(_))) {
                            let pong = SubscribeRequest {
                                ping: Some(SubscribeRequestPing { id: 1 }),
                                ..Default::default()
                            };
                            if sink.send(pong).await.is_err() {
                                break;
                            }
                            continue;
                        }
                        if updates.send(update).await.is_err() {
                            debug!("feed consumer gone, ending subscription");
                            return;
                        }
                    }
                    Err(status) => {
                        warn!(endpoint = %self.active_endpoint(), error = %status, "feed stream error");
                        break;
                    }
                }
            }

            info!(endpoint = %self.active_endpoint(), "feed stream closed, reconnecting");
            sleep(STREAM_RETRY_DELAY).await;
        }
    }
}
