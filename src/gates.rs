//! Gate checks
//!
//! Cached classification of a wallet as a legitimate terminal sink: a known
//! custodial/exchange wallet from the static allow-list file, a wallet whose
//! token-account footprint looks like an exchange, or an account owned by a
//! whitelisted program. A positive verdict stops relation propagation at
//! that wallet.

use crate::utils::{with_retry, RetryPolicy};
use anyhow::{Context, Result};
use moka::future::Cache;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Wallets holding at least this many token accounts are treated as
/// exchange/custodial infrastructure.
pub const EXCHANGE_TOKEN_ACCOUNT_THRESHOLD: usize = 30;

/// Account owners that mark a wallet as a whitelisted program sink.
pub const WHITELISTED_PROGRAMS: &[&str] = &["T1pyyaTNZsKv2WcRAB8oVnk93mLJw2XzjtVYqCsaHqt"];

const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

pub struct GateChecker {
    rpc_url: String,
    http: reqwest::Client,
    static_allowlist: HashSet<String>,
    /// TTL cache of remote verdicts; expired entries are re-queried.
    verdicts: Cache<String, bool>,
    retry: RetryPolicy,
}

impl GateChecker {
    pub fn new(rpc_url: String, allowlist_path: impl AsRef<Path>, cache_ttl: Duration) -> Self {
        let static_allowlist = match std::fs::read_to_string(allowlist_path.as_ref()) {
            Ok(raw) => raw
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                warn!(
                    path = %allowlist_path.as_ref().display(),
                    error = %e,
                    "no static allow-list, starting empty"
                );
                HashSet::new()
            }
        };
        info!(
            wallets = static_allowlist.len(),
            ttl_secs = cache_ttl.as_secs(),
            "gate checker ready"
        );

        Self {
            rpc_url,
            http: reqwest::Client::new(),
            static_allowlist,
            verdicts: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(cache_ttl)
                .build(),
            retry: RetryPolicy::default(),
        }
    }

    /// Whether `wallet` is a legitimate terminal sink. A lookup failure is
    /// reported as not-whitelisted and left uncached so the next call
    /// re-queries.
    pub async fn is_whitelisted(&self, wallet: &str) -> bool {
        if self.static_allowlist.contains(wallet) {
            return true;
        }
        if let Some(verdict) = self.verdicts.get(wallet).await {
            return verdict;
        }

        match self.query_verdict(wallet).await {
            Ok(verdict) => {
                self.verdicts.insert(wallet.to_string(), verdict).await;
                verdict
            }
            Err(e) => {
                warn!(wallet = %wallet, error = %e, "gate lookup failed, treating as not whitelisted");
                false
            }
        }
    }

    async fn query_verdict(&self, wallet: &str) -> Result<bool> {
        if self.is_exchange_wallet(wallet).await? {
            debug!(wallet = %wallet, "gate verdict: exchange wallet");
            return Ok(true);
        }
        if self.is_whitelisted_program(wallet).await? {
            debug!(wallet = %wallet, "gate verdict: whitelisted program");
            return Ok(true);
        }
        Ok(false)
    }

    /// `getTokenAccountsByOwner` heuristic: a wallet fanned out across many
    /// token accounts is custodial infrastructure, not a bundler candidate.
    async fn is_exchange_wallet(&self, wallet: &str) -> Result<bool> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTokenAccountsByOwner",
            "params": [
                wallet,
                { "programId": TOKEN_PROGRAM },
                { "encoding": "jsonParsed" },
            ],
        });
        let response = self.rpc_call(body).await?;
        let count =
            token_account_count(&response).context("malformed getTokenAccountsByOwner response")?;
        Ok(count >= EXCHANGE_TOKEN_ACCOUNT_THRESHOLD)
    }

    async fn is_whitelisted_program(&self, wallet: &str) -> Result<bool> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getAccountInfo",
            "params": [
                wallet,
                { "encoding": "base58" },
            ],
        });
        let response = self.rpc_call(body).await?;
        Ok(match account_owner(&response) {
            Some(owner) => WHITELISTED_PROGRAMS.contains(&owner),
            // absent account, nothing to whitelist
            None => false,
        })
    }

    async fn rpc_call(&self, body: Value) -> Result<Value> {
        with_retry(self.retry, || async {
            let response = self
                .http
                .post(&self.rpc_url)
                .json(&body)
                .send()
                .await
                .context("rpc request failed")?;
            response
                .error_for_status()
                .context("rpc status")?
                .json::<Value>()
                .await
                .context("rpc response decode")
        })
        .await
    }
}

/// Number of token accounts in a `getTokenAccountsByOwner` response.
fn token_account_count(response: &Value) -> Option<usize> {
    response
        .get("result")?
        .get("value")?
        .as_array()
        .map(|accounts| accounts.len())
}

/// Owner program of the account in a `getAccountInfo` response, when the
/// account exists.
fn account_owner(response: &Value) -> Option<&str> {
    response.get("result")?.get("value")?.get("owner")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_token_account_count() {
        let response = json!({
            "jsonrpc": "2.0",
            "result": { "value": [ {}, {}, {} ] },
            "id": 1,
        });
        assert_eq!(token_account_count(&response), Some(3));

        let malformed = json!({ "result": {} });
        assert_eq!(token_account_count(&malformed), None);
    }

    #[test]
    fn parses_account_owner() {
        let response = json!({
            "result": { "value": { "owner": "T1pyyaTNZsKv2WcRAB8oVnk93mLJw2XzjtVYqCsaHqt" } },
        });
        assert_eq!(
            account_owner(&response),
            Some("T1pyyaTNZsKv2WcRAB8oVnk93mLJw2XzjtVYqCsaHqt")
        );

        // account does not exist
        let absent = json!({ "result": { "value": null } });
        assert_eq!(account_owner(&absent), None);
    }

    #[tokio::test]
    async fn static_allowlist_short_circuits() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "exchangeWallet111").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  exchangeWallet222  ").unwrap();

        let gates = GateChecker::new(
            "http://127.0.0.1:1".to_string(),
            file.path(),
            Duration::from_secs(60),
        );
        // never touches the RPC endpoint for listed wallets
        assert!(gates.is_whitelisted("exchangeWallet111").await);
        assert!(gates.is_whitelisted("exchangeWallet222").await);
    }

    #[test]
    fn missing_allowlist_starts_empty() {
        let gates = GateChecker::new(
            "http://127.0.0.1:1".to_string(),
            "does/not/exist.txt",
            Duration::from_secs(60),
        );
        assert!(gates.static_allowlist.is_empty());
    }
}
