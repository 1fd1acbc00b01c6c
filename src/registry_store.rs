//! Shared wallet-of-interest registry
//!
//! Redis set per tracked token holding the wallets currently under relation
//! tracking, so independently scaled consumers can discover whether a wallet
//! is already being watched without sharing a process. The store is
//! advisory: every operation logs and swallows its errors rather than
//! touching the hot correlation path.

use anyhow::{Context, Result};
use redis::AsyncCommands;
use tracing::{debug, warn};

/// Account keys that are infrastructure, never wallets of interest.
pub const SYSTEM_PROGRAMS: &[&str] = &[
    "11111111111111111111111111111111",
    "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
    "ComputeBudget111111111111111111111111111111",
];

pub struct WalletRegistryStore {
    client: redis::Client,
}

impl WalletRegistryStore {
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("opening redis client")?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .context("connecting to redis")
    }

    /// Add `wallet` to the interest set of `token` (idempotent).
    pub async fn add_wallet(&self, token: &str, wallet: &str) {
        if let Err(e) = self.try_add_wallet(token, wallet).await {
            warn!(token = %token, wallet = %wallet, error = %e, "registry store add failed");
        }
    }

    async fn try_add_wallet(&self, token: &str, wallet: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.sadd::<_, _, ()>(token, wallet)
            .await
            .context("SADD failed")?;
        Ok(())
    }

    /// Drop the whole interest set of a retired token.
    pub async fn remove_token(&self, token: &str) {
        if let Err(e) = self.try_remove_token(token).await {
            warn!(token = %token, error = %e, "registry store delete failed");
        }
    }

    async fn try_remove_token(&self, token: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(token).await.context("DEL failed")?;
        Ok(())
    }

    /// Scan every token's interest set for an overlap with a transaction's
    /// account keys, skipping system programs. Returns the matched wallets
    /// and the token they are tracked under.
    pub async fn find_match_in_transaction(
        &self,
        account_keys: &[String],
    ) -> Option<(Vec<String>, String)> {
        match self.try_find_match(account_keys).await {
            Ok(found) => found,
            Err(e) => {
                debug!(error = %e, "registry store scan failed");
                None
            }
        }
    }

    async fn try_find_match(&self, account_keys: &[String]) -> Result<Option<(Vec<String>, String)>> {
        let mut conn = self.connection().await?;
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .query_async(&mut conn)
                .await
                .context("SCAN failed")?;

            for token in keys {
                let wallets: Vec<String> = conn
                    .smembers(&token)
                    .await
                    .with_context(|| format!("SMEMBERS {token} failed"))?;
                let matched = intersect_wallets(&wallets, account_keys);
                if !matched.is_empty() {
                    return Ok(Some((matched, token)));
                }
            }

            cursor = next;
            if cursor == 0 {
                return Ok(None);
            }
        }
    }
}

/// Members of `wallets` present in `account_keys`, with system programs
/// filtered out.
fn intersect_wallets(wallets: &[String], account_keys: &[String]) -> Vec<String> {
    wallets
        .iter()
        .filter(|wallet| {
            account_keys.contains(wallet) && !SYSTEM_PROGRAMS.contains(&wallet.as_str())
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_skips_system_programs() {
        let wallets = vec![
            "walletA".to_string(),
            "11111111111111111111111111111111".to_string(),
            "walletB".to_string(),
        ];
        let account_keys = vec![
            "walletA".to_string(),
            "11111111111111111111111111111111".to_string(),
            "walletC".to_string(),
        ];
        assert_eq!(
            intersect_wallets(&wallets, &account_keys),
            vec!["walletA".to_string()]
        );
    }

    #[test]
    fn empty_intersection_is_empty() {
        let wallets = vec!["walletA".to_string()];
        assert!(intersect_wallets(&wallets, &["walletB".to_string()]).is_empty());
    }
}
