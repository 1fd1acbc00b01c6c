//! Durable blacklist store
//!
//! Append-only JSONL file of `{wallet, token}` records fronted by an
//! in-memory index. Inserts are idempotent and keyed on the wallet address;
//! re-adding an existing wallet returns `Ok(false)` without touching the
//! file. The two read operations back the external lookup API.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub wallet: String,
    /// Token whose correlation triggered the listing.
    pub token: String,
    pub listed_at: DateTime<Utc>,
}

pub struct BlacklistStore {
    path: PathBuf,
    /// wallet -> triggering token
    index: Mutex<HashMap<String, String>>,
}

impl BlacklistStore {
    /// Open the store, replaying any existing records into the index.
    /// Malformed lines are skipped with a warning.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let mut index = HashMap::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                for line in raw.lines().filter(|line| !line.trim().is_empty()) {
                    match serde_json::from_str::<BlacklistEntry>(line) {
                        Ok(entry) => {
                            index.insert(entry.wallet, entry.token);
                        }
                        Err(e) => {
                            warn!(error = %e, "skipping malformed blacklist record");
                        }
                    }
                }
                info!(
                    path = %path.display(),
                    wallets = index.len(),
                    "loaded blacklist store"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "starting empty blacklist store");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        }

        Ok(Self {
            path,
            index: Mutex::new(index),
        })
    }

    /// Idempotent insert keyed on the wallet address. Returns `Ok(true)` when
    /// the wallet was newly persisted, `Ok(false)` when it was already
    /// listed.
    pub async fn add(&self, wallet: &str, token: &str) -> Result<bool> {
        let mut index = self.index.lock().await;
        if index.contains_key(wallet) {
            return Ok(false);
        }

        let entry = BlacklistEntry {
            wallet: wallet.to_string(),
            token: token.to_string(),
            listed_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&entry).context("encoding blacklist record")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .context("appending blacklist record")?;
        file.flush().await.context("flushing blacklist record")?;

        index.insert(entry.wallet, entry.token);
        Ok(true)
    }

    pub async fn is_blacklisted(&self, wallet: &str) -> bool {
        self.index.lock().await.contains_key(wallet)
    }

    /// Whether any blacklisted wallet was listed under this token.
    pub async fn token_has_blacklisted(&self, token: &str) -> bool {
        self.index
            .lock()
            .await
            .values()
            .any(|listed_token| listed_token == token)
    }

    pub async fn len(&self) -> usize {
        self.index.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.lock().await.is_empty()
    }
}
