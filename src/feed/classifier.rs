//! Transfer classifier
//!
//! Pure transformation from a decoded transaction to a [`TransferEvent`]
//! observed against one tracked wallet, or `None` when the transaction is
//! not a transfer worth correlating.

use super::decode::DecodedTransaction;
use crate::types::{Direction, TransferEvent};

/// Transactions touching this many accounts or more are excluded as
/// multi-party noise. Deliberate heuristic: bundler funding hops are simple
/// two-party system transfers.
pub const MAX_ACCOUNT_KEYS: usize = 7;

/// Minimum qualifying transfer: 0.1 SOL in lamports.
pub const MIN_TRANSFER_LAMPORTS: u64 = 100_000_000;

/// Classify `decoded` as a transfer in or out of `tracked_wallet`.
///
/// The balance delta is read at the tracked wallet's own balance slot; the
/// counterparty is whichever of the first two account keys is not the
/// tracked wallet.
pub fn classify(
    decoded: &DecodedTransaction,
    token: &str,
    tracked_wallet: &str,
) -> Option<TransferEvent> {
    if decoded.account_keys.len() >= MAX_ACCOUNT_KEYS {
        return None;
    }

    let slot = decoded
        .account_keys
        .iter()
        .position(|key| key == tracked_wallet)?;
    let pre = *decoded.pre_balances.get(slot)?;
    let post = *decoded.post_balances.get(slot)?;

    let direction = if post < pre {
        Direction::Outflow
    } else {
        Direction::Inflow
    };
    let amount_lamports = post.abs_diff(pre);
    if amount_lamports < MIN_TRANSFER_LAMPORTS {
        return None;
    }

    let first = decoded.account_keys.first()?;
    let counterparty_wallet = if first == tracked_wallet {
        decoded.account_keys.get(1)?.clone()
    } else {
        first.clone()
    };

    Some(TransferEvent {
        token: token.to_string(),
        direction,
        amount_lamports,
        counterparty_wallet,
        source_wallet: tracked_wallet.to_string(),
        signature: decoded.signature.clone(),
    })
}
