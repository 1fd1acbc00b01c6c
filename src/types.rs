//! Shared value types produced and consumed across the monitoring pipeline.

use serde::{Deserialize, Serialize};

/// Direction of a native-token transfer relative to the tracked wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Inflow,
    Outflow,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inflow => "inflow",
            Direction::Outflow => "outflow",
        }
    }
}

/// A classified transfer touching a tracked wallet.
///
/// Produced once by the classifier and consumed once by the relation engine.
/// `amount_lamports` is always the absolute magnitude of the balance delta;
/// `direction` carries the sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    /// Token mint this transfer was observed under.
    pub token: String,
    pub direction: Direction,
    pub amount_lamports: u64,
    /// The other party of the transfer (sender on inflow, receiver on outflow).
    pub counterparty_wallet: String,
    /// The tracked wallet the classifier was watching.
    pub source_wallet: String,
    pub signature: String,
}
