//! Decode boundary between raw feed updates and the typed records the rest of
//! the pipeline consumes.
//!
//! All "is this shape valid" checks live here. Updates for transaction types
//! the pipeline does not model (votes, missing meta, non-transaction oneofs)
//! decode to `None`; that is expected and frequent, never an error.

use yellowstone_grpc_proto::prelude::{subscribe_update::UpdateOneof, SubscribeUpdate};

/// The fields of a transaction update the monitors care about, with account
/// keys and signature rendered as base58.
#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    pub signature: String,
    /// Static account keys of the message, fee payer first.
    pub account_keys: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub log_messages: Vec<String>,
    /// Mints appearing in the post token balances, in meta order.
    pub post_token_mints: Vec<String>,
}

pub fn decode_transaction(update: &SubscribeUpdate) -> Option<DecodedTransaction> {
    let tx_update = match update.update_oneof.as_ref()? {
        UpdateOneof::Transaction(tx_update) => tx_update,
        _ => return None,
    };
    let info = tx_update.transaction.as_ref()?;
    if info.is_vote {
        return None;
    }
    let meta = info.meta.as_ref()?;
    let transaction = info.transaction.as_ref()?;
    let message = transaction.message.as_ref()?;

    let signature = if info.signature.is_empty() {
        bs58::encode(transaction.signatures.first()?).into_string()
    } else {
        bs58::encode(&info.signature).into_string()
    };

    let account_keys = message
        .account_keys
        .iter()
        .map(|key| bs58::encode(key).into_string())
        .collect();

    let post_token_mints = meta
        .post_token_balances
        .iter()
        .map(|balance| balance.mint.clone())
        .collect();

    Some(DecodedTransaction {
        signature,
        account_keys,
        pre_balances: meta.pre_balances.clone(),
        post_balances: meta.post_balances.clone(),
        log_messages: meta.log_messages.clone(),
        post_token_mints,
    })
}
