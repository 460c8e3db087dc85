//! The `NodeClient` trait — everything the streaming layer needs from a node.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::{parse_time, RawBlock};
use crate::config::ChainMode;
use crate::error::StreamError;

/// Inclusion status of a transaction as reported by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Included in the given block.
    Confirmed { block_num: u64 },
    /// Not (yet) known to the node.
    NotFound,
    /// The node rejected the transaction itself; it can never confirm.
    Invalid { reason: String },
}

/// Node access used by the streaming layer.
///
/// Implementations apply their own retry and failover policy; any `Err`
/// they return is treated as terminal for the current call.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Fetch a block by number. `Ok(None)` if the node does not have it yet.
    async fn get_block(&self, number: u64) -> Result<Option<RawBlock>, StreamError>;

    /// The node's current head block number.
    async fn get_current_block_number(&self) -> Result<u64, StreamError>;

    /// The newest block that can no longer be reverted.
    ///
    /// Defaults to the head for nodes without finality information.
    async fn get_last_irreversible_block_number(&self) -> Result<u64, StreamError> {
        self.get_current_block_number().await
    }

    /// Look up whether `tx` has been included in a block.
    async fn get_transaction_status(&self, tx: &TransactionRef) -> Result<TxStatus, StreamError>;
}

#[async_trait]
impl<T> NodeClient for Arc<T>
where
    T: NodeClient + ?Sized,
{
    async fn get_block(&self, number: u64) -> Result<Option<RawBlock>, StreamError> {
        (**self).get_block(number).await
    }

    async fn get_current_block_number(&self) -> Result<u64, StreamError> {
        (**self).get_current_block_number().await
    }

    async fn get_last_irreversible_block_number(&self) -> Result<u64, StreamError> {
        (**self).get_last_irreversible_block_number().await
    }

    async fn get_transaction_status(&self, tx: &TransactionRef) -> Result<TxStatus, StreamError> {
        (**self).get_transaction_status(tx).await
    }
}

/// The block number `mode` treats as current.
pub async fn current_block_number<C>(node: &C, mode: ChainMode) -> Result<u64, StreamError>
where
    C: NodeClient + ?Sized,
{
    match mode {
        ChainMode::Head => node.get_current_block_number().await,
        ChainMode::Irreversible => node.get_last_irreversible_block_number().await,
    }
}

// ─── TransactionRef ───────────────────────────────────────────────────────────

/// Identifies a signed transaction to wait for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRef {
    /// 40-hex-char transaction id, when known.
    pub id: Option<String>,
    pub signatures: Vec<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl TransactionRef {
    /// Reference a transaction by id only.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            signatures: vec![],
            expiration: None,
        }
    }

    /// Extract a reference from a signed transaction JSON.
    ///
    /// Rejects payloads that can never confirm: non-objects, a missing
    /// signature list, non-hex signatures, or a malformed id.
    pub fn from_value(tx: &Value) -> Result<Self, StreamError> {
        let invalid = |reason: String| StreamError::InvalidTransaction(reason);

        let obj = tx
            .as_object()
            .ok_or_else(|| invalid("transaction is not an object".into()))?;

        let id = match obj.get("transaction_id").or_else(|| obj.get("trx_id")) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => {
                if !is_transaction_id(id) {
                    return Err(invalid(format!("malformed transaction id '{id}'")));
                }
                Some(id.to_lowercase())
            }
            Some(other) => return Err(invalid(format!("transaction id is not a string: {other}"))),
        };

        let signatures = match obj.get("signatures") {
            Some(Value::Array(sigs)) => sigs
                .iter()
                .map(|s| match s.as_str() {
                    Some(sig) if !sig.is_empty() && hex::decode(sig).is_ok() => {
                        Ok(sig.to_lowercase())
                    }
                    _ => Err(invalid(format!("unparseable signature {s}"))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            None if id.is_some() => vec![],
            _ => return Err(invalid("missing signature list".into())),
        };
        if id.is_none() && signatures.is_empty() {
            return Err(invalid("transaction carries neither id nor signatures".into()));
        }

        let expiration = match obj.get("expiration") {
            None | Some(Value::Null) => None,
            Some(v) => {
                let s = v.as_str().unwrap_or_default();
                Some(parse_time(s).ok_or_else(|| invalid(format!("unparseable expiration {v}")))?)
            }
        };

        Ok(Self {
            id,
            signatures,
            expiration,
        })
    }

    /// Returns `true` if `signatures` is the same set as this reference's.
    pub fn matches_signatures(&self, signatures: &[String]) -> bool {
        if self.signatures.is_empty() || self.signatures.len() != signatures.len() {
            return false;
        }
        let mut ours: Vec<String> = self.signatures.clone();
        let mut theirs: Vec<String> = signatures.iter().map(|s| s.to_lowercase()).collect();
        ours.sort();
        theirs.sort();
        ours == theirs
    }
}

/// Transaction ids are 20-byte digests rendered as hex.
pub fn is_transaction_id(id: &str) -> bool {
    id.len() == 40 && id.chars().all(|c| c.is_ascii_hexdigit())
}
