//! `SteemNodeClient` — maps the `NodeClient` contract onto Steem JSON-RPC.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainstream_core::node::is_transaction_id;
use chainstream_core::{NodeClient, RawBlock, StreamError, TransactionRef, TxStatus};

use crate::error::TransportError;
use crate::request::JsonRpcError;
use crate::transport::RpcTransport;

/// JSON-RPC error code Steem nodes use for `FC_ASSERT` failures.
const ASSERT_EXCEPTION_CODE: i64 = -32000;

/// Which API surface the node exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    /// `condenser_api.*` with positional params.
    #[default]
    Condenser,
    /// `block_api` / `database_api` / `transaction_status_api` with named params.
    Appbase,
}

/// Node client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteemClientConfig {
    pub api: ApiFlavor,
    /// Recent blocks scanned when a transaction is known only by its
    /// signatures.
    pub signature_lookback: u64,
}

impl Default for SteemClientConfig {
    fn default() -> Self {
        Self {
            api: ApiFlavor::Condenser,
            signature_lookback: 10,
        }
    }
}

/// A `NodeClient` for Steem-family nodes.
pub struct SteemNodeClient<T> {
    transport: T,
    config: SteemClientConfig,
}

impl<T: RpcTransport> SteemNodeClient<T> {
    pub fn new(transport: T, config: SteemClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn dynamic_global_properties(&self) -> Result<Value, StreamError> {
        let props = match self.config.api {
            ApiFlavor::Condenser => {
                self.transport
                    .call("condenser_api.get_dynamic_global_properties", json!([]))
                    .await?
            }
            ApiFlavor::Appbase => {
                self.transport
                    .call("database_api.get_dynamic_global_properties", json!({}))
                    .await?
            }
        };
        Ok(props)
    }

    async fn props_number(&self, field: &str) -> Result<u64, StreamError> {
        let props = self.dynamic_global_properties().await?;
        props[field]
            .as_u64()
            .ok_or_else(|| StreamError::Rpc(format!("dynamic global properties lack '{field}'")))
    }

    async fn status_by_id(&self, id: &str, tx: &TransactionRef) -> Result<TxStatus, StreamError> {
        if !is_transaction_id(id) {
            return Ok(TxStatus::Invalid {
                reason: format!("malformed transaction id '{id}'"),
            });
        }
        match self.config.api {
            ApiFlavor::Condenser => {
                match self.transport.call("condenser_api.get_transaction", json!([id])).await {
                    Ok(found) => match found["block_num"].as_u64() {
                        Some(block_num) => Ok(TxStatus::Confirmed { block_num }),
                        None => Ok(TxStatus::NotFound),
                    },
                    Err(TransportError::Rpc(err)) if err.message.contains("Unknown Transaction") => {
                        Ok(TxStatus::NotFound)
                    }
                    Err(TransportError::Rpc(err)) if is_assertion(&err) => {
                        Ok(TxStatus::Invalid { reason: err.message })
                    }
                    Err(e) => Err(e.into()),
                }
            }
            ApiFlavor::Appbase => {
                let mut params = json!({"transaction_id": id});
                if let Some(exp) = tx.expiration {
                    params["expiration"] = json!(exp.format("%Y-%m-%dT%H:%M:%S").to_string());
                }
                let found = match self.transport.call("transaction_status_api.find_transaction", params).await {
                    Ok(found) => found,
                    Err(TransportError::Rpc(err)) if is_assertion(&err) => {
                        return Ok(TxStatus::Invalid { reason: err.message })
                    }
                    Err(e) => return Err(e.into()),
                };
                Ok(status_from_find_transaction(&found))
            }
        }
    }

    /// Look for a block among the most recent ones whose transaction has
    /// the same signature set.
    async fn status_by_signatures(&self, tx: &TransactionRef) -> Result<TxStatus, StreamError> {
        let head = self.get_current_block_number().await?;
        let from = head.saturating_sub(self.config.signature_lookback.saturating_sub(1)).max(1);
        for number in (from..=head).rev() {
            let Some(raw) = self.get_block(number).await? else {
                continue;
            };
            let txs = raw.body["transactions"].as_array().cloned().unwrap_or_default();
            for candidate in &txs {
                let sigs: Vec<String> = candidate["signatures"]
                    .as_array()
                    .map(|s| s.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                if tx.matches_signatures(&sigs) {
                    return Ok(TxStatus::Confirmed { block_num: number });
                }
            }
        }
        Ok(TxStatus::NotFound)
    }
}

/// Node-side assertion failures reject the request itself; any other RPC
/// error (internal errors, rate limits) says nothing about the transaction.
fn is_assertion(err: &JsonRpcError) -> bool {
    err.code == ASSERT_EXCEPTION_CODE || err.message.contains("Assert Exception")
}

/// Map `transaction_status_api.find_transaction` output.
fn status_from_find_transaction(found: &Value) -> TxStatus {
    let status = found["status"].as_str().unwrap_or("unknown");
    match status {
        "within_reversible_block" | "within_irreversible_block" => match found["block_num"].as_u64() {
            Some(block_num) => TxStatus::Confirmed { block_num },
            None => TxStatus::NotFound,
        },
        "unknown" | "within_mempool" => TxStatus::NotFound,
        other => TxStatus::Invalid {
            reason: format!("transaction status '{other}'"),
        },
    }
}

#[async_trait]
impl<T: RpcTransport> NodeClient for SteemNodeClient<T> {
    async fn get_block(&self, number: u64) -> Result<Option<RawBlock>, StreamError> {
        let body = match self.config.api {
            ApiFlavor::Condenser => self.transport.call("condenser_api.get_block", json!([number])).await?,
            ApiFlavor::Appbase => {
                let mut resp = self
                    .transport
                    .call("block_api.get_block", json!({"block_num": number}))
                    .await?;
                resp.get_mut("block").map(Value::take).unwrap_or(Value::Null)
            }
        };
        if body.is_null() {
            return Ok(None);
        }
        Ok(Some(RawBlock::new(number, body)))
    }

    async fn get_current_block_number(&self) -> Result<u64, StreamError> {
        self.props_number("head_block_number").await
    }

    async fn get_last_irreversible_block_number(&self) -> Result<u64, StreamError> {
        self.props_number("last_irreversible_block_num").await
    }

    async fn get_transaction_status(&self, tx: &TransactionRef) -> Result<TxStatus, StreamError> {
        match &tx.id {
            Some(id) => self.status_by_id(id, tx).await,
            None => self.status_by_signatures(tx).await,
        }
    }
}
