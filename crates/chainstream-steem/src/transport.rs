//! The `RpcTransport` trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Sends JSON-RPC requests to one endpoint.
///
/// Implementations must be `Send + Sync` and apply their own retry policy;
/// errors they return are final.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// The endpoint URL or a descriptive name.
    fn url(&self) -> &str;

    /// Request id for the next call.
    fn next_id(&self) -> u64 {
        1
    }

    /// Call `method` and return its result value.
    async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let req = JsonRpcRequest::new(self.next_id(), method, params);
        let resp = self.send(req).await?;
        resp.into_result().map_err(TransportError::Rpc)
    }
}
