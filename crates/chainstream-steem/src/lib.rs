//! chainstream-steem — a `NodeClient` for Steem-family nodes over HTTP
//! JSON-RPC, plus a fluent builder for `Blockchain`.
//!
//! ```text
//! BlockchainBuilder → Blockchain<SteemNodeClient<HttpTransport>>
//!                                     │
//!                                     ├── condenser_api.*           (legacy)
//!                                     └── block_api / database_api /
//!                                         transaction_status_api.*  (appbase)
//! ```

pub mod builder;
pub mod client;
pub mod error;
pub mod http;
pub mod request;
pub mod transport;

pub use builder::BlockchainBuilder;
pub use client::{ApiFlavor, SteemClientConfig, SteemNodeClient};
pub use error::TransportError;
pub use http::{HttpConfig, HttpTransport};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::RpcTransport;
