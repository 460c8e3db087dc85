//! Fluent builder API for connecting a `Blockchain` to a Steem node.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainstream_core::ChainMode;
//! use chainstream_steem::BlockchainBuilder;
//!
//! let config = BlockchainBuilder::new()
//!     .url("https://api.steemit.com")
//!     .mode(ChainMode::Irreversible)
//!     .batch_size(10)
//!     .build_config();
//! ```

use std::time::Duration;

use chainstream_core::{Blockchain, BlockchainConfig, ChainMode};

use crate::client::{ApiFlavor, SteemClientConfig, SteemNodeClient};
use crate::error::TransportError;
use crate::http::{HttpConfig, HttpTransport};

pub const DEFAULT_URL: &str = "https://api.steemit.com";

/// Fluent builder for `Blockchain<SteemNodeClient<HttpTransport>>`.
pub struct BlockchainBuilder {
    url: String,
    config: BlockchainConfig,
    client: SteemClientConfig,
    http: HttpConfig,
}

impl Default for BlockchainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockchainBuilder {
    pub fn new() -> Self {
        Self {
            url: DEFAULT_URL.into(),
            config: BlockchainConfig::default(),
            client: SteemClientConfig::default(),
            http: HttpConfig::default(),
        }
    }

    /// Set the node URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Use appbase APIs instead of `condenser_api`.
    pub fn appbase(mut self, appbase: bool) -> Self {
        self.client.api = if appbase { ApiFlavor::Appbase } else { ApiFlavor::Condenser };
        self
    }

    /// Follow the head or only irreversible blocks.
    pub fn mode(mut self, mode: ChainMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Expected block production interval.
    pub fn block_interval_ms(mut self, ms: u64) -> Self {
        self.config.block_interval_ms = ms;
        self
    }

    /// Delay between polls while following the head. Defaults to the
    /// block interval.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = Some(ms);
        self
    }

    /// Polls of a missing block before the stream gives up on it.
    pub fn max_block_wait_repetition(mut self, n: u32) -> Self {
        self.config.max_block_wait_repetition = n;
        self
    }

    /// Blocks fetched concurrently per round.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Default attempt budget for `await_transaction`.
    pub fn confirmation_attempts(mut self, n: u32) -> Self {
        self.config.confirmation_attempts = n;
        self
    }

    /// HTTP retries for transient failures.
    pub fn num_retries(mut self, n: u32) -> Self {
        self.http.num_retries = n;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.http.request_timeout = timeout;
        self
    }

    /// Recent blocks scanned for signature-only transaction lookups.
    pub fn signature_lookback(mut self, blocks: u64) -> Self {
        self.client.signature_lookback = blocks;
        self
    }

    /// Build the `BlockchainConfig` without connecting.
    pub fn build_config(self) -> BlockchainConfig {
        self.config
    }

    /// Build the HTTP transport and wrap it in a `Blockchain`.
    pub fn build(self) -> Result<Blockchain<SteemNodeClient<HttpTransport>>, TransportError> {
        let transport = HttpTransport::new(self.url, self.http)?;
        let node = SteemNodeClient::new(transport, self.client);
        Ok(Blockchain::new(node, self.config))
    }
}
