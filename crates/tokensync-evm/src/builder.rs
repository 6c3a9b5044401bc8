//! Fluent builder for the sync driver.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokensync_evm::SyncBuilder;
//! use tokensync_rpc::HttpRpcClient;
//! # fn store() -> Arc<dyn tokensync_core::KvStore> { unimplemented!() }
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//!
//! let transport = Arc::new(HttpRpcClient::default_for("https://public-en.node.kaia.io")?);
//! let driver = SyncBuilder::new()
//!     .chain("KAIA")
//!     .start_block(150_000_000)
//!     .block_method("kaia_getBlockByNumber")
//!     .build(transport, store())?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokensync_core::{KvStore, PacingConfig, SyncConfig, SyncError};
use tokensync_rpc::RpcTransport;

use crate::driver::SyncDriver;

/// Fluent builder for `SyncConfig` and `SyncDriver`.
#[derive(Default)]
pub struct SyncBuilder {
    config: SyncConfig,
}

impl SyncBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. loaded from the environment).
    pub fn from_config(config: SyncConfig) -> Self {
        Self { config }
    }

    /// Chain label stored on every record.
    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.config.chain = chain.into();
        self
    }

    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.config.rpc_url = url.into();
        self
    }

    /// Resume override; used when larger than `watermark + 1`.
    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = Some(block);
        self
    }

    /// RPC method that returns a block with full transactions.
    pub fn block_method(mut self, method: impl Into<String>) -> Self {
        self.config.block_method = method.into();
        self
    }

    /// Council snapshot interval; `None` disables it.
    pub fn council_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.council_interval = interval;
        self
    }

    pub fn metadata_ttl(mut self, ttl: Duration) -> Self {
        self.config.metadata_ttl = ttl;
        self
    }

    /// Delay between retries of node and store calls.
    pub fn retry_backoff(mut self, delay: Duration) -> Self {
        self.config.retry_backoff = delay;
        self
    }

    pub fn pacing(mut self, pacing: PacingConfig) -> Self {
        self.config.pacing = pacing;
        self
    }

    /// Abort instead of retrying a block forever.
    pub fn max_block_attempts(mut self, attempts: u32) -> Self {
        self.config.max_block_attempts = Some(attempts);
        self
    }

    pub fn build_config(self) -> SyncConfig {
        self.config
    }

    /// Validate the configuration and build a driver over `transport` and `store`.
    pub fn build(
        self,
        transport: Arc<dyn RpcTransport>,
        store: Arc<dyn KvStore>,
    ) -> Result<SyncDriver, SyncError> {
        self.config.validate()?;
        Ok(SyncDriver::new(self.config, transport, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = SyncBuilder::new().build_config();
        assert_eq!(cfg.chain, "KAIA");
        assert_eq!(cfg.block_method, "eth_getBlockByNumber");
        assert_eq!(cfg.retry_backoff, Duration::from_millis(200));
        assert_eq!(cfg.metadata_ttl, Duration::from_secs(3600));
        assert!(cfg.max_block_attempts.is_none());
    }

    #[test]
    fn builder_custom() {
        let cfg = SyncBuilder::new()
            .chain("KAIROS")
            .rpc_url("http://localhost:8551")
            .start_block(1_000)
            .block_method("kaia_getBlockByNumber")
            .council_interval(None)
            .metadata_ttl(Duration::from_secs(60))
            .retry_backoff(Duration::from_millis(10))
            .max_block_attempts(3)
            .build_config();

        assert_eq!(cfg.chain, "KAIROS");
        assert_eq!(cfg.start_block, Some(1_000));
        assert_eq!(cfg.block_method, "kaia_getBlockByNumber");
        assert!(cfg.council_interval.is_none());
        assert_eq!(cfg.metadata_ttl, Duration::from_secs(60));
        assert_eq!(cfg.max_block_attempts, Some(3));
    }

    fn transport() -> Arc<dyn RpcTransport> {
        Arc::new(tokensync_rpc::MockTransport::new())
    }

    fn store() -> Arc<dyn KvStore> {
        Arc::new(tokensync_storage::InMemoryStore::new())
    }

    #[test]
    fn build_rejects_inverted_pacing_bounds() {
        let result = SyncBuilder::new()
            .pacing(PacingConfig {
                floor: Duration::from_millis(500),
                ceiling: Duration::from_millis(50),
                ..PacingConfig::default()
            })
            .build(transport(), store());
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn build_rejects_zero_pacing_step() {
        let result = SyncBuilder::new()
            .pacing(PacingConfig {
                step: Duration::ZERO,
                ..PacingConfig::default()
            })
            .build(transport(), store());
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn build_rejects_zero_attempts() {
        let result = SyncBuilder::new().max_block_attempts(0).build(transport(), store());
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn build_accepts_defaults() {
        assert!(SyncBuilder::new().build(transport(), store()).is_ok());
    }
}
