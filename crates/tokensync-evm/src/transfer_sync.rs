//! Transfer stage: logs of one block → `TRANSFER` items.

use std::sync::Arc;

use alloy_primitives::Address;
use futures::future::{join_all, try_join_all};
use tokio_util::sync::CancellationToken;
use tokensync_core::record::transfer_item;
use tokensync_core::store::{chunk_keys, into_chunks};
use tokensync_core::{retry_until_ok, FixedBackoff, KvStore, LagTracker, SyncError, TransferEvent};
use tokensync_rpc::{NodeClient, RawLog};

use crate::abi::TRANSFER_TOPICS;
use crate::classifier::TokenClassifier;
use crate::decoder::{decode_log, DecodeError, LogContext};
use crate::metadata::{MetadataError, MetadataResolver};

/// Result of syncing the transfers of one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSyncOutcome {
    /// The gap to wall-clock time grew since the last block with logs.
    pub slow: bool,
    /// Number of transfer items written.
    pub events: usize,
}

/// Why a single log produced no events.
#[derive(Debug, thiserror::Error)]
enum LogError {
    #[error("invalid contract address {0}")]
    Address(String),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

pub struct TransferSync {
    node: NodeClient,
    store: Arc<dyn KvStore>,
    classifier: Arc<TokenClassifier>,
    metadata: MetadataResolver,
    lag: LagTracker,
    chain: String,
    block_method: String,
    backoff: FixedBackoff,
}

impl TransferSync {
    pub fn new(
        node: NodeClient,
        store: Arc<dyn KvStore>,
        classifier: Arc<TokenClassifier>,
        metadata: MetadataResolver,
        chain: impl Into<String>,
        backoff: FixedBackoff,
    ) -> Self {
        Self {
            node,
            store,
            classifier,
            metadata,
            lag: LagTracker::new(),
            chain: chain.into(),
            block_method: "eth_getBlockByNumber".into(),
            backoff,
        }
    }

    /// RPC method used for the block timestamp lookup.
    pub fn with_block_method(mut self, method: impl Into<String>) -> Self {
        self.block_method = method.into();
        self
    }

    pub fn lag(&self) -> &LagTracker {
        &self.lag
    }

    /// Fetch, decode and store every transfer of `block`.
    ///
    /// A log that fails classification, metadata or decoding is dropped on
    /// its own. A failed store write fails the whole block.
    pub async fn sync_transfers(
        &mut self,
        block: u64,
        cancel: &CancellationToken,
    ) -> Result<TransferSyncOutcome, SyncError> {
        let node = &self.node;
        let logs = retry_until_ok(&self.backoff, cancel, "eth_getLogs", || async move {
            node.get_logs(block, &TRANSFER_TOPICS).await.map_err(|e| {
                if e.is_query_too_large() {
                    tracing::error!(block, error = %e, "log query rejected by node");
                }
                e
            })
        })
        .await?;

        let logs: Vec<RawLog> = logs
            .into_iter()
            .filter(|log| log.removed != Some(true))
            .collect();
        if logs.is_empty() {
            tracing::debug!(block, "no transfer logs");
            return Ok(TransferSyncOutcome::default());
        }

        let method = self.block_method.as_str();
        let timestamp = retry_until_ok(&self.backoff, cancel, "block timestamp", || async move {
            match node.block_timestamp(method, block).await {
                Ok(Some(ts)) => Ok(ts),
                Ok(None) => Err(format!("block {block} not found")),
                Err(e) => Err(e.to_string()),
            }
        })
        .await?;

        let results = join_all(logs.iter().map(|log| self.process_log(log, timestamp))).await;
        let mut events = Vec::new();
        for (log, result) in logs.iter().zip(results) {
            match result {
                Ok(mut decoded) => events.append(&mut decoded),
                Err(e) => tracing::warn!(
                    block,
                    tx_hash = %log.tx_hash,
                    log_index = %log.log_index,
                    contract = %log.address,
                    error = %e,
                    "dropping log"
                ),
            }
        }

        self.write(block, &events).await?;

        let slow = self.lag.observe(timestamp);
        tracing::debug!(
            block,
            logs = logs.len(),
            events = events.len(),
            lag_ms = self.lag.last_lag_ms(),
            slow,
            "transfers synced"
        );
        Ok(TransferSyncOutcome {
            slow,
            events: events.len(),
        })
    }

    async fn process_log(&self, log: &RawLog, timestamp: i64) -> Result<Vec<TransferEvent>, LogError> {
        let contract: Address = log
            .address
            .parse()
            .map_err(|_| LogError::Address(log.address.clone()))?;
        let token_type = self.classifier.classify(contract).await;
        let metadata = self.metadata.resolve(contract, token_type).await?;
        let ctx = LogContext {
            token_type,
            token_name: metadata.and_then(|m| m.name),
            timestamp,
        };
        Ok(decode_log(log, &ctx)?)
    }

    async fn write(&self, block: u64, events: &[TransferEvent]) -> Result<(), SyncError> {
        let items = events
            .iter()
            .map(|ev| transfer_item(ev, &self.chain))
            .collect::<Result<Vec<_>, _>>()?;

        let store = &self.store;
        try_join_all(into_chunks(items).into_iter().map(|chunk| async move {
            let keys = chunk_keys(&chunk);
            store.batch_put_items(chunk).await.map_err(|e| {
                tracing::error!(block, keys = ?keys, error = %e, "transfer chunk write failed");
                SyncError::from(e)
            })
        }))
        .await?;
        Ok(())
    }
}
