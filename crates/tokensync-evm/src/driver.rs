//! The sync driver: one block at a time, in order, until cancelled.
//!
//! # Per block
//! 1. `BlockSync` stores the block and its transactions
//! 2. `TransferSync` stores the transfer logs
//! 3. the watermark is set to `MAX_BLOCK = n` (retried until stored)
//! 4. `CouncilPoller` runs when due; its failures are only logged
//! 5. advance the cursor and sleep for the pacing interval
//!
//! A block that fails is retried from step 1 after a backoff. The watermark
//! only moves once all steps for a block have succeeded, so no block is
//! ever skipped.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokensync_core::{
    retry_until_ok, Cursor, FixedBackoff, KvStore, PacingController, SyncConfig, SyncError,
    WatermarkManager,
};
use tokensync_rpc::{NodeClient, RpcTransport};

use crate::block_sync::BlockSync;
use crate::classifier::TokenClassifier;
use crate::council::CouncilPoller;
use crate::metadata::MetadataResolver;
use crate::transfer_sync::{TransferSync, TransferSyncOutcome};

pub struct SyncDriver {
    config: SyncConfig,
    node: NodeClient,
    watermark: WatermarkManager,
    blocks: BlockSync,
    transfers: TransferSync,
    council: CouncilPoller,
    classifier: Arc<TokenClassifier>,
    pacing: PacingController,
    backoff: FixedBackoff,
    cursor: Option<Cursor>,
}

impl SyncDriver {
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn RpcTransport>,
        store: Arc<dyn KvStore>,
    ) -> Self {
        let node = NodeClient::new(transport);
        let backoff = FixedBackoff::new(config.retry_backoff);
        let classifier = Arc::new(TokenClassifier::new(node.clone()));
        let metadata = MetadataResolver::new(node.clone())
            .with_ttl(config.metadata_ttl)
            .with_store(store.clone(), config.chain.clone());

        Self {
            watermark: WatermarkManager::new(store.clone(), config.chain.clone()),
            blocks: BlockSync::new(
                node.clone(),
                store.clone(),
                config.chain.clone(),
                config.block_method.clone(),
                backoff,
            ),
            transfers: TransferSync::new(
                node.clone(),
                store.clone(),
                classifier.clone(),
                metadata,
                config.chain.clone(),
                backoff,
            )
            .with_block_method(config.block_method.clone()),
            council: CouncilPoller::new(
                node.clone(),
                store,
                config.chain.clone(),
                config.council_interval,
            ),
            classifier,
            pacing: PacingController::new(config.pacing.clone()),
            backoff,
            cursor: None,
            node,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Next block to process, once resumed.
    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn pacing(&self) -> &PacingController {
        &self.pacing
    }

    pub fn classifier(&self) -> &TokenClassifier {
        &self.classifier
    }

    /// Compute the starting block from the start override, the stored
    /// watermark and (when neither exists) the chain head.
    pub async fn resume(&mut self, cancel: &CancellationToken) -> Result<Cursor, SyncError> {
        if let Some(cursor) = self.cursor {
            return Ok(cursor);
        }
        let manager = &self.watermark;
        let watermark =
            retry_until_ok(&self.backoff, cancel, "load watermark", move || manager.load()).await?;

        let start = self.config.start_block;
        let head = if Cursor::needs_head(start, watermark) {
            let node = &self.node;
            retry_until_ok(&self.backoff, cancel, "eth_blockNumber", move || node.block_number())
                .await?
        } else {
            0
        };

        let cursor = Cursor::resume(start, watermark, head);
        tracing::info!(
            block = cursor.current(),
            start_block = ?start,
            watermark = ?watermark,
            "resuming sync"
        );
        self.cursor = Some(cursor);
        Ok(cursor)
    }

    /// Run every stage for block `n` once.
    pub async fn process_block(
        &mut self,
        n: u64,
        cancel: &CancellationToken,
    ) -> Result<TransferSyncOutcome, SyncError> {
        let txs = self.blocks.sync_block(n, cancel).await?;
        let outcome = self.transfers.sync_transfers(n, cancel).await?;
        self.watermark.save_until_ok(n, &self.backoff, cancel).await?;
        self.council.maybe_poll().await;

        tracing::info!(
            block = n,
            txs,
            transfers = outcome.events,
            slow = outcome.slow,
            "block processed"
        );
        Ok(outcome)
    }

    /// Process the block under the cursor, retrying it until it succeeds,
    /// then advance. Returns the processed block number.
    pub async fn step(&mut self, cancel: &CancellationToken) -> Result<u64, SyncError> {
        let n = self.resume(cancel).await?.current();
        let mut attempts = 0u32;
        loop {
            match self.process_block(n, cancel).await {
                Ok(outcome) => {
                    let interval = self.pacing.record(outcome.slow);
                    tracing::trace!(block = n, interval_ms = interval.as_millis() as u64, "pacing");
                    if let Some(cursor) = self.cursor.as_mut() {
                        cursor.advance();
                    }
                    return Ok(n);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    attempts += 1;
                    tracing::error!(block = n, attempt = attempts, error = %e, "block failed");
                    if self.config.max_block_attempts.is_some_and(|max| attempts >= max) {
                        return Err(SyncError::Aborted {
                            block_number: n,
                            reason: e.to_string(),
                        });
                    }
                    self.backoff.wait(cancel).await?;
                }
            }
        }
    }

    /// Sync until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), SyncError> {
        tracing::info!(
            rpc = %self.node.url(),
            chain = %self.config.chain,
            "starting sync"
        );
        loop {
            match self.step(&cancel).await {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => break,
                Err(e) => return Err(e),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.pacing.interval()) => {}
            }
        }
        tracing::info!(next_block = ?self.cursor.map(|c| c.current()), "sync stopped");
        Ok(())
    }
}
