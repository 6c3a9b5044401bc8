//! Block stage: one full block → `BLOCK` + `TX` items.

use std::sync::Arc;

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tokensync_core::record::{block_item, transaction_item};
use tokensync_core::store::{chunk_keys, into_chunks};
use tokensync_core::types::{BlockRecord, TransactionRecord};
use tokensync_core::{retry_until_ok, FixedBackoff, KvStore, SyncError};
use tokensync_rpc::{NodeClient, RawBlock, RawTransaction};

pub struct BlockSync {
    node: NodeClient,
    store: Arc<dyn KvStore>,
    chain: String,
    block_method: String,
    backoff: FixedBackoff,
}

impl BlockSync {
    pub fn new(
        node: NodeClient,
        store: Arc<dyn KvStore>,
        chain: impl Into<String>,
        block_method: impl Into<String>,
        backoff: FixedBackoff,
    ) -> Self {
        Self {
            node,
            store,
            chain: chain.into(),
            block_method: block_method.into(),
            backoff,
        }
    }

    /// Fetch block `n` and store it with its transactions.
    ///
    /// Waits (retrying) until the node has produced the block. Returns the
    /// number of transactions stored.
    pub async fn sync_block(&self, n: u64, cancel: &CancellationToken) -> Result<usize, SyncError> {
        let block = self.fetch_block(n, cancel).await?;

        let records = try_join_all(
            block
                .transactions
                .iter()
                .map(|tx| self.transaction_record(&block, tx)),
        )
        .await?;

        let mut items = Vec::with_capacity(records.len() + 1);
        items.push(block_item(
            &BlockRecord {
                number: block.number,
                hash: block.hash.clone(),
                miner: block.miner.clone(),
                timestamp: block.timestamp,
                tx_count: block.transactions.len(),
                raw: block.raw.clone(),
            },
            &self.chain,
        )?);
        for record in &records {
            items.push(transaction_item(record, &self.chain)?);
        }

        for chunk in into_chunks(items) {
            let keys = chunk_keys(&chunk);
            if let Err(e) = self.store.batch_put_items(chunk).await {
                tracing::error!(block = n, keys = ?keys, error = %e, "block chunk write failed");
                return Err(e.into());
            }
        }

        tracing::debug!(block = n, txs = records.len(), "block synced");
        Ok(records.len())
    }

    async fn fetch_block(&self, n: u64, cancel: &CancellationToken) -> Result<RawBlock, SyncError> {
        let node = &self.node;
        let method = self.block_method.as_str();
        retry_until_ok(&self.backoff, cancel, method, || async move {
            match node.get_block(method, n, true).await {
                Ok(Some(block)) => Ok(block),
                Ok(None) => Err(format!("block {n} not produced yet")),
                Err(e) => Err(e.to_string()),
            }
        })
        .await
    }

    /// A contract creation has no `to`; the receipt carries the new address.
    async fn transaction_record(
        &self,
        block: &RawBlock,
        tx: &RawTransaction,
    ) -> Result<TransactionRecord, SyncError> {
        let to = match &tx.to {
            Some(to) => Some(to.clone()),
            None => {
                let receipt = self
                    .node
                    .get_receipt(&tx.hash)
                    .await
                    .map_err(|e| SyncError::Rpc(e.to_string()))?
                    .ok_or_else(|| SyncError::MissingReceipt {
                        tx_hash: tx.hash.clone(),
                    })?;
                receipt.recipient().map(|a| a.to_lowercase())
            }
        };
        Ok(TransactionRecord {
            block_number: block.number,
            tx_index: tx.tx_index,
            hash: tx.hash.clone(),
            from: tx.from.clone(),
            to,
            nonce: tx.nonce,
            timestamp: block.timestamp,
            raw: tx.raw.clone(),
        })
    }
}
