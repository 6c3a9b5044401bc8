//! Watermark manager: persists the highest fully processed block.
//!
//! The watermark is a single `MAX_BLOCK` item. It is read once at startup to
//! compute the resume point and written after every completed block.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::record::{watermark_item, WATERMARK_KEY};
use crate::retry::{retry_until_ok, FixedBackoff};
use crate::store::KvStore;

/// Reads and writes the `MAX_BLOCK` item.
pub struct WatermarkManager {
    store: Arc<dyn KvStore>,
    chain: String,
}

impl WatermarkManager {
    pub fn new(store: Arc<dyn KvStore>, chain: impl Into<String>) -> Self {
        Self {
            store,
            chain: chain.into(),
        }
    }

    /// Load the saved watermark (returns `None` if none exists).
    pub async fn load(&self) -> Result<Option<u64>, SyncError> {
        let item = self.store.get_item(WATERMARK_KEY, WATERMARK_KEY).await?;
        match item {
            None => Ok(None),
            Some(item) => {
                let n = item
                    .get("RESULT")
                    .and_then(|v| v.as_num())
                    .ok_or_else(|| SyncError::Payload("MAX_BLOCK item has no numeric RESULT".into()))?;
                Ok(Some(n as u64))
            }
        }
    }

    /// Save the watermark once.
    pub async fn save(&self, block_number: u64) -> Result<(), SyncError> {
        self.store
            .put_item(watermark_item(block_number, &self.chain))
            .await?;
        tracing::debug!(block = block_number, "watermark saved");
        Ok(())
    }

    /// Save the watermark, retrying store errors until it succeeds or the
    /// token is cancelled.
    pub async fn save_until_ok(
        &self,
        block_number: u64,
        backoff: &FixedBackoff,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        retry_until_ok(backoff, cancel, "save watermark", || self.save(block_number)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::Item;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fails the first `failures` puts.
    #[derive(Default)]
    struct FlakyStore {
        failures: AtomicU32,
        items: Mutex<HashMap<(String, String), Item>>,
    }

    #[async_trait]
    impl KvStore for FlakyStore {
        async fn put_item(&self, item: Item) -> Result<(), StoreError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Backend("throttled".into()));
            }
            self.items
                .lock()
                .unwrap()
                .insert((item.pk.clone(), item.sk.clone()), item);
            Ok(())
        }

        async fn batch_put_items(&self, items: Vec<Item>) -> Result<(), StoreError> {
            for item in items {
                self.put_item(item).await?;
            }
            Ok(())
        }

        async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .get(&(pk.to_string(), sk.to_string()))
                .cloned())
        }
    }

    #[tokio::test]
    async fn watermark_roundtrip() {
        let mgr = WatermarkManager::new(Arc::new(FlakyStore::default()), "KAIA");
        assert!(mgr.load().await.unwrap().is_none());

        mgr.save(1000).await.unwrap();
        assert_eq!(mgr.load().await.unwrap(), Some(1000));

        mgr.save(1001).await.unwrap();
        assert_eq!(mgr.load().await.unwrap(), Some(1001));
    }

    #[tokio::test]
    async fn save_until_ok_retries_store_errors() {
        let store = Arc::new(FlakyStore::default());
        store.failures.store(3, Ordering::SeqCst);
        let mgr = WatermarkManager::new(store.clone(), "KAIA");

        let backoff = FixedBackoff::new(Duration::from_millis(1));
        mgr.save_until_ok(77, &backoff, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(mgr.load().await.unwrap(), Some(77));
        assert_eq!(store.failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn save_until_ok_stops_on_cancel() {
        let store = Arc::new(FlakyStore::default());
        store.failures.store(u32::MAX, Ordering::SeqCst);
        let mgr = WatermarkManager::new(store, "KAIA");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = mgr
            .save_until_ok(1, &FixedBackoff::new(Duration::from_millis(1)), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
