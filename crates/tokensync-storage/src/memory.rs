//! In-memory store backend.
//!
//! Keeps every item in a sorted map. Useful for tests and dry runs that
//! don't need persistence. Writes can be made to fail on demand so callers
//! can exercise their error paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use tokensync_core::store::check_batch_len;
use tokensync_core::{Item, KvStore, StoreError};

/// Which writes are rejected.
#[derive(Debug, Clone, Default)]
enum FailMode {
    #[default]
    Never,
    Always,
    /// Any write touching an item whose sort key starts with the prefix.
    SortKeyPrefix(String),
}

/// In-memory `KvStore`.
///
/// All data is lost when the store is dropped.
#[derive(Default)]
pub struct InMemoryStore {
    items: Mutex<BTreeMap<(String, String), Item>>,
    fail: Mutex<FailMode>,
    batch_writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored item, ordered by `(PK, SK)`.
    pub fn items(&self) -> Vec<Item> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Items whose sort key starts with `prefix`.
    pub fn items_with_sk_prefix(&self, prefix: &str) -> Vec<Item> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|item| item.sk.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Number of successful `batch_put_items` calls.
    pub fn batch_writes(&self) -> usize {
        self.batch_writes.load(Ordering::SeqCst)
    }

    /// Make every write fail (`true`) or succeed (`false`).
    pub fn fail_writes(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) =
            if fail { FailMode::Always } else { FailMode::Never };
    }

    /// Fail any write that includes an item whose sort key starts with `prefix`.
    pub fn fail_writes_with_sk_prefix(&self, prefix: impl Into<String>) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) = FailMode::SortKeyPrefix(prefix.into());
    }

    fn check_writable(&self, items: &[Item]) -> Result<(), StoreError> {
        let rejected = match &*self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            FailMode::Never => false,
            FailMode::Always => true,
            FailMode::SortKeyPrefix(prefix) => items.iter().any(|i| i.sk.starts_with(prefix.as_str())),
        };
        if rejected {
            return Err(StoreError::Backend("write rejected by in-memory store".into()));
        }
        Ok(())
    }

    fn insert(&self, items: Vec<Item>) {
        let mut map = self.items.lock().unwrap_or_else(|e| e.into_inner());
        for item in items {
            map.insert((item.pk.clone(), item.sk.clone()), item);
        }
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn put_item(&self, item: Item) -> Result<(), StoreError> {
        self.check_writable(std::slice::from_ref(&item))?;
        self.insert(vec![item]);
        Ok(())
    }

    async fn batch_put_items(&self, items: Vec<Item>) -> Result<(), StoreError> {
        check_batch_len(&items)?;
        self.check_writable(&items)?;
        self.insert(items);
        self.batch_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        Ok(self
            .items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(pk.to_string(), sk.to_string()))
            .cloned())
    }
}
