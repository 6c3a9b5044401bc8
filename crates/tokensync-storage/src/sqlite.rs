//! SQLite store backend.
//!
//! One table holds every item: `(pk, sk)` is the primary key and the
//! attribute map is stored as JSON. Batch writes run in a single
//! transaction, so a batch is stored entirely or not at all.
//!
//! # Usage
//! ```rust,no_run
//! use tokensync_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./tokensync.db", "tokensync").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory("tokensync").await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use tokensync_core::store::check_batch_len;
use tokensync_core::{AttrValue, Item, KvStore, StoreError};

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// SQLite-backed `KvStore`.
pub struct SqliteStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./tokensync.db"`) or a full
    /// SQLite URL (`"sqlite:./tokensync.db?mode=rwc"`).
    pub async fn open(path: &str, table: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(backend)?;
        Self::with_pool(pool, table).await
    }

    /// Open an in-memory database. All data is lost when the store is dropped.
    pub async fn in_memory(table: &str) -> Result<Self, StoreError> {
        // every connection to `:memory:` is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(backend)?;
        Self::with_pool(pool, table).await
    }

    async fn with_pool(pool: SqlitePool, table: &str) -> Result<Self, StoreError> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::Backend(format!("invalid table name {table:?}")));
        }
        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                pk         TEXT NOT NULL,
                sk         TEXT NOT NULL,
                attributes TEXT NOT NULL,
                PRIMARY KEY (pk, sk)
            );",
            self.table
        ))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    fn upsert_sql(&self) -> String {
        format!(
            "INSERT OR REPLACE INTO {} (pk, sk, attributes) VALUES (?, ?, ?)",
            self.table
        )
    }

    /// Number of stored items.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS cnt FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

fn encode_attributes(item: &Item) -> Result<String, StoreError> {
    serde_json::to_string(&item.attributes).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn put_item(&self, item: Item) -> Result<(), StoreError> {
        let attributes = encode_attributes(&item)?;
        sqlx::query(&self.upsert_sql())
            .bind(&item.pk)
            .bind(&item.sk)
            .bind(&attributes)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn batch_put_items(&self, items: Vec<Item>) -> Result<(), StoreError> {
        check_batch_len(&items)?;
        let sql = self.upsert_sql();

        let mut tx = self.pool.begin().await.map_err(backend)?;
        for item in &items {
            sqlx::query(&sql)
                .bind(&item.pk)
                .bind(&item.sk)
                .bind(encode_attributes(item)?)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;

        debug!(items = items.len(), "batch stored");
        Ok(())
    }

    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT attributes FROM {} WHERE pk = ? AND sk = ?",
            self.table
        ))
        .bind(pk)
        .bind(sk)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.get("attributes");
        let attributes: BTreeMap<String, AttrValue> =
            serde_json::from_str(&raw).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(Item {
            pk: pk.to_string(),
            sk: sk.to_string(),
            attributes,
        }))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
