//! Key-value store abstraction.
//!
//! Items are addressed by a partition key (`PK`) and a sort key (`SK`) and
//! carry a flat attribute map. Backends include `InMemoryStore` and
//! `SqliteStore` in `tokensync-storage`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Maximum number of items accepted by a single `batch_put_items` call.
pub const MAX_BATCH_ITEMS: usize = 25;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AttrValue {
    #[serde(rename = "S")]
    Str(String),
    #[serde(rename = "N")]
    Num(i64),
    #[serde(rename = "B")]
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<i64> {
        match self {
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        Self::Num(n)
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// A stored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub pk: String,
    pub sk: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Item {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Set the attribute only when `value` is present.
    pub fn with_opt<V: Into<AttrValue>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(name, v),
            None => self,
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// `PK/SK` pair, used when logging a failed chunk.
    pub fn key(&self) -> String {
        format!("{}/{}", self.pk, self.sk)
    }
}

/// Trait implemented by every persistence backend.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Insert or replace a single item.
    async fn put_item(&self, item: Item) -> Result<(), StoreError>;

    /// Insert or replace up to [`MAX_BATCH_ITEMS`] items.
    ///
    /// Larger batches are rejected with [`StoreError::BatchTooLarge`].
    async fn batch_put_items(&self, items: Vec<Item>) -> Result<(), StoreError>;

    /// Fetch an item by its primary key.
    async fn get_item(&self, pk: &str, sk: &str) -> Result<Option<Item>, StoreError>;
}

/// Reject batches above the backend limit.
pub fn check_batch_len(items: &[Item]) -> Result<(), StoreError> {
    if items.len() > MAX_BATCH_ITEMS {
        return Err(StoreError::BatchTooLarge {
            len: items.len(),
            max: MAX_BATCH_ITEMS,
        });
    }
    Ok(())
}

/// Split items into chunks that each fit a single batch write.
pub fn into_chunks(items: Vec<Item>) -> Vec<Vec<Item>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(MAX_BATCH_ITEMS));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(MAX_BATCH_ITEMS).collect());
    }
    chunks
}

/// Keys of every item in a chunk.
pub fn chunk_keys(items: &[Item]) -> Vec<String> {
    items.iter().map(Item::key).collect()
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(i: usize) -> Item {
        Item::new("1", format!("TX#1#{i:03}"))
    }

    #[test]
    fn chunks_respect_batch_limit() {
        let items: Vec<Item> = (0..60).map(item).collect();
        let chunks = into_chunks(items);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 25);
        assert_eq!(chunks[1].len(), 25);
        assert_eq!(chunks[2].len(), 10);
        assert_eq!(chunks[2][0].sk, "TX#1#050");
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(into_chunks(Vec::new()).is_empty());
    }

    #[test]
    fn oversize_batch_rejected() {
        let items: Vec<Item> = (0..26).map(item).collect();
        let err = check_batch_len(&items).unwrap_err();
        assert!(matches!(err, StoreError::BatchTooLarge { len: 26, max: 25 }));
        assert!(check_batch_len(&items[..25]).is_ok());
    }

    #[test]
    fn attribute_json_shape() {
        let it = Item::new("MAX_BLOCK", "MAX_BLOCK")
            .with("RESULT", 42i64)
            .with("CHAIN", "KAIA")
            .with("BLOB", vec![0xdeu8, 0xad])
            .with_opt::<String>("NAME", None);
        let json = serde_json::to_value(&it).unwrap();
        assert_eq!(json["attributes"]["RESULT"]["type"], "N");
        assert_eq!(json["attributes"]["BLOB"]["value"], "dead");
        assert!(json["attributes"].get("NAME").is_none());

        let back: Item = serde_json::from_value(json).unwrap();
        assert_eq!(back, it);
    }
}
