//! Token metadata resolution with a time-bounded cache.
//!
//! Fields fetched per standard:
//!
//! | Standard        | Calls                                          |
//! |-----------------|------------------------------------------------|
//! | ERC-20          | name, symbol, decimals, totalSupply (all required) |
//! | ERC-721         | name, symbol (required), totalSupply (optional) |
//! | ERC-1155/KIP-37 | none                                           |
//! | unknown         | none, resolves to `None`                       |
//!
//! Concurrent callers for the same address share one in-flight fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use alloy_primitives::{Address, U256};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokensync_core::record::token_item;
use tokensync_core::types::address_key;
use tokensync_core::{KvStore, SyncError, TokenMetadata, TokenType};
use tokensync_rpc::NodeClient;

use crate::abi::{decode_string, decode_u8, decode_uint, encode_call, AbiError};

/// Default lifetime of a resolved entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, thiserror::Error)]
pub enum MetadataError {
    #[error("{function} call to {address} failed: {reason}")]
    Call {
        address: String,
        function: &'static str,
        reason: String,
    },

    #[error("{function} on {address} returned an undecodable value: {reason}")]
    Decode {
        address: String,
        function: &'static str,
        reason: String,
    },
}

impl MetadataError {
    pub fn address(&self) -> &str {
        match self {
            Self::Call { address, .. } | Self::Decode { address, .. } => address,
        }
    }
}

impl From<MetadataError> for SyncError {
    fn from(e: MetadataError) -> Self {
        SyncError::Metadata {
            address: e.address().to_string(),
            reason: e.to_string(),
        }
    }
}

type FetchResult = Result<Option<TokenMetadata>, MetadataError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

#[derive(Default)]
struct Cache {
    in_flight: Mutex<HashMap<Address, SharedFetch>>,
    ready: Mutex<HashMap<Address, (Instant, TokenMetadata)>>,
}

/// Resolves and caches token metadata.
///
/// When a store is attached, every fresh fetch also writes a `TOKEN` item.
#[derive(Clone)]
pub struct MetadataResolver {
    node: NodeClient,
    ttl: Duration,
    sink: Option<(Arc<dyn KvStore>, String)>,
    cache: Arc<Cache>,
}

impl MetadataResolver {
    pub fn new(node: NodeClient) -> Self {
        Self {
            node,
            ttl: DEFAULT_TTL,
            sink: None,
            cache: Arc::new(Cache::default()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Persist freshly fetched metadata as `TOKEN` items.
    pub fn with_store(mut self, store: Arc<dyn KvStore>, chain: impl Into<String>) -> Self {
        self.sink = Some((store, chain.into()));
        self
    }

    /// Resolve metadata for a contract already classified as `token_type`.
    pub async fn resolve(
        &self,
        address: Address,
        token_type: TokenType,
    ) -> Result<Option<TokenMetadata>, MetadataError> {
        if let Some(meta) = self.fresh(&address) {
            return Ok(Some(meta));
        }

        let fetch = {
            let mut in_flight = self
                .cache
                .in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            in_flight
                .entry(address)
                .or_insert_with(|| self.clone().fetch_and_store(address, token_type).boxed().shared())
                .clone()
        };
        fetch.await
    }

    fn fresh(&self, address: &Address) -> Option<TokenMetadata> {
        let ready = self.cache.ready.lock().unwrap_or_else(|e| e.into_inner());
        ready
            .get(address)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, meta)| meta.clone())
    }

    async fn fetch_and_store(self, address: Address, token_type: TokenType) -> FetchResult {
        let result = fetch(&self.node, address, token_type).await;

        if let Ok(Some(meta)) = &result {
            self.cache
                .ready
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(address, (Instant::now(), meta.clone()));

            if let Some((store, chain)) = &self.sink {
                if let Err(e) = store.put_item(token_item(meta, chain)).await {
                    tracing::warn!(contract = %address_key(&address), error = %e, "failed to store token record");
                }
            }
        }

        self.cache
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&address);
        result
    }
}

async fn fetch(node: &NodeClient, address: Address, token_type: TokenType) -> FetchResult {
    let target = address_key(&address);
    let now = chrono::Utc::now().timestamp();

    match token_type {
        TokenType::Fungible => {
            let (name, symbol, decimals, total_supply) = futures::try_join!(
                read(node, &target, "name()", decode_string),
                read(node, &target, "symbol()", decode_string),
                read(node, &target, "decimals()", decode_u8),
                read(node, &target, "totalSupply()", decode_uint),
            )?;
            Ok(Some(TokenMetadata {
                contract_address: address,
                token_type,
                name: Some(name),
                symbol: Some(symbol),
                decimals: Some(decimals),
                total_supply: Some(total_supply),
                fetched_at: now,
            }))
        }
        TokenType::Nft => {
            let (required, total_supply) = futures::join!(
                async {
                    futures::try_join!(
                        read(node, &target, "name()", decode_string),
                        read(node, &target, "symbol()", decode_string),
                    )
                },
                read::<U256>(node, &target, "totalSupply()", decode_uint),
            );
            let (name, symbol) = required?;
            let total_supply = match total_supply {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(contract = %target, error = %e, "ERC-721 totalSupply unavailable");
                    None
                }
            };
            Ok(Some(TokenMetadata {
                contract_address: address,
                token_type,
                name: Some(name),
                symbol: Some(symbol),
                decimals: None,
                total_supply,
                fetched_at: now,
            }))
        }
        TokenType::MultiTokenA | TokenType::MultiTokenB => {
            Ok(Some(TokenMetadata::minimal(address, token_type)))
        }
        TokenType::Unknown => Ok(None),
    }
}

async fn read<T>(
    node: &NodeClient,
    target: &str,
    function: &'static str,
    decode: fn(&[u8]) -> Result<T, AbiError>,
) -> Result<T, MetadataError> {
    let ret = node
        .eth_call(target, &encode_call(function, vec![]))
        .await
        .map_err(|e| MetadataError::Call {
            address: target.to_string(),
            function,
            reason: e.to_string(),
        })?;
    decode(&ret).map_err(|e| MetadataError::Decode {
        address: target.to_string(),
        function,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::dyn_abi::DynSolValue;
    use serde_json::{json, Value};
    use tokensync_rpc::{JsonRpcError, MockTransport, TransportError};

    fn word(v: u64) -> Value {
        json!(format!("0x{}", hex::encode(U256::from(v).to_be_bytes::<32>())))
    }

    fn string_ret(s: &str) -> Value {
        json!(format!(
            "0x{}",
            hex::encode(DynSolValue::Tuple(vec![DynSolValue::String(s.into())]).abi_encode_params())
        ))
    }

    fn reverts() -> Result<Value, TransportError> {
        Err(TransportError::Rpc(JsonRpcError::new(3, "execution reverted")))
    }

    /// A token answering name/symbol/decimals, and totalSupply unless `no_supply`.
    fn token_node(no_supply: bool) -> Arc<MockTransport> {
        let mock = Arc::new(MockTransport::new());
        mock.on_fn("eth_call", move |params| {
            let data = params[0]["data"].as_str().unwrap_or_default();
            match &data[..10] {
                "0x06fdde03" => Ok(string_ret("Wrapped KAIA")),
                "0x95d89b41" => Ok(string_ret("WKAIA")),
                "0x313ce567" => Ok(word(18)),
                "0x18160ddd" if !no_supply => Ok(word(1_000_000)),
                _ => reverts(),
            }
        });
        mock
    }

    fn addr() -> Address {
        "0x2222222222222222222222222222222222222222".parse().unwrap()
    }

    #[tokio::test]
    async fn fungible_fetches_all_fields() {
        let resolver = MetadataResolver::new(NodeClient::new(token_node(false)));
        let meta = resolver.resolve(addr(), TokenType::Fungible).await.unwrap().unwrap();
        assert_eq!(meta.name.as_deref(), Some("Wrapped KAIA"));
        assert_eq!(meta.symbol.as_deref(), Some("WKAIA"));
        assert_eq!(meta.decimals, Some(18));
        assert_eq!(meta.total_supply, Some(U256::from(1_000_000u64)));
    }

    #[tokio::test]
    async fn fungible_failure_propagates_and_is_not_cached() {
        let mock = token_node(true);
        let resolver = MetadataResolver::new(NodeClient::new(mock.clone()));
        let err = resolver.resolve(addr(), TokenType::Fungible).await.unwrap_err();
        assert!(matches!(err, MetadataError::Call { function: "totalSupply()", .. }));

        let before = mock.calls("eth_call");
        assert!(resolver.resolve(addr(), TokenType::Fungible).await.is_err());
        assert!(mock.calls("eth_call") > before);
    }

    #[tokio::test]
    async fn nft_total_supply_is_optional() {
        let resolver = MetadataResolver::new(NodeClient::new(token_node(true)));
        let meta = resolver.resolve(addr(), TokenType::Nft).await.unwrap().unwrap();
        assert_eq!(meta.name.as_deref(), Some("Wrapped KAIA"));
        assert_eq!(meta.total_supply, None);
        assert_eq!(meta.decimals, None);
    }

    #[tokio::test]
    async fn multi_token_makes_no_calls() {
        let mock = token_node(false);
        let resolver = MetadataResolver::new(NodeClient::new(mock.clone()));
        let meta = resolver.resolve(addr(), TokenType::MultiTokenB).await.unwrap().unwrap();
        assert_eq!(meta.token_type, TokenType::MultiTokenB);
        assert!(meta.name.is_none());
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_resolves_to_none() {
        let resolver = MetadataResolver::new(NodeClient::new(token_node(false)));
        assert!(resolver.resolve(addr(), TokenType::Unknown).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cached_until_ttl_expires() {
        let mock = token_node(false);
        let resolver = MetadataResolver::new(NodeClient::new(mock.clone()));
        resolver.resolve(addr(), TokenType::Fungible).await.unwrap();
        resolver.resolve(addr(), TokenType::Fungible).await.unwrap();
        assert_eq!(mock.calls("eth_call"), 4);

        let mock = token_node(false);
        let resolver = MetadataResolver::new(NodeClient::new(mock.clone())).with_ttl(Duration::ZERO);
        resolver.resolve(addr(), TokenType::Fungible).await.unwrap();
        resolver.resolve(addr(), TokenType::Fungible).await.unwrap();
        assert_eq!(mock.calls("eth_call"), 8);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let mock = token_node(false);
        let resolver = MetadataResolver::new(NodeClient::new(mock.clone()));
        let (a, b, c) = futures::join!(
            resolver.resolve(addr(), TokenType::Fungible),
            resolver.resolve(addr(), TokenType::Fungible),
            resolver.resolve(addr(), TokenType::Fungible),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.is_ok());
        assert_eq!(mock.calls("eth_call"), 4);
        assert!(resolver.cache.in_flight.lock().unwrap().is_empty());
    }
}
