//! Token standard detection through capability probes.
//!
//! Probe order (first success wins):
//!
//! 1. `supportsInterface(KIP-37)`
//! 2. `supportsInterface(ERC-1155)`
//! 3. `supportsInterface(ERC-721)`
//! 4. bytecode contains every ERC-20 function selector
//! 5. `totalSupply`, `name`, `symbol`, `decimals` and `balanceOf(0x0)` all answer
//!
//! A failed probe means the capability is absent. Results are memoized per
//! address for the life of the classifier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::Address;
use tokio::sync::OnceCell;
use tokensync_core::types::address_key;
use tokensync_core::TokenType;
use tokensync_rpc::NodeClient;

use crate::abi::{
    balance_of_call, code_contains_selector, decode_bool, decode_string, decode_u8, decode_uint,
    encode_call, selector, supports_interface_call, ERC1155_INTERFACE_ID, ERC20_FUNCTIONS,
    ERC721_INTERFACE_ID, KIP37_INTERFACE_ID,
};

const INTERFACE_PROBES: [([u8; 4], TokenType); 3] = [
    (KIP37_INTERFACE_ID, TokenType::MultiTokenB),
    (ERC1155_INTERFACE_ID, TokenType::MultiTokenA),
    (ERC721_INTERFACE_ID, TokenType::Nft),
];

/// Memoizing token classifier.
///
/// Concurrent callers for the same address share a single probe run.
pub struct TokenClassifier {
    node: NodeClient,
    cache: Mutex<HashMap<Address, Arc<OnceCell<TokenType>>>>,
}

impl TokenClassifier {
    pub fn new(node: NodeClient) -> Self {
        Self {
            node,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Classify `address`. Never fails; unreachable contracts are `Unknown`.
    pub async fn classify(&self, address: Address) -> TokenType {
        let cell = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(address)
            .or_default()
            .clone();
        *cell.get_or_init(|| self.probe(address)).await
    }

    /// Previously computed classification, if any.
    pub fn cached(&self, address: &Address) -> Option<TokenType> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .and_then(|cell| cell.get().copied())
    }

    /// Number of addresses with a cache entry.
    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn probe(&self, address: Address) -> TokenType {
        let target = address_key(&address);

        for (interface_id, token_type) in INTERFACE_PROBES {
            if self.supports_interface(&target, interface_id).await {
                tracing::debug!(contract = %target, token_type = %token_type, "interface probe matched");
                return token_type;
            }
        }

        if self.has_erc20_bytecode(&target).await {
            tracing::debug!(contract = %target, "ERC-20 selectors found in bytecode");
            return TokenType::Fungible;
        }

        if self.answers_erc20_calls(&target).await {
            tracing::debug!(contract = %target, "ERC-20 calls answered");
            return TokenType::Fungible;
        }

        tracing::info!(contract = %target, "contract matches no known token standard");
        TokenType::Unknown
    }

    async fn supports_interface(&self, target: &str, interface_id: [u8; 4]) -> bool {
        match self
            .node
            .eth_call(target, &supports_interface_call(interface_id))
            .await
        {
            Ok(ret) => decode_bool(&ret).unwrap_or(false),
            Err(e) => {
                tracing::trace!(contract = %target, interface = %hex::encode(interface_id), error = %e, "supportsInterface failed");
                false
            }
        }
    }

    async fn has_erc20_bytecode(&self, target: &str) -> bool {
        match self.node.get_code(target).await {
            Ok(code) if !code.is_empty() => ERC20_FUNCTIONS
                .iter()
                .all(|f| code_contains_selector(&code, selector(f))),
            Ok(_) => false,
            Err(e) => {
                tracing::trace!(contract = %target, error = %e, "eth_getCode failed");
                false
            }
        }
    }

    async fn answers_erc20_calls(&self, target: &str) -> bool {
        let call = move |data: Vec<u8>| async move { self.node.eth_call(target, &data).await.ok() };
        let (total_supply, name, symbol, decimals, balance) = futures::join!(
            call(encode_call("totalSupply()", vec![])),
            call(encode_call("name()", vec![])),
            call(encode_call("symbol()", vec![])),
            call(encode_call("decimals()", vec![])),
            call(balance_of_call(Address::ZERO)),
        );
        total_supply.is_some_and(|r| decode_uint(&r).is_ok())
            && name.is_some_and(|r| decode_string(&r).is_ok())
            && symbol.is_some_and(|r| decode_string(&r).is_ok())
            && decimals.is_some_and(|r| decode_u8(&r).is_ok())
            && balance.is_some_and(|r| decode_uint(&r).is_ok())
    }
}
