//! Core domain types shared across the pipeline.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Token standard of an emitting contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    /// ERC-20 style fungible token.
    #[serde(rename = "ERC20")]
    Fungible,
    /// ERC-1155 style multi-token.
    #[serde(rename = "ERC1155")]
    MultiTokenA,
    /// ERC-721 style non-fungible token.
    #[serde(rename = "ERC721")]
    Nft,
    /// KIP-37 style multi-token.
    #[serde(rename = "KIP37")]
    MultiTokenB,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl TokenType {
    /// Label written to the `TYPE` attribute of stored records.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fungible => "ERC20",
            Self::MultiTokenA => "ERC1155",
            Self::Nft => "ERC721",
            Self::MultiTokenB => "KIP37",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_multi_token(&self) -> bool {
        matches!(self, Self::MultiTokenA | Self::MultiTokenB)
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Shape of the transfer event a log was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferType {
    /// `Transfer(address,address,uint256)`
    #[serde(rename = "Transfer")]
    Single,
    /// `TransferSingle(address,address,address,uint256,uint256)`
    #[serde(rename = "TransferSingle")]
    BatchSingle,
    /// `TransferBatch(address,address,address,uint256[],uint256[])`
    #[serde(rename = "TransferBatch")]
    BatchMulti,
}

impl TransferType {
    /// Event name, written to the `METHOD` attribute.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Single => "Transfer",
            Self::BatchSingle => "TransferSingle",
            Self::BatchMulti => "TransferBatch",
        }
    }
}

impl std::fmt::Display for TransferType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.method())
    }
}

/// Value moved by a transfer.
///
/// A fungible transfer carries only an amount. Every other transfer carries
/// a token id and an amount (`1` for unit NFT transfers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferValue {
    Fungible { amount: U256 },
    NonFungible { token_id: U256, amount: U256 },
}

impl TransferValue {
    pub fn amount(&self) -> U256 {
        match self {
            Self::Fungible { amount } | Self::NonFungible { amount, .. } => *amount,
        }
    }

    pub fn token_id(&self) -> Option<U256> {
        match self {
            Self::Fungible { .. } => None,
            Self::NonFungible { token_id, .. } => Some(*token_id),
        }
    }
}

/// A single decoded token transfer.
///
/// `(block_number, log_index, param_index)` identifies the event; a batch
/// log produces one event per `param_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub block_number: u64,
    pub tx_index: u32,
    pub log_index: u32,
    pub tx_hash: String,
    pub token_type: TokenType,
    pub transfer_type: TransferType,
    pub contract_address: Address,
    pub from: Address,
    pub to: Address,
    pub value: TransferValue,
    /// Position inside a batch transfer, `0` otherwise.
    pub param_index: u32,
    /// Owning block's timestamp (seconds).
    pub timestamp: i64,
    pub token_name: Option<String>,
}

impl TransferEvent {
    /// `true` when the event is stored under the `TRANSFER#TOKEN` key space.
    pub fn is_fungible_record(&self) -> bool {
        self.token_type == TokenType::Fungible && self.transfer_type == TransferType::Single
    }
}

/// On-chain metadata of a token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub contract_address: Address,
    pub token_type: TokenType,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub total_supply: Option<U256>,
    /// Unix timestamp (seconds) of the fetch.
    pub fetched_at: i64,
}

impl TokenMetadata {
    /// A record with no on-chain fields, used for multi-token contracts.
    pub fn minimal(contract_address: Address, token_type: TokenType) -> Self {
        Self {
            contract_address,
            token_type,
            name: None,
            symbol: None,
            decimals: None,
            total_supply: None,
            fetched_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// A block as stored: header fields plus the raw node payload.
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub number: u64,
    pub hash: String,
    pub miner: String,
    pub timestamp: i64,
    pub tx_count: usize,
    pub raw: serde_json::Value,
}

/// A transaction as stored.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub block_number: u64,
    pub tx_index: u32,
    pub hash: String,
    pub from: String,
    /// Recipient; for contract creations this is the created contract.
    pub to: Option<String>,
    pub nonce: u64,
    pub timestamp: i64,
    pub raw: serde_json::Value,
}

/// Lowercase `0x`-prefixed hex form of an address, as used in store keys.
pub fn address_key(address: &Address) -> String {
    format!("{address:#x}")
}
