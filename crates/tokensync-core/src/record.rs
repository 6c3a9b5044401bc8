//! Storage record shaping.
//!
//! Every key is a pure function of the identity of the thing stored, so
//! re-processing a block rewrites the same items.

use serde_json::json;

use crate::compress::compress_json;
use crate::error::SyncError;
use crate::store::Item;
use crate::types::{address_key, BlockRecord, TokenMetadata, TransactionRecord, TransferEvent};

pub const WATERMARK_KEY: &str = "MAX_BLOCK";
pub const COUNCIL_KEY: &str = "GC_INFO";

/// Zero-padded index used in sort keys.
fn pad(n: u32) -> String {
    format!("{n:03}")
}

/// Sort keys of a transfer: `(SK, GS1SK)`.
pub fn transfer_sort_keys(ev: &TransferEvent) -> (String, String) {
    if ev.is_fungible_record() {
        let sk = format!("TRANSFER#TOKEN#{}#{}", ev.block_number, pad(ev.log_index));
        let gs1 = format!("TRANSFER#TOKEN#{}", pad(ev.log_index));
        (sk, gs1)
    } else {
        let sk = format!(
            "TRANSFER#NFT#{}#{}#{}",
            ev.block_number,
            pad(ev.log_index),
            pad(ev.param_index)
        );
        (sk.clone(), sk)
    }
}

/// JSON form of a transfer, stored compressed under `RESULT`.
pub fn transfer_payload(ev: &TransferEvent) -> serde_json::Value {
    let mut payload = json!({
        "blockNumber": ev.block_number,
        "txIndex": ev.tx_index,
        "logIndex": ev.log_index,
        "paramIndex": ev.param_index,
        "txHash": ev.tx_hash,
        "tokenType": ev.token_type.label(),
        "transferType": ev.transfer_type.method(),
        "contractAddress": address_key(&ev.contract_address),
        "from": address_key(&ev.from),
        "to": address_key(&ev.to),
        "amount": ev.value.amount().to_string(),
        "timestamp": ev.timestamp,
    });
    if let Some(id) = ev.value.token_id() {
        payload["tokenId"] = json!(id.to_string());
    }
    if let Some(name) = &ev.token_name {
        payload["tokenName"] = json!(name);
    }
    payload
}

/// Shape a transfer into its storage item.
pub fn transfer_item(ev: &TransferEvent, chain: &str) -> Result<Item, SyncError> {
    let (sk, gs1sk) = transfer_sort_keys(ev);
    let contract = address_key(&ev.contract_address);
    Ok(Item::new(ev.block_number.to_string(), sk.clone())
        .with("GS1PK", ev.tx_hash.as_str())
        .with("GS1SK", gs1sk)
        .with("GS2PK", address_key(&ev.from))
        .with("GS2SK", sk.as_str())
        .with("GS3PK", address_key(&ev.to))
        .with("GS3SK", sk.as_str())
        .with("GS4PK", contract.as_str())
        .with("GS4SK", sk.as_str())
        .with("RESULT", compress_json(&transfer_payload(ev))?)
        .with("CHAIN", chain)
        .with("METHOD", ev.transfer_type.method())
        .with("TIMESTAMP", ev.timestamp)
        .with_opt("NAME", ev.token_name.clone())
        .with("TYPE", ev.token_type.label())
        .with("AMOUNT", ev.value.amount().to_string())
        .with("TOKEN_ADDRESS", contract)
        .with_opt("NFTID", ev.value.token_id().map(|id| id.to_string())))
}

/// Shape a block header into its storage item.
pub fn block_item(block: &BlockRecord, chain: &str) -> Result<Item, SyncError> {
    let mut raw = block.raw.clone();
    if let Some(obj) = raw.as_object_mut() {
        obj.insert("transactionsTotal".into(), json!(block.tx_count));
    }
    let sk = format!("BLOCK#{}", block.number);
    Ok(Item::new(block.number.to_string(), sk.clone())
        .with("GS1PK", block.hash.as_str())
        .with("GS1SK", "BLOCK")
        .with("GS2PK", block.miner.as_str())
        .with("GS2SK", sk)
        .with("RESULT", compress_json(&raw)?)
        .with("TIMESTAMP", block.timestamp)
        .with("TOTALTX", block.tx_count as i64)
        .with("CHAIN", chain))
}

/// Shape a transaction into its storage item.
pub fn transaction_item(tx: &TransactionRecord, chain: &str) -> Result<Item, SyncError> {
    let n = tx.block_number;
    Ok(
        Item::new(n.to_string(), format!("TX#{n}#{}", pad(tx.tx_index)))
            .with("GS1PK", tx.hash.as_str())
            .with("GS1SK", "TX")
            .with("GS2PK", tx.from.as_str())
            .with("GS2SK", format!("TX#{n}#{}", tx.nonce))
            .with("GS3PK", tx.to.clone().unwrap_or_default())
            .with("GS3SK", format!("TX#{n}#{}", tx.tx_index))
            .with("RESULT", compress_json(&tx.raw)?)
            .with("TIMESTAMP", tx.timestamp)
            .with("CHAIN", chain),
    )
}

/// Shape token metadata into its storage item.
pub fn token_item(meta: &TokenMetadata, chain: &str) -> Item {
    let contract = address_key(&meta.contract_address);
    Item::new(
        contract.clone(),
        format!("TOKEN#{}#{contract}", meta.token_type.label()),
    )
    .with("TIMESTAMP", meta.fetched_at)
    .with_opt("NAME", meta.name.clone())
    .with_opt("SYMBOL", meta.symbol.clone())
    .with_opt("DECIMAL", meta.decimals.map(i64::from))
    .with_opt("TOTAL_SUPPLY", meta.total_supply.map(|s| s.to_string()))
    .with("TYPE", meta.token_type.label())
    .with("CHAIN", chain)
}

/// The resume watermark item.
pub fn watermark_item(block_number: u64, chain: &str) -> Item {
    Item::new(WATERMARK_KEY, WATERMARK_KEY)
        .with("RESULT", block_number as i64)
        .with("CHAIN", chain)
}

/// Snapshot of the council staking info.
pub fn council_item(
    info: &serde_json::Value,
    timestamp: i64,
    chain: &str,
) -> Result<Item, SyncError> {
    Ok(Item::new(COUNCIL_KEY, COUNCIL_KEY)
        .with("RESULT", compress_json(info)?)
        .with("TIMESTAMP", timestamp)
        .with("CHAIN", chain))
}
