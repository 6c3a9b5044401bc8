//! Typed node client.
//!
//! Wraps an `RpcTransport` with the handful of methods the sync pipeline
//! calls, plus the raw payload types they return.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::request::JsonRpcRequest;
use crate::transport::RpcTransport;

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "transactionIndex")]
    pub tx_index: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(rename = "blockHash", default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
}

/// A transaction inside a full block.
///
/// `raw` keeps the node's object as-is for storage.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub tx_index: u32,
    pub nonce: u64,
    pub raw: Value,
}

/// A block fetched with full transaction objects.
#[derive(Debug, Clone)]
pub struct RawBlock {
    pub number: u64,
    pub hash: String,
    pub miner: String,
    pub timestamp: i64,
    pub transactions: Vec<RawTransaction>,
    pub raw: Value,
}

/// The fields of a receipt the pipeline reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionReceipt {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(rename = "contractAddress", default)]
    pub contract_address: Option<String>,
}

impl TransactionReceipt {
    /// Effective recipient: `to`, or the created contract.
    pub fn recipient(&self) -> Option<String> {
        self.to.clone().or_else(|| self.contract_address.clone())
    }
}

/// Parse a hex quantity (with or without `0x`).
pub fn parse_quantity(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

/// Hex quantity form of `n`, as nodes expect in params.
pub fn quantity(n: u64) -> String {
    format!("{n:#x}")
}

fn str_field<'a>(v: &'a Value, key: &str) -> Result<&'a str, TransportError> {
    v.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::Malformed(format!("missing string field `{key}`")))
}

fn quantity_field(v: &Value, key: &str) -> Result<u64, TransportError> {
    let s = str_field(v, key)?;
    parse_quantity(s)
        .ok_or_else(|| TransportError::Malformed(format!("field `{key}` is not a quantity: {s}")))
}

impl RawTransaction {
    pub fn from_json(v: &Value) -> Result<Self, TransportError> {
        Ok(Self {
            hash: str_field(v, "hash")?.to_string(),
            from: str_field(v, "from")?.to_lowercase(),
            to: v.get("to").and_then(Value::as_str).map(str::to_lowercase),
            tx_index: quantity_field(v, "transactionIndex")? as u32,
            nonce: quantity_field(v, "nonce")?,
            raw: v.clone(),
        })
    }
}

impl RawBlock {
    /// Parse a full block object.
    ///
    /// Kaia nodes report the block producer as `proposer`; it is read when
    /// `miner` is absent.
    pub fn from_json(v: &Value) -> Result<Self, TransportError> {
        let miner = v
            .get("miner")
            .or_else(|| v.get("proposer"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let transactions = match v.get("transactions").and_then(Value::as_array) {
            Some(txs) => txs
                .iter()
                .map(RawTransaction::from_json)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            number: quantity_field(v, "number")?,
            hash: str_field(v, "hash")?.to_string(),
            miner,
            timestamp: quantity_field(v, "timestamp")? as i64,
            transactions,
            raw: v.clone(),
        })
    }
}

/// Typed access to the node.
#[derive(Clone)]
pub struct NodeClient {
    transport: Arc<dyn RpcTransport>,
    next_id: Arc<AtomicU64>,
}

impl NodeClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Call a method and deserialize the result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .transport
            .send(JsonRpcRequest::new(id, method, params))
            .await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        Ok(serde_json::from_value(result)?)
    }

    /// `eth_blockNumber`
    pub async fn block_number(&self) -> Result<u64, TransportError> {
        let hex: String = self.call("eth_blockNumber", vec![]).await?;
        parse_quantity(&hex)
            .ok_or_else(|| TransportError::Malformed(format!("block number: {hex}")))
    }

    /// Fetch a block through `method` (`eth_getBlockByNumber` or a
    /// chain-specific equivalent). `None` when the block does not exist yet.
    pub async fn get_block(
        &self,
        method: &str,
        number: u64,
        full_transactions: bool,
    ) -> Result<Option<RawBlock>, TransportError> {
        let v: Value = self
            .call(method, vec![json!(quantity(number)), json!(full_transactions)])
            .await?;
        if v.is_null() {
            return Ok(None);
        }
        RawBlock::from_json(&v).map(Some)
    }

    /// Timestamp (seconds) of a block, fetched through `method` without its
    /// transactions.
    pub async fn block_timestamp(
        &self,
        method: &str,
        number: u64,
    ) -> Result<Option<i64>, TransportError> {
        let v: Value = self
            .call(method, vec![json!(quantity(number)), json!(false)])
            .await?;
        if v.is_null() {
            return Ok(None);
        }
        Ok(Some(quantity_field(&v, "timestamp")? as i64))
    }

    /// `eth_getTransactionReceipt`
    pub async fn get_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, TransportError> {
        self.call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await
    }

    /// `eth_getLogs` for one block, matching any of `topic0s` in position 0.
    pub async fn get_logs(
        &self,
        block: u64,
        topic0s: &[&str],
    ) -> Result<Vec<RawLog>, TransportError> {
        let filter = json!({
            "fromBlock": quantity(block),
            "toBlock": quantity(block),
            "topics": [topic0s],
        });
        self.call("eth_getLogs", vec![filter]).await
    }

    /// Read-only `eth_call` against the latest state.
    pub async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let hex: String = self
            .call(
                "eth_call",
                vec![
                    json!({ "to": to, "data": format!("0x{}", hex::encode(data)) }),
                    json!("latest"),
                ],
            )
            .await?;
        decode_hex(&hex)
    }

    /// `eth_getCode` at the latest state.
    pub async fn get_code(&self, address: &str) -> Result<Vec<u8>, TransportError> {
        let hex: String = self
            .call("eth_getCode", vec![json!(address), json!("latest")])
            .await?;
        decode_hex(&hex)
    }

    /// `kaia_getStakingInfo` at the latest block.
    pub async fn staking_info(&self) -> Result<Value, TransportError> {
        self.call("kaia_getStakingInfo", vec![json!("latest")]).await
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, TransportError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| TransportError::Malformed(format!("invalid hex payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn client(mock: Arc<MockTransport>) -> NodeClient {
        NodeClient::new(mock)
    }

    #[test]
    fn parse_quantity_basic() {
        assert_eq!(parse_quantity("0x1"), Some(1));
        assert_eq!(parse_quantity("0xff"), Some(255));
        assert_eq!(parse_quantity("1234"), Some(0x1234));
        assert_eq!(parse_quantity("0x"), None);
        assert_eq!(parse_quantity("0xzz"), None);
    }

    #[test]
    fn raw_log_deserializes() {
        let log: RawLog = serde_json::from_value(json!({
            "address": "0xabc",
            "topics": ["0x01"],
            "data": "0x",
            "blockNumber": "0x12a05f200",
            "transactionHash": "0xdead",
            "transactionIndex": "0x3",
            "logIndex": "0x5",
            "blockHash": "0xbeef",
            "removed": false
        }))
        .unwrap();
        assert_eq!(parse_quantity(&log.block_number), Some(5_000_000_000));
        assert_eq!(parse_quantity(&log.log_index), Some(5));
    }

    #[test]
    fn block_parses_proposer_and_transactions() {
        let block = RawBlock::from_json(&json!({
            "number": "0x64",
            "hash": "0xh",
            "proposer": "0xABCD",
            "timestamp": "0x65",
            "transactions": [{
                "hash": "0xt1",
                "from": "0xF00",
                "to": null,
                "transactionIndex": "0x0",
                "nonce": "0x2"
            }]
        }))
        .unwrap();
        assert_eq!(block.number, 100);
        assert_eq!(block.miner, "0xabcd");
        assert_eq!(block.timestamp, 101);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].from, "0xf00");
        assert!(block.transactions[0].to.is_none());
    }

    #[tokio::test]
    async fn get_logs_sends_single_block_filter() {
        let mock = Arc::new(MockTransport::new());
        mock.on("eth_getLogs", json!([]));
        let node = client(mock.clone());

        let logs = node.get_logs(16, &["0xaa", "0xbb"]).await.unwrap();
        assert!(logs.is_empty());

        let params = mock.params("eth_getLogs");
        assert_eq!(params[0][0]["fromBlock"], "0x10");
        assert_eq!(params[0][0]["toBlock"], "0x10");
        assert_eq!(params[0][0]["topics"], json!([["0xaa", "0xbb"]]));
    }

    #[tokio::test]
    async fn unknown_block_is_none() {
        let mock = Arc::new(MockTransport::new());
        mock.on("eth_getBlockByNumber", Value::Null);
        let node = client(mock);
        assert!(node.get_block("eth_getBlockByNumber", 5, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eth_call_decodes_hex() {
        let mock = Arc::new(MockTransport::new());
        mock.on("eth_call", json!("0x0102"));
        let node = client(mock);
        assert_eq!(node.eth_call("0xabc", &[0x06, 0xfd]).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn receipt_recipient_falls_back_to_contract() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            "eth_getTransactionReceipt",
            json!({"to": null, "contractAddress": "0xc0ffee"}),
        );
        let node = client(mock);
        let receipt = node.get_receipt("0xt").await.unwrap().unwrap();
        assert_eq!(receipt.recipient().as_deref(), Some("0xc0ffee"));
    }
}
