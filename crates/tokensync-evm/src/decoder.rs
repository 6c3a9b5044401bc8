//! Raw log → `TransferEvent` decoding.
//!
//! Pure and synchronous. The caller supplies everything that needs I/O
//! (token type, name, block timestamp) through a [`LogContext`].

use alloy_primitives::{Address, U256};
use tokensync_core::{TokenType, TransferEvent, TransferType, TransferValue};
use tokensync_rpc::{parse_quantity, RawLog};

use crate::abi::{TRANSFER_BATCH_TOPIC, TRANSFER_SINGLE_TOPIC, TRANSFER_TOPIC, TRANSFER_TOPICS};
use crate::batch::{decode_batch, words};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported {event} log shape: {topics} topics")]
    UnsupportedLogShape { event: &'static str, topics: usize },

    #[error("unsupported topic {topic}")]
    UnsupportedTopic { topic: String },

    #[error("batch length mismatch: {ids} ids, {amounts} amounts")]
    BatchLengthMismatch { ids: usize, amounts: usize },

    #[error("malformed log: {reason}")]
    Malformed { reason: String },
}

impl DecodeError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed { reason: reason.into() }
    }
}

/// Per-log facts resolved outside the decoder.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub token_type: TokenType,
    pub token_name: Option<String>,
    /// Owning block's timestamp (seconds).
    pub timestamp: i64,
}

/// Decode one log into zero or more transfer events.
///
/// A `TransferBatch` log yields one event per id; every other supported log
/// yields exactly one.
pub fn decode_log(log: &RawLog, ctx: &LogContext) -> Result<Vec<TransferEvent>, DecodeError> {
    let topic0 = log
        .topics
        .first()
        .ok_or_else(|| DecodeError::malformed("log has no topics"))?
        .to_lowercase();
    if !TRANSFER_TOPICS.contains(&topic0.as_str()) {
        return Err(DecodeError::UnsupportedTopic { topic: topic0 });
    }
    let header = Header::parse(log, ctx)?;
    let data = hex_bytes(&log.data)?;
    let topics = log.topics.len();

    match topic0.as_str() {
        TRANSFER_TOPIC => {
            let (from, to, value) = match topics {
                4 => (
                    topic_address(&log.topics[1])?,
                    topic_address(&log.topics[2])?,
                    TransferValue::NonFungible {
                        token_id: topic_word(&log.topics[3])?,
                        amount: U256::from(1u64),
                    },
                ),
                3 => {
                    // Some tokens emit an empty data field for unit transfers.
                    let amount = if data.is_empty() {
                        U256::from(1u64)
                    } else {
                        U256::try_from_be_slice(&data).ok_or_else(|| {
                            DecodeError::malformed(format!("{}-byte amount", data.len()))
                        })?
                    };
                    (
                        topic_address(&log.topics[1])?,
                        topic_address(&log.topics[2])?,
                        TransferValue::Fungible { amount },
                    )
                }
                1 => {
                    let w = words(&data)?;
                    if w.len() < 3 {
                        return Err(DecodeError::malformed(format!(
                            "unindexed Transfer needs 3 words, got {}",
                            w.len()
                        )));
                    }
                    (
                        word_address(w[0]),
                        word_address(w[1]),
                        TransferValue::Fungible { amount: w[2] },
                    )
                }
                n => {
                    return Err(DecodeError::UnsupportedLogShape { event: "Transfer", topics: n })
                }
            };
            Ok(vec![header.event(TransferType::Single, from, to, value, 0)])
        }

        TRANSFER_SINGLE_TOPIC => {
            if topics != 4 {
                return Err(DecodeError::UnsupportedLogShape {
                    event: "TransferSingle",
                    topics,
                });
            }
            let w = words(&data)?;
            if w.len() < 2 {
                return Err(DecodeError::malformed(format!(
                    "TransferSingle needs 2 words, got {}",
                    w.len()
                )));
            }
            let value = TransferValue::NonFungible {
                token_id: w[0],
                amount: w[1],
            };
            Ok(vec![header.event(
                TransferType::BatchSingle,
                topic_address(&log.topics[2])?,
                topic_address(&log.topics[3])?,
                value,
                0,
            )])
        }

        TRANSFER_BATCH_TOPIC => {
            if topics != 4 {
                return Err(DecodeError::UnsupportedLogShape {
                    event: "TransferBatch",
                    topics,
                });
            }
            let from = topic_address(&log.topics[2])?;
            let to = topic_address(&log.topics[3])?;
            Ok(decode_batch(&data)?
                .into_iter()
                .map(|item| {
                    let value = TransferValue::NonFungible {
                        token_id: item.token_id,
                        amount: item.amount,
                    };
                    header.event(TransferType::BatchMulti, from, to, value, item.param_index)
                })
                .collect())
        }

        _ => Err(DecodeError::UnsupportedTopic { topic: topic0 }),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Fields every event from one log shares.
struct Header<'a> {
    block_number: u64,
    tx_index: u32,
    log_index: u32,
    tx_hash: &'a str,
    contract: Address,
    ctx: &'a LogContext,
}

impl<'a> Header<'a> {
    fn parse(log: &'a RawLog, ctx: &'a LogContext) -> Result<Self, DecodeError> {
        let qty = |field: &str, v: &str| {
            parse_quantity(v)
                .ok_or_else(|| DecodeError::malformed(format!("{field} is not a quantity: {v}")))
        };
        let index = |field: &str, v: &str| {
            u32::try_from(qty(field, v)?)
                .map_err(|_| DecodeError::malformed(format!("{field} out of range: {v}")))
        };
        Ok(Self {
            block_number: qty("blockNumber", &log.block_number)?,
            tx_index: index("transactionIndex", &log.tx_index)?,
            log_index: index("logIndex", &log.log_index)?,
            tx_hash: &log.tx_hash,
            contract: log
                .address
                .parse()
                .map_err(|e| DecodeError::malformed(format!("log address {}: {e}", log.address)))?,
            ctx,
        })
    }

    fn event(
        &self,
        transfer_type: TransferType,
        from: Address,
        to: Address,
        value: TransferValue,
        param_index: u32,
    ) -> TransferEvent {
        TransferEvent {
            block_number: self.block_number,
            tx_index: self.tx_index,
            log_index: self.log_index,
            tx_hash: self.tx_hash.to_string(),
            token_type: self.ctx.token_type,
            transfer_type,
            contract_address: self.contract,
            from,
            to,
            value,
            param_index,
            timestamp: self.ctx.timestamp,
            token_name: self.ctx.token_name.clone(),
        }
    }
}

fn hex_bytes(s: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| DecodeError::malformed(format!("invalid hex: {e}")))
}

fn topic_word(topic: &str) -> Result<U256, DecodeError> {
    let bytes = hex_bytes(topic)?;
    if bytes.len() != 32 {
        return Err(DecodeError::malformed(format!(
            "topic is {} bytes, expected 32",
            bytes.len()
        )));
    }
    Ok(U256::from_be_slice(&bytes))
}

fn topic_address(topic: &str) -> Result<Address, DecodeError> {
    topic_word(topic).map(word_address)
}

/// Low 20 bytes of a word.
fn word_address(word: U256) -> Address {
    let bytes = word.to_be_bytes::<32>();
    Address::from_slice(&bytes[12..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const FROM: &str = "0x000000000000000000000000aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const TO: &str = "0x000000000000000000000000bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const OPERATOR: &str = "0x000000000000000000000000cccccccccccccccccccccccccccccccccccccccc";

    fn word_hex(v: U256) -> String {
        hex::encode(v.to_be_bytes::<32>())
    }

    fn log(topics: &[&str], data: &str) -> RawLog {
        RawLog {
            address: "0x1111111111111111111111111111111111111111".into(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            data: data.into(),
            block_number: "0x64".into(),
            tx_hash: "0xabc".into(),
            tx_index: "0x2".into(),
            log_index: "0x7".into(),
            block_hash: None,
            removed: None,
        }
    }

    fn ctx(token_type: TokenType) -> LogContext {
        LogContext {
            token_type,
            token_name: Some("Test".into()),
            timestamp: 1_700_000_000,
        }
    }

    fn addr(hex: &str) -> Address {
        hex.parse().unwrap()
    }

    #[test]
    fn four_topic_transfer_is_unit_nft() {
        let token_id = format!("0x{}", word_hex(U256::from(42u64)));
        let events = decode_log(
            &log(&[TRANSFER_TOPIC, FROM, TO, &token_id], "0x"),
            &ctx(TokenType::Nft),
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.value.token_id(), Some(U256::from(42u64)));
        assert_eq!(ev.value.amount(), U256::from(1u64));
        assert_eq!(ev.from, addr("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
        assert_eq!(ev.to, addr("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"));
        assert_eq!(ev.transfer_type, TransferType::Single);
        assert_eq!(ev.block_number, 100);
        assert_eq!(ev.tx_index, 2);
        assert_eq!(ev.log_index, 7);
        assert_eq!(ev.timestamp, 1_700_000_000);
        assert_eq!(ev.token_name.as_deref(), Some("Test"));
    }

    #[test]
    fn three_topic_transfer_with_empty_data_is_one() {
        let events =
            decode_log(&log(&[TRANSFER_TOPIC, FROM, TO], "0x"), &ctx(TokenType::Fungible)).unwrap();
        assert_eq!(events[0].value, TransferValue::Fungible { amount: U256::from(1u64) });
    }

    #[test]
    fn three_topic_transfer_reads_amount() {
        let data = format!("0x{}", word_hex(U256::from(5_000u64)));
        let events =
            decode_log(&log(&[TRANSFER_TOPIC, FROM, TO], &data), &ctx(TokenType::Fungible)).unwrap();
        assert_eq!(events[0].value.amount(), U256::from(5_000u64));
        assert!(events[0].value.token_id().is_none());
    }

    #[test]
    fn single_topic_transfer_keeps_exact_amount() {
        let amount = U256::from(10u64).pow(U256::from(18u64));
        let data = format!(
            "0x{}{}{}",
            &FROM[2..],
            &TO[2..],
            word_hex(amount)
        );
        let events = decode_log(&log(&[TRANSFER_TOPIC], &data), &ctx(TokenType::Fungible)).unwrap();
        assert_eq!(events[0].value.amount().to_string(), "1000000000000000000");
        assert_eq!(events[0].from, addr("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
        assert_eq!(events[0].to, addr("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"));
    }

    #[test]
    fn two_topic_transfer_is_unsupported() {
        let err = decode_log(&log(&[TRANSFER_TOPIC, FROM], "0x"), &ctx(TokenType::Fungible))
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnsupportedLogShape { event: "Transfer", topics: 2 }
        );
    }

    #[test]
    fn transfer_single_reads_id_and_amount() {
        let data = format!("0x{}{}", word_hex(U256::from(9u64)), word_hex(U256::from(3u64)));
        let events = decode_log(
            &log(&[TRANSFER_SINGLE_TOPIC, OPERATOR, FROM, TO], &data),
            &ctx(TokenType::MultiTokenA),
        )
        .unwrap();
        let ev = &events[0];
        assert_eq!(ev.transfer_type, TransferType::BatchSingle);
        assert_eq!(ev.value.token_id(), Some(U256::from(9u64)));
        assert_eq!(ev.value.amount(), U256::from(3u64));
        assert_eq!(ev.from, addr("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
    }

    #[test]
    fn transfer_batch_expands_per_id() {
        let words: Vec<U256> = [0x40u64, 0xa0, 2, 7, 8, 2, 100, 200]
            .iter()
            .map(|v| U256::from(*v))
            .collect();
        let data = format!("0x{}", words.iter().map(|w| word_hex(*w)).collect::<String>());
        let events = decode_log(
            &log(&[TRANSFER_BATCH_TOPIC, OPERATOR, FROM, TO], &data),
            &ctx(TokenType::MultiTokenB),
        )
        .unwrap();
        assert_eq!(events.len(), 2);
        for (i, ev) in events.iter().enumerate() {
            assert_eq!(ev.param_index, i as u32);
            assert_eq!(ev.log_index, 7);
            assert_eq!(ev.transfer_type, TransferType::BatchMulti);
            assert_eq!(ev.to, addr("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"));
        }
        assert_eq!(events[1].value.token_id(), Some(U256::from(8u64)));
        assert_eq!(events[1].value.amount(), U256::from(200u64));
    }

    #[test]
    fn batch_length_mismatch_propagates() {
        let words: Vec<U256> = [0x40u64, 0xa0, 2, 7, 8, 1, 100]
            .iter()
            .map(|v| U256::from(*v))
            .collect();
        let data = format!("0x{}", words.iter().map(|w| word_hex(*w)).collect::<String>());
        let err = decode_log(
            &log(&[TRANSFER_BATCH_TOPIC, OPERATOR, FROM, TO], &data),
            &ctx(TokenType::MultiTokenA),
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::BatchLengthMismatch { ids: 2, amounts: 1 });
    }

    #[test]
    fn unknown_topic_is_rejected() {
        let err = decode_log(&log(&[OPERATOR], "0x"), &ctx(TokenType::Unknown)).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedTopic { .. }));

        // the topic decides before the data or header is read
        let mut bad = log(&[OPERATOR], "0xzz");
        bad.log_index = "0x".into();
        let err = decode_log(&bad, &ctx(TokenType::Unknown)).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedTopic { .. }));
    }

    #[test]
    fn oversized_index_is_malformed() {
        let mut wide = log(&[TRANSFER_TOPIC, FROM, TO], "0x");
        wide.log_index = "0x100000000".into();
        assert!(matches!(
            decode_log(&wide, &ctx(TokenType::Fungible)),
            Err(DecodeError::Malformed { .. })
        ));

        let mut wide_tx = log(&[TRANSFER_TOPIC, FROM, TO], "0x");
        wide_tx.tx_index = "0x1ffffffff".into();
        assert!(matches!(
            decode_log(&wide_tx, &ctx(TokenType::Fungible)),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn uppercase_topic_is_matched() {
        let upper = TRANSFER_TOPIC.to_uppercase().replacen("0X", "0x", 1);
        let events =
            decode_log(&log(&[&upper, FROM, TO], "0x"), &ctx(TokenType::Fungible)).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn malformed_inputs() {
        let bad_data = decode_log(&log(&[TRANSFER_TOPIC, FROM, TO], "0xzz"), &ctx(TokenType::Fungible));
        assert!(matches!(bad_data, Err(DecodeError::Malformed { .. })));

        let short_topic = decode_log(&log(&[TRANSFER_TOPIC, "0x01", TO], "0x"), &ctx(TokenType::Fungible));
        assert!(matches!(short_topic, Err(DecodeError::Malformed { .. })));

        let mut no_index = log(&[TRANSFER_TOPIC, FROM, TO], "0x");
        no_index.log_index = "0x".into();
        assert!(matches!(
            decode_log(&no_index, &ctx(TokenType::Fungible)),
            Err(DecodeError::Malformed { .. })
        ));

        let short_single = decode_log(&log(&[TRANSFER_TOPIC], "0x00"), &ctx(TokenType::Fungible));
        assert!(matches!(short_single, Err(DecodeError::Malformed { .. })));
    }
}
