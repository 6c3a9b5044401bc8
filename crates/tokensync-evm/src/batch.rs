//! Decoder for `TransferBatch` data.
//!
//! The data is the ABI encoding of `(uint256[] ids, uint256[] values)`:
//!
//! ```text
//! word 0        offset of ids      (ignored)
//! word 1        offset of values   (ignored)
//! word 2        N = ids.length
//! word 3..3+N   ids
//! word 3+N      M = values.length  (must equal N)
//! word 4+N..    values
//! ```

use alloy_primitives::U256;

use crate::decoder::DecodeError;

/// One element of a batch transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchItem {
    pub param_index: u32,
    pub token_id: U256,
    pub amount: U256,
}

/// Split `data` into 32-byte words. Trailing partial words are malformed.
pub fn words(data: &[u8]) -> Result<Vec<U256>, DecodeError> {
    if data.len() % 32 != 0 {
        return Err(DecodeError::Malformed {
            reason: format!("data length {} is not a multiple of 32", data.len()),
        });
    }
    Ok(data.chunks_exact(32).map(U256::from_be_slice).collect())
}

/// Array length as `usize` when it is small enough to index with.
fn as_len(v: U256) -> Option<usize> {
    if v.bit_len() <= 32 {
        Some(v.as_limbs()[0] as usize)
    } else {
        None
    }
}

/// Decode the id/value arrays of a batch transfer.
pub fn decode_batch(data: &[u8]) -> Result<Vec<BatchItem>, DecodeError> {
    let words = words(data)?;
    let truncated = |what: &str| DecodeError::Malformed {
        reason: format!("batch data truncated before {what} ({} words)", words.len()),
    };

    let n_word = *words.get(2).ok_or_else(|| truncated("id length"))?;
    let n = as_len(n_word)
        .filter(|n| 3 + n < words.len())
        .ok_or_else(|| truncated("amount length"))?;

    let m_word = words[3 + n];
    if m_word != n_word {
        return Err(DecodeError::BatchLengthMismatch {
            ids: n,
            amounts: as_len(m_word).unwrap_or(usize::MAX),
        });
    }
    if words.len() < 4 + 2 * n {
        return Err(truncated("amounts"));
    }

    let ids = &words[3..3 + n];
    let amounts = &words[4 + n..4 + 2 * n];
    Ok(ids
        .iter()
        .zip(amounts)
        .enumerate()
        .map(|(i, (id, amount))| BatchItem {
            param_index: i as u32,
            token_id: *id,
            amount: *amount,
        })
        .collect())
}
