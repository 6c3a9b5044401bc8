//! ABI helpers: selectors, topic hashes and call encoding/decoding.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, B256, U256};
use tiny_keccak::{Hasher, Keccak};

// ─── Event topics ────────────────────────────────────────────────────────────

/// `Transfer(address,address,uint256)` (ERC-20 and ERC-721).
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// `TransferSingle(address,address,address,uint256,uint256)`
pub const TRANSFER_SINGLE_TOPIC: &str =
    "0xc3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62";

/// `TransferBatch(address,address,address,uint256[],uint256[])`
pub const TRANSFER_BATCH_TOPIC: &str =
    "0x4a39dc06d4c0dbc64b70af90fd698a233a518aa5d07e595d983b8c0526c8f7fb";

/// Every topic-0 the transfer stage subscribes to.
pub const TRANSFER_TOPICS: [&str; 3] = [TRANSFER_TOPIC, TRANSFER_SINGLE_TOPIC, TRANSFER_BATCH_TOPIC];

// ─── Interface ids ───────────────────────────────────────────────────────────

pub const KIP37_INTERFACE_ID: [u8; 4] = [0x64, 0x33, 0xca, 0x1f];
pub const ERC1155_INTERFACE_ID: [u8; 4] = [0xd9, 0xb6, 0x7a, 0x26];
pub const ERC721_INTERFACE_ID: [u8; 4] = [0x80, 0xac, 0x58, 0xcd];

/// Functions whose selectors must all appear in an ERC-20 contract's code.
pub const ERC20_FUNCTIONS: [&str; 6] = [
    "balanceOf(address)",
    "totalSupply()",
    "allowance(address,address)",
    "transfer(address,uint256)",
    "transferFrom(address,address,uint256)",
    "approve(address,uint256)",
];

#[derive(Debug, thiserror::Error)]
#[error("ABI decode failed: {0}")]
pub struct AbiError(pub String);

/// keccak256 of an arbitrary byte string.
pub fn keccak256(data: &[u8]) -> B256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    B256::from(output)
}

/// Topic hash of a canonical event signature.
pub fn topic_hash(signature: &str) -> String {
    format!("{:#x}", keccak256(signature.as_bytes()))
}

/// 4-byte function selector of a canonical function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// `selector ++ abi_encode(args)`
pub fn encode_call(signature: &str, args: Vec<DynSolValue>) -> Vec<u8> {
    let mut calldata = selector(signature).to_vec();
    if !args.is_empty() {
        calldata.extend(DynSolValue::Tuple(args).abi_encode());
    }
    calldata
}

/// Calldata for `supportsInterface(bytes4)`.
pub fn supports_interface_call(interface_id: [u8; 4]) -> Vec<u8> {
    let mut word = B256::ZERO;
    word[..4].copy_from_slice(&interface_id);
    encode_call(
        "supportsInterface(bytes4)",
        vec![DynSolValue::FixedBytes(word, 4)],
    )
}

/// Calldata for `balanceOf(address)`.
pub fn balance_of_call(owner: Address) -> Vec<u8> {
    encode_call("balanceOf(address)", vec![DynSolValue::Address(owner)])
}

fn decode_single(ty: DynSolType, data: &[u8]) -> Result<DynSolValue, AbiError> {
    let decoded = DynSolType::Tuple(vec![ty])
        .abi_decode_params(data)
        .map_err(|e| AbiError(e.to_string()))?;
    match decoded {
        DynSolValue::Tuple(mut vals) if vals.len() == 1 => Ok(vals.remove(0)),
        other => Ok(other),
    }
}

pub fn decode_bool(data: &[u8]) -> Result<bool, AbiError> {
    decode_single(DynSolType::Bool, data)?
        .as_bool()
        .ok_or_else(|| AbiError("expected bool".into()))
}

pub fn decode_uint(data: &[u8]) -> Result<U256, AbiError> {
    decode_single(DynSolType::Uint(256), data)?
        .as_uint()
        .map(|(v, _)| v)
        .ok_or_else(|| AbiError("expected uint".into()))
}

/// Decode a `uint8` return value.
pub fn decode_u8(data: &[u8]) -> Result<u8, AbiError> {
    let v = decode_uint(data)?;
    if v > U256::from(u8::MAX) {
        return Err(AbiError(format!("value {v} does not fit uint8")));
    }
    Ok(v.as_limbs()[0] as u8)
}

/// Decode a `string` return value.
///
/// Some early tokens return `bytes32` for `name()`/`symbol()`; a single
/// 32-byte word is accepted as a NUL-padded string. An ABI `string`
/// return is at least two words, so the two shapes never overlap.
pub fn decode_string(data: &[u8]) -> Result<String, AbiError> {
    if data.len() == 32 {
        let end = data.iter().position(|b| *b == 0).unwrap_or(32);
        return Ok(String::from_utf8_lossy(&data[..end]).into_owned());
    }
    decode_single(DynSolType::String, data)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AbiError(format!("expected string, got {} bytes", data.len())))
}

/// `true` if `code` contains `sel` at any byte offset.
pub fn code_contains_selector(code: &[u8], sel: [u8; 4]) -> bool {
    code.windows(4).any(|w| w == sel)
}
