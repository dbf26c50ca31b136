//! 多值哈希与签名消息哈希
//!
//! 提供 Solidity 紧凑编码（tight-packed）的 Keccak-256 多值哈希，以及
//! 标准 personal-sign 前缀哈希。链上验签会独立重算这两种摘要，
//! 因此输出必须与节点原生实现逐位一致。

use sha3::{Digest, Keccak256};

use crate::error::{CoreError, Result};

/// personal-sign 消息前缀（后接消息字节数的十进制表示）
const SIGNED_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Solidity 类型标签，用于紧凑编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolidityType {
    Address,
    Uint256,
    Bytes32,
    Bytes,
    String,
    Bool,
}

/// 与类型标签对应的值
#[derive(Debug, Clone, PartialEq)]
pub enum SolidityValue {
    Address([u8; 20]),
    Uint256(u128),
    Bytes32([u8; 32]),
    Bytes(Vec<u8>),
    String(String),
    Bool(bool),
}

/// Keccak-256
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// 按 Solidity 紧凑编码规则拼接多个值并做 Keccak-256
///
/// 类型与值数量不一致时返回 `ArgumentMismatch`，不做任何其他处理。
pub fn generate_multi_value_hash(
    types: &[SolidityType],
    values: &[SolidityValue],
) -> Result<[u8; 32]> {
    if types.len() != values.len() {
        return Err(CoreError::ArgumentMismatch(format!(
            "{} types, {} values",
            types.len(),
            values.len()
        )));
    }

    let mut packed = Vec::new();
    for (ty, value) in types.iter().zip(values.iter()) {
        pack_value(*ty, value, &mut packed)?;
    }

    Ok(keccak256(&packed))
}

/// 紧凑编码单个值
///
/// address 占 20 字节，uint256/bytes32 占 32 字节，bool 占 1 字节，
/// bytes/string 按原始长度拼入（无长度前缀，无填充）。
fn pack_value(ty: SolidityType, value: &SolidityValue, out: &mut Vec<u8>) -> Result<()> {
    match (ty, value) {
        (SolidityType::Address, SolidityValue::Address(addr)) => out.extend_from_slice(addr),
        (SolidityType::Uint256, SolidityValue::Uint256(n)) => {
            let mut buf = [0u8; 32];
            buf[16..].copy_from_slice(&n.to_be_bytes());
            out.extend_from_slice(&buf);
        }
        (SolidityType::Bytes32, SolidityValue::Bytes32(b)) => out.extend_from_slice(b),
        (SolidityType::Bytes, SolidityValue::Bytes(b)) => out.extend_from_slice(b),
        (SolidityType::String, SolidityValue::String(s)) => out.extend_from_slice(s.as_bytes()),
        (SolidityType::Bool, SolidityValue::Bool(b)) => out.push(u8::from(*b)),
        (ty, value) => {
            return Err(CoreError::ArgumentMismatch(format!(
                "type {:?} does not accept value {:?}",
                ty, value
            )))
        }
    }
    Ok(())
}

/// 计算 personal-sign 前缀哈希
///
/// `keccak256("\x19Ethereum Signed Message:\n" + len(message) + message)`，
/// 其中长度为十进制字符串。纯函数，相同输入恒定输出。
pub fn prepare_prefixed_hash(message: &[u8]) -> [u8; 32] {
    let mut buf =
        Vec::with_capacity(SIGNED_MESSAGE_PREFIX.len() + 20 + message.len());
    buf.extend_from_slice(SIGNED_MESSAGE_PREFIX.as_bytes());
    buf.extend_from_slice(message.len().to_string().as_bytes());
    buf.extend_from_slice(message);
    keccak256(&buf)
}

/// 函数选择器：签名哈希的前 4 字节
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// 事件主题：事件签名的完整 Keccak-256
pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}
