//! 钱包能力对象
//!
//! 钱包只暴露 `{地址, 对摘要签名}` 两个能力，私钥不离开本模块。
//! 地址由未压缩公钥（去掉 0x04 前缀）的 Keccak-256 后 20 字节派生。

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::error::{CoreError, Result};
use crate::utils::hash::prepare_prefixed_hash;

/// 20 字节账户地址
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    /// 零地址，注册表中"未发布"的哨兵值
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != 20 {
            return Err(CoreError::InvalidAddress(format!(
                "expected 20 bytes, got {}",
                slice.len()
            )));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// EIP-55 混合大小写校验和格式
    ///
    /// 小写十六进制字符串的 Keccak-256 逐 nibble 决定字母大小写。
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = (hash[i / 2] >> (4 * (1 - i % 2))) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let stripped = s.trim().trim_start_matches("0x");
        if stripped.len() != 40 {
            return Err(CoreError::InvalidAddress(format!(
                "expected 40 hex chars, got {}",
                stripped.len()
            )));
        }
        let bytes = hex::decode(stripped.to_lowercase())
            .map_err(|e| CoreError::InvalidAddress(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 可恢复的 ECDSA 签名（r, s, recovery_id）
#[derive(Debug, Clone, Copy)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

/// 签名钱包
///
/// 外部供给（密钥派生、助记词均不在本 crate 范围内），这里只从原始
/// 私钥构造，并独占签名能力。
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// 从 32 字节十六进制私钥构造（0x 前缀可选）
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let stripped = private_key.trim().trim_start_matches("0x");
        let bytes =
            hex::decode(stripped).map_err(|e| CoreError::Signing(format!("invalid key hex: {}", e)))?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| CoreError::Signing(format!("invalid private key: {}", e)))?;
        let address = address_from_verifying_key(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// 生成随机钱包（仅测试环境使用）
    #[cfg(any(test, feature = "dev-tools"))]
    pub fn random() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let address = address_from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// 对 32 字节摘要做可恢复签名
    pub fn sign_hash(&self, digest: &[u8; 32]) -> Result<RecoverableSignature> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|e| CoreError::Signing(e.to_string()))?;
        Ok(split_signature(&signature, recovery_id))
    }

    /// 对任意消息做 personal-sign：先加前缀哈希，再签名
    pub fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature> {
        self.sign_hash(&prepare_prefixed_hash(message))
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 不打印密钥
        write!(f, "Wallet({})", self.address.to_checksum())
    }
}

fn split_signature(signature: &Signature, recovery_id: RecoveryId) -> RecoverableSignature {
    let bytes = signature.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);
    RecoverableSignature {
        r,
        s,
        recovery_id: recovery_id.to_byte(),
    }
}

fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // 跳过第一个字节 0x04
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::from_bytes(bytes)
}

/// 从摘要与可恢复签名还原签名者地址
pub fn recover_address(digest: &[u8; 32], sig: &RecoverableSignature) -> Result<Address> {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&sig.r);
    bytes[32..].copy_from_slice(&sig.s);
    let signature = Signature::from_bytes(&bytes.into())
        .map_err(|e| CoreError::Signing(format!("invalid signature: {}", e)))?;
    let recovery_id = RecoveryId::from_byte(sig.recovery_id)
        .ok_or_else(|| CoreError::Signing(format!("invalid recovery id {}", sig.recovery_id)))?;
    let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
        .map_err(|e| CoreError::Signing(format!("recover failed: {}", e)))?;
    Ok(address_from_verifying_key(&key))
}
