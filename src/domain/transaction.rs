//! 交易模型与统一交易状态定义

use serde::{Deserialize, Serialize};

use crate::domain::wallet::Address;

/// 待签名的交易请求
///
/// 签名前所有字段必须确定：nonce 由调用侧的 nonce 管理器分配，
/// chain_id 来自链配置，签名会将其嵌入 recovery 值完成重放保护。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// 接收地址
    pub to: Address,
    /// 金额（wei）
    pub value: u128,
    /// 发送方账户 nonce
    pub nonce: u64,
    /// Gas 价格（wei）
    pub gas_price: u128,
    /// Gas 上限
    pub gas_limit: u64,
    /// 合约调用数据，普通转账为空
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
    /// 链标识
    pub chain_id: u64,
}

/// 已签名的交易
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    /// RLP 编码后的完整交易字节
    pub raw: Vec<u8>,
    /// 交易哈希（签名后字节的 Keccak-256）
    pub hash: [u8; 32],
    /// recovery 值，v = chain_id * 2 + 35 + recovery_id
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl SignedTransaction {
    /// 0x 前缀的原始交易十六进制，提交 RPC 用
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    /// 0x 前缀的交易哈希
    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash))
    }
}

/// 统一交易状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// 交易已广播到节点，等待上链
    Pending,

    /// 交易已确认
    Confirmed,

    /// 交易失败（链上执行失败或revert）
    Failed,

    /// 交易超时（长时间未确认）
    Timeout,

    /// 交易被替换（被更高 gas 的交易替换）
    Replaced,
}

impl TransactionStatus {
    /// 获取状态描述
    pub fn description(&self) -> &'static str {
        match self {
            Self::Pending => "交易待确认",
            Self::Confirmed => "交易已确认",
            Self::Failed => "交易失败",
            Self::Timeout => "交易超时",
            Self::Replaced => "交易已替换",
        }
    }

    /// 是否为最终状态（不可再转换）
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Timeout | Self::Replaced)
    }
}
