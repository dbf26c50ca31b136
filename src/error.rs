//! 统一错误定义
//! 客户端参数错误在任何网络调用前快速失败；链上回滚只有在一次完整的
//! 提交往返之后才能被观察到

use std::time::Duration;

use thiserror::Error;

/// 核心错误分类
#[derive(Debug, Error)]
pub enum CoreError {
    /// 调用方参数错误（类型与值数量不一致等），不触发任何网络请求
    #[error("argument mismatch: {0}")]
    ArgumentMismatch(String),

    /// 节点拒绝交易，或交易在链上回滚
    #[error("transaction submission failed: {0}")]
    Submission(String),

    /// 链上所有权检查失败（交易回滚且无事件产生）
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// 在配置的时间窗口内未观察到交易回执
    #[error("no receipt within {0:?}")]
    Timeout(Duration),

    /// replace-by-nonce 目标 nonce 已被最终确认
    #[error("nonce too low: {0}")]
    NonceTooLow(String),

    /// JSON-RPC 层错误
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("signing failed: {0}")]
    Signing(String),

    /// 压缩、序列化或 ABI 编解码失败
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<hex::FromHexError> for CoreError {
    fn from(err: hex::FromHexError) -> Self {
        Self::Codec(format!("invalid hex: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
