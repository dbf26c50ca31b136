//! didcore - 账户制账本的 DID 文档客户端
//!
//! 覆盖从文档签名、交易构建到注册表事件回放的完整客户端闭环：
//! 链上只存事件，文档历史从日志回放。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use error::{CoreError, Result};

// 统一模块导出
pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{Ddo, Did, Wallet},
        error::{CoreError, Result},
        service::{ChainClient, DdoRegistry, NonceManager, TransactionBuilder},
    };
}
