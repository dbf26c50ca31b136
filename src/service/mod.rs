//! 服务层：链 RPC、交易生命周期、nonce 管理与注册表客户端

pub mod chain_client;
pub mod ddo_registry;
pub mod nonce_manager;
pub mod transaction_builder;

pub use chain_client::{BlockTag, ChainClient, LogEntry, TransactionInfo, TransactionReceipt};
pub use ddo_registry::{DdoEvent, DdoRegistry, RegistryEvent};
pub use nonce_manager::NonceManager;
pub use transaction_builder::{build_and_sign, embedded_chain_id, TransactionBuilder};
