//! 领域模型：钱包能力、交易、DID 文档

pub mod ddo;
pub mod transaction;
pub mod wallet;

pub use ddo::{Ddo, Did, Proof, Service};
pub use transaction::{SignedTransaction, TransactionRequest, TransactionStatus};
pub use wallet::{recover_address, Address, RecoverableSignature, Wallet};
