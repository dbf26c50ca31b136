//! 交易构建、签名与生命周期管理
//!
//! 未签名编码格式: [nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]
//! 签名后 recovery 值 v = chain_id * 2 + 35 + recovery_id，链标识由此嵌入
//! 交易本身，跨链重放在验签阶段即被拒绝。

use std::sync::Arc;

use rlp::RlpStream;

use crate::domain::transaction::{SignedTransaction, TransactionRequest, TransactionStatus};
use crate::domain::wallet::{Address, Wallet};
use crate::error::{CoreError, Result};
use crate::service::chain_client::{BlockTag, ChainClient, TransactionInfo, TransactionReceipt};
use crate::service::nonce_manager::NonceManager;

/// 普通转账 gas 上限
pub const GAS_LIMIT_TRANSFER: u64 = 21_000;
/// 合约调用默认 gas 上限
pub const GAS_LIMIT_CONTRACT_CALL: u64 = 200_000;

/// 替换交易的 gas 价格上浮比例（百分比）
const REPLACE_GAS_BUMP_PERCENT: u128 = 25;

/// 对交易请求做 EIP-155 签名，返回可直接广播的字节
pub fn build_and_sign(wallet: &Wallet, request: &TransactionRequest) -> Result<SignedTransaction> {
    let to_bytes = request.to.as_bytes().to_vec();

    // 未签名载荷：九项列表，后三项为 chain_id 与两个零占位
    let mut unsigned = RlpStream::new();
    unsigned.begin_list(9);
    unsigned.append(&request.nonce);
    unsigned.append(&request.gas_price);
    unsigned.append(&request.gas_limit);
    unsigned.append(&to_bytes);
    unsigned.append(&request.value);
    unsigned.append(&request.data);
    unsigned.append(&request.chain_id);
    unsigned.append(&0u8);
    unsigned.append(&0u8);

    let sighash = crate::utils::hash::keccak256(&unsigned.out());
    let signature = wallet.sign_hash(&sighash)?;
    let v = request.chain_id * 2 + 35 + u64::from(signature.recovery_id);

    // 签名后载荷：占位三项换成 v, r, s，r/s 去掉前导零
    let mut signed = RlpStream::new();
    signed.begin_list(9);
    signed.append(&request.nonce);
    signed.append(&request.gas_price);
    signed.append(&request.gas_limit);
    signed.append(&to_bytes);
    signed.append(&request.value);
    signed.append(&request.data);
    signed.append(&v);
    signed.append(&trim_leading_zeros(&signature.r).to_vec());
    signed.append(&trim_leading_zeros(&signature.s).to_vec());

    let raw = signed.out().to_vec();
    let hash = crate::utils::hash::keccak256(&raw);

    Ok(SignedTransaction {
        raw,
        hash,
        v,
        r: signature.r,
        s: signature.s,
    })
}

/// 从 recovery 值还原嵌入的链标识
///
/// v = chain_id * 2 + 35 + {0, 1}，35 以下是未嵌入链标识的旧格式。
pub fn embedded_chain_id(v: u64) -> Option<u64> {
    if v < 35 {
        return None;
    }
    Some((v - 35) / 2)
}

fn trim_leading_zeros(bytes: &[u8; 32]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(31);
    &bytes[start..]
}

/// 交易生命周期管理器
///
/// 组合 RPC 客户端与 nonce 管理器，负责从构建到确认的完整闭环。
#[derive(Debug)]
pub struct TransactionBuilder {
    client: Arc<ChainClient>,
    nonces: Arc<NonceManager>,
}

impl TransactionBuilder {
    pub fn new(client: Arc<ChainClient>, nonces: Arc<NonceManager>) -> Self {
        Self { client, nonces }
    }

    pub fn client(&self) -> &ChainClient {
        &self.client
    }

    /// 普通转账：签名、广播并等待确认
    pub async fn send_value(
        &self,
        wallet: &Wallet,
        to: &Address,
        value: u128,
    ) -> Result<(String, TransactionReceipt)> {
        self.submit_and_confirm(wallet, to, value, Vec::new(), GAS_LIMIT_TRANSFER)
            .await
    }

    /// 合约调用交易：签名、广播并等待确认
    pub async fn send_contract_call(
        &self,
        wallet: &Wallet,
        to: &Address,
        data: Vec<u8>,
        gas_limit: u64,
    ) -> Result<(String, TransactionReceipt)> {
        self.submit_and_confirm(wallet, to, 0, data, gas_limit).await
    }

    async fn submit_and_confirm(
        &self,
        wallet: &Wallet,
        to: &Address,
        value: u128,
        data: Vec<u8>,
        gas_limit: u64,
    ) -> Result<(String, TransactionReceipt)> {
        let sender = wallet.address();
        let nonce = self.nonces.next_nonce(&self.client, &sender).await?;
        let gas_price = self.client.gas_price().await?;

        let request = TransactionRequest {
            to: *to,
            value,
            nonce,
            gas_price,
            gas_limit,
            data,
            chain_id: self.client.chain_id(),
        };

        let signed = build_and_sign(wallet, &request)?;

        let tx_hash = match self.client.send_raw_transaction(&signed.raw_hex()).await {
            Ok(hash) => hash,
            Err(e) => {
                // 没有广播成功，nonce 归还
                self.nonces.release(&sender, nonce).await;
                return Err(e);
            }
        };

        tracing::info!(
            tx_hash = %tx_hash,
            nonce,
            value,
            to = %to,
            "transaction broadcast, waiting for receipt"
        );

        let receipt = self.client.wait_for_receipt(&tx_hash).await?;
        self.nonces.mark_used(&sender, nonce).await;

        let status = if receipt.succeeded() {
            TransactionStatus::Confirmed
        } else {
            TransactionStatus::Failed
        };
        tracing::info!(tx_hash = %tx_hash, status = status.description(), "transaction finalized");

        Ok((tx_hash, receipt))
    }

    /// 取消或替换指定 nonce 上的 pending 交易
    ///
    /// 发送同 nonce、零金额的自转账，gas 价格在节点建议价上再上浮，
    /// 以满足节点的替换门槛。nonce 缺省取最低未确认位。已被最终确认
    /// 的 nonce 直接返回 `NonceTooLow`，不发起无意义的提交。
    pub async fn cancel_or_replace_transaction(
        &self,
        wallet: &Wallet,
        nonce: Option<u64>,
    ) -> Result<(String, TransactionReceipt)> {
        let sender = wallet.address();
        let confirmed_count = self
            .client
            .get_transaction_count(&sender, BlockTag::Latest)
            .await?;

        let target = nonce.unwrap_or(confirmed_count);
        if target < confirmed_count {
            return Err(CoreError::NonceTooLow(format!(
                "nonce {} already finalized (account at {})",
                target, confirmed_count
            )));
        }

        // 目标位登记进 nonce 管理器，并发的普通交易不得复用
        self.nonces.reserve(&self.client, &sender, target).await?;

        let gas_price = self.client.gas_price().await?;
        let bumped = gas_price + gas_price * REPLACE_GAS_BUMP_PERCENT / 100;

        let request = TransactionRequest {
            to: sender,
            value: 0,
            nonce: target,
            gas_price: bumped,
            gas_limit: GAS_LIMIT_TRANSFER,
            data: Vec::new(),
            chain_id: self.client.chain_id(),
        };

        let signed = build_and_sign(wallet, &request)?;
        let tx_hash = match self.client.send_raw_transaction(&signed.raw_hex()).await {
            Ok(hash) => hash,
            Err(e) => {
                self.nonces.release(&sender, target).await;
                return Err(e);
            }
        };

        tracing::info!(
            tx_hash = %tx_hash,
            nonce = target,
            gas_price = bumped,
            "replacement transaction broadcast"
        );

        let receipt = self.client.wait_for_receipt(&tx_hash).await?;
        self.nonces.mark_used(&sender, target).await;
        tracing::info!(
            tx_hash = %tx_hash,
            status = TransactionStatus::Replaced.description(),
            "original transaction displaced"
        );

        Ok((tx_hash, receipt))
    }

    /// 验证已上链交易的链标识归属
    ///
    /// 从 recovery 值还原链标识，不在接受集合内的交易视为异链重放。
    pub async fn verify_transaction(&self, tx_hash: &str) -> Result<TransactionInfo> {
        let info = self
            .client
            .get_transaction(tx_hash)
            .await?
            .ok_or_else(|| CoreError::Submission(format!("transaction {} not found", tx_hash)))?;

        let chain_id = embedded_chain_id(info.v).ok_or_else(|| {
            CoreError::Submission(format!("transaction {} lacks embedded chain id", tx_hash))
        })?;

        if !self.client.accepted_chain_ids().contains(&chain_id) {
            return Err(CoreError::Submission(format!(
                "chain id {} not in accepted set {:?}",
                chain_id,
                self.client.accepted_chain_ids()
            )));
        }

        Ok(info)
    }
}
