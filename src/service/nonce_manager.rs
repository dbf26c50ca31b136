//! 进程内 nonce 管理器
//!
//! 同一账户的并发提交必须拿到互不重复的 nonce。链上计数只反映已确认
//! 与节点已知的 pending 交易，进程内尚未提交的预留由这里记账。

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::domain::wallet::Address;
use crate::error::Result;
use crate::service::chain_client::{BlockTag, ChainClient};

/// 链上计数缓存有效期
const CHAIN_NONCE_TTL: Duration = Duration::from_secs(300);

/// 预留超过该时长仍未落链视为遗弃
const PENDING_STALE_AFTER: Duration = Duration::from_secs(600);

#[derive(Debug)]
struct NonceRecord {
    /// 最近一次从节点取得的计数
    chain_nonce: u64,
    /// 已分配、尚未观察到落链的 nonce 及分配时间
    pending: HashMap<u64, Instant>,
    fetched_at: Instant,
}

/// 每地址一条记录，全部操作在同一把锁下完成
#[derive(Debug)]
pub struct NonceManager {
    records: Mutex<HashMap<Address, NonceRecord>>,
}

impl Default for NonceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceManager {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// 为地址分配下一个可用 nonce
    ///
    /// 缓存过期时重新向节点查询 pending 计数；分配结果立即计入
    /// 预留集合，调用方提交失败时必须 `release`。
    pub async fn next_nonce(&self, client: &ChainClient, address: &Address) -> Result<u64> {
        let mut records = self.records.lock().await;

        let needs_refresh = match records.get(address) {
            Some(record) => record.fetched_at.elapsed() > CHAIN_NONCE_TTL,
            None => true,
        };

        if needs_refresh {
            let chain_nonce = client.get_transaction_count(address, BlockTag::Pending).await?;
            let record = records.entry(*address).or_insert_with(|| NonceRecord {
                chain_nonce,
                pending: HashMap::new(),
                fetched_at: Instant::now(),
            });
            record.chain_nonce = chain_nonce;
            record.fetched_at = Instant::now();
            // 已被链上计数覆盖的预留不再占位
            record.pending.retain(|nonce, _| *nonce >= chain_nonce);
        }

        let record = records
            .get_mut(address)
            .ok_or_else(|| crate::error::CoreError::Rpc {
                code: -1,
                message: "nonce record missing after refresh".into(),
            })?;

        drop_stale_pending(address, record);

        let reserved: HashSet<u64> = record.pending.keys().copied().collect();
        let next = compute_next(record.chain_nonce, &reserved);
        record.pending.insert(next, Instant::now());

        tracing::debug!(address = %address, nonce = next, "nonce allocated");
        Ok(next)
    }

    /// 预留一个指定的 nonce
    ///
    /// replace-by-nonce 的目标位由调用方指定而非分配，必须登记进预留
    /// 集合，否则并发的 `next_nonce` 会把同一位分给普通交易。
    pub async fn reserve(
        &self,
        client: &ChainClient,
        address: &Address,
        nonce: u64,
    ) -> Result<()> {
        let mut records = self.records.lock().await;

        let needs_refresh = match records.get(address) {
            Some(record) => record.fetched_at.elapsed() > CHAIN_NONCE_TTL,
            None => true,
        };

        if needs_refresh {
            let chain_nonce = client.get_transaction_count(address, BlockTag::Pending).await?;
            let record = records.entry(*address).or_insert_with(|| NonceRecord {
                chain_nonce,
                pending: HashMap::new(),
                fetched_at: Instant::now(),
            });
            record.chain_nonce = chain_nonce;
            record.fetched_at = Instant::now();
            record.pending.retain(|n, _| *n >= chain_nonce);
        }

        if let Some(record) = records.get_mut(address) {
            record.pending.insert(nonce, Instant::now());
            tracing::debug!(address = %address, nonce, "nonce reserved");
        }
        Ok(())
    }

    /// 交易已确认，释放预留并推进链上计数
    pub async fn mark_used(&self, address: &Address, nonce: u64) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(address) {
            record.pending.remove(&nonce);
            if nonce >= record.chain_nonce {
                record.chain_nonce = nonce + 1;
            }
        }
    }

    /// 提交失败，归还预留的 nonce
    pub async fn release(&self, address: &Address, nonce: u64) {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(address) {
            record.pending.remove(&nonce);
        }
    }

    /// 强制与节点同步，丢弃本地缓存
    pub async fn sync_from_chain(&self, client: &ChainClient, address: &Address) -> Result<u64> {
        let chain_nonce = client.get_transaction_count(address, BlockTag::Pending).await?;
        let mut records = self.records.lock().await;
        let record = records.entry(*address).or_insert_with(|| NonceRecord {
            chain_nonce,
            pending: HashMap::new(),
            fetched_at: Instant::now(),
        });
        record.chain_nonce = chain_nonce;
        record.fetched_at = Instant::now();
        record.pending.retain(|nonce, _| *nonce >= chain_nonce);
        Ok(chain_nonce)
    }
}

/// 从链上计数与预留集合算出下一个空位
fn compute_next(chain_nonce: u64, reserved: &HashSet<u64>) -> u64 {
    let mut candidate = chain_nonce;
    while reserved.contains(&candidate) {
        candidate += 1;
    }
    candidate
}

fn drop_stale_pending(address: &Address, record: &mut NonceRecord) {
    let before = record.pending.len();
    record
        .pending
        .retain(|_, allocated_at| allocated_at.elapsed() < PENDING_STALE_AFTER);
    let dropped = before - record.pending.len();
    if dropped > 0 {
        tracing::warn!(
            address = %address,
            dropped,
            "dropped stale nonce reservations"
        );
    }
}
