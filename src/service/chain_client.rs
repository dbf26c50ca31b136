//! 链 RPC 客户端
//! 覆盖交易提交、交易/回执查询、nonce 查询、事件日志过滤与回执轮询

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

use crate::config::ChainConfig;
use crate::domain::wallet::Address;
use crate::error::{CoreError, Result};

/// 原始事件日志条目
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
}

/// 交易回执
///
/// 一旦确认便不可变；status = 1 表示执行成功，0 表示回滚。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub gas_used: Option<u64>,
    pub status: Option<u8>,
    pub logs: Vec<LogEntry>,
}

impl TransactionReceipt {
    /// 链上执行是否成功
    pub fn succeeded(&self) -> bool {
        self.status == Some(1)
    }
}

/// 链上已存在的交易摘要信息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub hash: String,
    pub nonce: u64,
    pub gas_price: u128,
    /// recovery 值，嵌入链标识
    pub v: u64,
    pub block_number: Option<u64>,
}

/// nonce 查询的区块标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Pending,
}

impl BlockTag {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Pending => "pending",
        }
    }
}

/// 链 RPC 客户端
///
/// 配置显式注入，不读取任何全局状态。
#[derive(Debug)]
pub struct ChainClient {
    http_client: reqwest::Client,
    config: ChainConfig,
}

impl ChainClient {
    pub fn new(config: ChainConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client: client,
            config,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    pub fn accepted_chain_ids(&self) -> &[u64] {
        &self.config.accepted_chain_ids
    }

    /// 提交已签名的原始交易，返回交易哈希
    ///
    /// 提交立即返回，确认通过 `wait_for_receipt` 单独等待。
    pub async fn send_raw_transaction(&self, raw_tx: &str) -> Result<String> {
        if !raw_tx.starts_with("0x") || raw_tx.len() < 10 {
            return Err(CoreError::Submission(
                "invalid raw transaction format".into(),
            ));
        }

        let result = self
            .rpc_call("eth_sendRawTransaction", serde_json::json!([raw_tx]))
            .await
            .map_err(|e| match e {
                // 节点对 nonce 的拒绝单独归类，replace 流程依赖这个区分
                CoreError::Rpc { ref message, .. }
                    if message.to_lowercase().contains("nonce too low") =>
                {
                    CoreError::NonceTooLow(message.clone())
                }
                CoreError::Rpc { code, message } => CoreError::Submission(format!(
                    "node rejected transaction ({}): {}",
                    code, message
                )),
                other => other,
            })?;

        let tx_hash = result
            .as_str()
            .ok_or_else(|| CoreError::Submission("missing result in RPC response".into()))?;

        validate_tx_hash(tx_hash)?;

        tracing::info!(tx_hash = %tx_hash, "transaction submitted");
        Ok(tx_hash.to_string())
    }

    /// 按哈希查询交易
    pub async fn get_transaction(&self, tx_hash: &str) -> Result<Option<TransactionInfo>> {
        let result = self
            .rpc_call("eth_getTransactionByHash", serde_json::json!([tx_hash]))
            .await?;

        if result.is_null() {
            return Ok(None);
        }

        Ok(Some(TransactionInfo {
            hash: tx_hash.to_string(),
            nonce: parse_hex_field_u64(&result, "nonce")?,
            gas_price: parse_hex_field_u128(&result, "gasPrice")?,
            v: parse_hex_field_u64(&result, "v")?,
            block_number: result
                .get("blockNumber")
                .and_then(|v| v.as_str())
                .and_then(|s| parse_hex_u64(s).ok()),
        }))
    }

    /// 查询交易回执，未上链时返回 None
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>> {
        let result = self
            .rpc_call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await?;

        if result.is_null() {
            return Ok(None);
        }

        Ok(Some(parse_receipt(tx_hash, &result)))
    }

    /// 查询账户交易计数（nonce）
    pub async fn get_transaction_count(&self, address: &Address, tag: BlockTag) -> Result<u64> {
        let result = self
            .rpc_call(
                "eth_getTransactionCount",
                serde_json::json!([address.to_checksum(), tag.as_str()]),
            )
            .await?;

        let hex_str = result
            .as_str()
            .ok_or_else(|| CoreError::Rpc {
                code: -1,
                message: "missing result for eth_getTransactionCount".into(),
            })?;
        parse_hex_u64(hex_str)
    }

    /// 查询当前建议 gas 价格
    pub async fn gas_price(&self) -> Result<u128> {
        let result = self.rpc_call("eth_gasPrice", serde_json::json!([])).await?;
        let hex_str = result.as_str().ok_or_else(|| CoreError::Rpc {
            code: -1,
            message: "missing result for eth_gasPrice".into(),
        })?;
        parse_hex_u128(hex_str)
    }

    /// 只读合约调用
    pub async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        let result = self
            .rpc_call(
                "eth_call",
                serde_json::json!([
                    {
                        "to": to.to_checksum(),
                        "data": format!("0x{}", hex::encode(data)),
                    },
                    "latest"
                ]),
            )
            .await?;

        let hex_str = result.as_str().ok_or_else(|| CoreError::Rpc {
            code: -1,
            message: "missing result for eth_call".into(),
        })?;
        Ok(hex::decode(hex_str.trim_start_matches("0x"))?)
    }

    /// 按合约地址 + 事件主题 + 区块范围过滤事件日志
    pub async fn get_logs(
        &self,
        address: &Address,
        topic0: &str,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<LogEntry>> {
        let to_block = to_block
            .map(|n| format!("0x{:x}", n))
            .unwrap_or_else(|| "latest".to_string());

        let result = self
            .rpc_call(
                "eth_getLogs",
                serde_json::json!([{
                    "address": address.to_checksum(),
                    "topics": [topic0],
                    "fromBlock": format!("0x{:x}", from_block),
                    "toBlock": to_block,
                }]),
            )
            .await?;

        let entries = result.as_array().ok_or_else(|| CoreError::Rpc {
            code: -1,
            message: "eth_getLogs result is not an array".into(),
        })?;

        Ok(entries.iter().map(parse_log).collect())
    }

    /// 阻塞等待交易回执
    ///
    /// 按配置的间隔轮询，窗口耗尽仍无回执则返回 `Timeout`。
    pub async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        let deadline = Instant::now() + self.config.confirm_timeout();

        loop {
            if let Some(receipt) = self.get_transaction_receipt(tx_hash).await? {
                tracing::debug!(
                    tx_hash = %tx_hash,
                    block = ?receipt.block_number,
                    status = ?receipt.status,
                    "receipt available"
                );
                return Ok(receipt);
            }

            if Instant::now() >= deadline {
                tracing::warn!(tx_hash = %tx_hash, "receipt wait timed out");
                return Err(CoreError::Timeout(self.config.confirm_timeout()));
            }

            sleep(self.config.poll_interval()).await;
        }
    }

    /// 内部方法：发送 JSON-RPC 请求并取出 result 字段
    async fn rpc_call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        tracing::trace!(method = %method, "rpc request");

        let response = self
            .http_client
            .post(&self.config.rpc_url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(CoreError::Rpc {
                code: status.as_u16() as i64,
                message: format!("http {}: {}", status, body),
            });
        }

        let json: serde_json::Value = serde_json::from_str(&body)?;

        if let Some(error) = json.get("error") {
            let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown RPC error")
                .to_string();
            return Err(CoreError::Rpc { code, message });
        }

        json.get("result").cloned().ok_or_else(|| CoreError::Rpc {
            code: -1,
            message: format!("missing result field for {}", method),
        })
    }
}

fn parse_receipt(tx_hash: &str, json: &serde_json::Value) -> TransactionReceipt {
    let logs = json
        .get("logs")
        .and_then(|v| v.as_array())
        .map(|entries| entries.iter().map(parse_log).collect())
        .unwrap_or_default();

    TransactionReceipt {
        tx_hash: tx_hash.to_string(),
        block_number: json
            .get("blockNumber")
            .and_then(|v| v.as_str())
            .and_then(|s| parse_hex_u64(s).ok()),
        block_hash: json
            .get("blockHash")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        gas_used: json
            .get("gasUsed")
            .and_then(|v| v.as_str())
            .and_then(|s| parse_hex_u64(s).ok()),
        status: json
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(|s| u8::from_str_radix(s.trim_start_matches("0x"), 16).ok()),
        logs,
    }
}

fn parse_log(json: &serde_json::Value) -> LogEntry {
    LogEntry {
        address: json
            .get("address")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        topics: json
            .get("topics")
            .and_then(|v| v.as_array())
            .map(|topics| {
                topics
                    .iter()
                    .filter_map(|t| t.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default(),
        data: json
            .get("data")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        block_number: json
            .get("blockNumber")
            .and_then(|v| v.as_str())
            .and_then(|s| parse_hex_u64(s).ok()),
        log_index: json
            .get("logIndex")
            .and_then(|v| v.as_str())
            .and_then(|s| parse_hex_u64(s).ok()),
    }
}

fn parse_hex_field_u64(json: &serde_json::Value, field: &str) -> Result<u64> {
    let hex_str = json
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| CoreError::Rpc {
            code: -1,
            message: format!("missing field {}", field),
        })?;
    parse_hex_u64(hex_str)
}

fn parse_hex_field_u128(json: &serde_json::Value, field: &str) -> Result<u128> {
    let hex_str = json
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| CoreError::Rpc {
            code: -1,
            message: format!("missing field {}", field),
        })?;
    parse_hex_u128(hex_str)
}

fn parse_hex_u64(s: &str) -> Result<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| CoreError::Codec(format!("invalid hex quantity {:?}: {}", s, e)))
}

fn parse_hex_u128(s: &str) -> Result<u128> {
    u128::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| CoreError::Codec(format!("invalid hex quantity {:?}: {}", s, e)))
}

/// 验证交易哈希格式
fn validate_tx_hash(tx_hash: &str) -> Result<()> {
    let stripped = tx_hash.strip_prefix("0x").ok_or_else(|| {
        CoreError::Submission(format!("tx hash missing 0x prefix: {}", tx_hash))
    })?;
    if stripped.len() != 64 || hex::decode(stripped).is_err() {
        return Err(CoreError::Submission(format!(
            "malformed tx hash: {}",
            tx_hash
        )));
    }
    Ok(())
}
