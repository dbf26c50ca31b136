//! DDO 注册表合约客户端
//!
//! 合约只存储事件，不存储文档本体：链上日志即真相源。发布与更新把
//! 压缩后的文档文本放进事件 data，解析方从日志回放出文档历史。
//!
//! 合约接口:
//!   create(bytes32,bytes,bytes) / update(bytes32,bytes,bytes)
//!   transferOwnership(bytes32,address) / didOwner(bytes32)
//! 事件:
//!   DDOCreated(bytes32,bytes) / DDOUpdated(bytes32,bytes)，did 为索引主题

use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::domain::ddo::{Ddo, Did};
use crate::domain::wallet::{Address, Wallet};
use crate::error::{CoreError, Result};
use crate::service::chain_client::{LogEntry, TransactionReceipt};
use crate::service::transaction_builder::TransactionBuilder;
use crate::utils::codec;
use crate::utils::hash::{event_topic, function_selector};

/// 注册表调用 gas 上限，事件 data 携带整份压缩文档
const REGISTRY_CALL_GAS: u64 = 500_000;

/// flags 首位：data 为压缩文本
const FLAG_COMPRESSED: u8 = 0x01;

/// 注册表事件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    Created,
    Updated,
}

impl RegistryEvent {
    pub fn signature(&self) -> &'static str {
        match self {
            Self::Created => "DDOCreated(bytes32,bytes)",
            Self::Updated => "DDOUpdated(bytes32,bytes)",
        }
    }

    /// 0x 前缀的事件主题，日志过滤用
    pub fn topic(&self) -> String {
        format!("0x{}", hex::encode(event_topic(self.signature())))
    }
}

/// 从日志解码出的单条注册表事件
#[derive(Debug, Clone)]
pub struct DdoEvent {
    pub kind: RegistryEvent,
    pub did: Did,
    /// 事件携带的原始载荷（压缩文档文本）
    pub data: Vec<u8>,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
}

impl DdoEvent {
    /// 解压出文档文本
    pub fn document_text(&self) -> Result<String> {
        codec::decompress(&self.data)
    }
}

/// ABI 参数（只覆盖注册表接口用到的类型）
enum AbiToken {
    Bytes32([u8; 32]),
    Address(Address),
    Bytes(Vec<u8>),
}

/// 注册表合约客户端
#[derive(Debug)]
pub struct DdoRegistry {
    address: Address,
    deploy_block: u64,
    builder: Arc<TransactionBuilder>,
}

impl DdoRegistry {
    pub fn new(config: &RegistryConfig, builder: Arc<TransactionBuilder>) -> Result<Self> {
        let address: Address = config
            .address
            .parse()
            .map_err(|_| CoreError::Config(format!("bad registry address: {}", config.address)))?;
        Ok(Self {
            address,
            deploy_block: config.deploy_block,
            builder,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// 发布文档
    ///
    /// 文档必须已带证明（DID 已派生）。注册成败由链上仲裁：同一 DID
    /// 已被他人注册时交易回滚，这里统一上报为提交失败。
    pub async fn create(&self, wallet: &Wallet, ddo: &Ddo) -> Result<(Did, TransactionReceipt)> {
        let did = ddo.did()?;
        let payload = codec::compress(&ddo.as_text()?)?;
        let call = encode_call(
            function_selector("create(bytes32,bytes,bytes)"),
            &[
                AbiToken::Bytes32(*did.raw()),
                AbiToken::Bytes(vec![FLAG_COMPRESSED]),
                AbiToken::Bytes(payload),
            ],
        );

        let (tx_hash, receipt) = self
            .builder
            .send_contract_call(wallet, &self.address, call, REGISTRY_CALL_GAS)
            .await?;

        if !receipt.succeeded() {
            return Err(CoreError::Submission(format!(
                "create reverted for {} in tx {}",
                did, tx_hash
            )));
        }

        tracing::info!(did = %did, tx_hash = %tx_hash, "document published");
        Ok((did, receipt))
    }

    /// 更新文档
    ///
    /// 合约只接受当前所有者的更新，回滚统一归类为未授权。
    pub async fn update(&self, wallet: &Wallet, ddo: &Ddo) -> Result<(Did, TransactionReceipt)> {
        let did = ddo.did()?;
        let payload = codec::compress(&ddo.as_text()?)?;
        let call = encode_call(
            function_selector("update(bytes32,bytes,bytes)"),
            &[
                AbiToken::Bytes32(*did.raw()),
                AbiToken::Bytes(vec![FLAG_COMPRESSED]),
                AbiToken::Bytes(payload),
            ],
        );

        let (tx_hash, receipt) = self
            .builder
            .send_contract_call(wallet, &self.address, call, REGISTRY_CALL_GAS)
            .await
            .map_err(normalize_unauthorized)?;

        if !receipt.succeeded() {
            return Err(CoreError::Unauthorized(format!(
                "update of {} rejected by owner check (tx {})",
                did, tx_hash
            )));
        }

        tracing::info!(did = %did, tx_hash = %tx_hash, "document updated");
        Ok((did, receipt))
    }

    /// 转移文档所有权
    pub async fn transfer_ownership(
        &self,
        wallet: &Wallet,
        did: &Did,
        new_owner: &Address,
    ) -> Result<TransactionReceipt> {
        let call = encode_call(
            function_selector("transferOwnership(bytes32,address)"),
            &[AbiToken::Bytes32(*did.raw()), AbiToken::Address(*new_owner)],
        );

        let (tx_hash, receipt) = self
            .builder
            .send_contract_call(wallet, &self.address, call, REGISTRY_CALL_GAS)
            .await
            .map_err(normalize_unauthorized)?;

        if !receipt.succeeded() {
            return Err(CoreError::Unauthorized(format!(
                "ownership transfer of {} rejected (tx {})",
                did, tx_hash
            )));
        }

        tracing::info!(did = %did, new_owner = %new_owner, "ownership transferred");
        Ok(receipt)
    }

    /// 查询文档所有者，未发布返回 None
    pub async fn did_owner(&self, did: &Did) -> Result<Option<Address>> {
        let call = encode_call(
            function_selector("didOwner(bytes32)"),
            &[AbiToken::Bytes32(*did.raw())],
        );
        let output = self.builder.client().call(&self.address, &call).await?;

        if output.len() < 32 {
            return Err(CoreError::Codec(format!(
                "didOwner returned {} bytes, expected 32",
                output.len()
            )));
        }
        let owner = Address::from_slice(&output[12..32])?;
        // 零地址是合约里"未发布"的哨兵值
        Ok(if owner.is_zero() { None } else { Some(owner) })
    }

    /// 验证交易是否已上链且执行成功
    pub async fn verify_tx(&self, tx_hash: &str) -> Result<bool> {
        let receipt = self.builder.client().get_transaction_receipt(tx_hash).await?;
        Ok(receipt.map(|r| r.succeeded()).unwrap_or(false))
    }

    /// 从回执解码本注册表发出的指定事件
    ///
    /// 只接受地址与主题都匹配的日志，其他合约的事件一律忽略。
    pub fn process_receipt(
        &self,
        receipt: &TransactionReceipt,
        kind: RegistryEvent,
    ) -> Result<Vec<DdoEvent>> {
        let topic = kind.topic();
        receipt
            .logs
            .iter()
            .filter(|log| self.log_matches(log, &topic))
            .map(|log| decode_registry_log(log, kind))
            .collect()
    }

    /// 回放某个 DID 的完整事件历史
    ///
    /// 从部署区块起扫描两类事件，按（区块号，日志序号）排序。
    pub async fn document_history(&self, did: &Did) -> Result<Vec<DdoEvent>> {
        let mut events = Vec::new();
        for kind in [RegistryEvent::Created, RegistryEvent::Updated] {
            let logs = self
                .builder
                .client()
                .get_logs(&self.address, &kind.topic(), self.deploy_block, None)
                .await?;
            for log in &logs {
                let event = decode_registry_log(log, kind)?;
                if event.did == *did {
                    events.push(event);
                }
            }
        }
        events.sort_by_key(|e| (e.block_number.unwrap_or(u64::MAX), e.log_index.unwrap_or(0)));
        Ok(events)
    }

    /// 解析文档的当前内容（历史中的最后一个事件）
    pub async fn resolve(&self, did: &Did) -> Result<Option<Ddo>> {
        let events = self.document_history(did).await?;
        match events.last() {
            Some(event) => Ok(Some(Ddo::from_text(&event.document_text()?)?)),
            None => Ok(None),
        }
    }

    fn log_matches(&self, log: &LogEntry, topic: &str) -> bool {
        let address_matches = log
            .address
            .parse::<Address>()
            .map(|a| a == self.address)
            .unwrap_or(false);
        address_matches && log.topics.first().map(|t| t.eq_ignore_ascii_case(topic)) == Some(true)
    }
}

/// 回滚与节点拒绝在所有权受限的操作里统一归类
fn normalize_unauthorized(err: CoreError) -> CoreError {
    match err {
        CoreError::Submission(msg) => CoreError::Unauthorized(msg),
        other => other,
    }
}

/// 编码合约调用：selector + head/tail ABI 编码
///
/// 静态参数直接写入 head，动态参数在 head 写偏移、载荷追加到 tail。
fn encode_call(selector: [u8; 4], tokens: &[AbiToken]) -> Vec<u8> {
    let head_size = tokens.len() * 32;
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            AbiToken::Bytes32(value) => head.extend_from_slice(value),
            AbiToken::Address(addr) => {
                head.extend_from_slice(&[0u8; 12]);
                head.extend_from_slice(addr.as_bytes());
            }
            AbiToken::Bytes(payload) => {
                head.extend_from_slice(&encode_u256(head_size + tail.len()));
                tail.extend_from_slice(&encode_u256(payload.len()));
                tail.extend_from_slice(payload);
                // 载荷补齐到 32 字节边界
                let rem = payload.len() % 32;
                if rem != 0 {
                    tail.extend_from_slice(&vec![0u8; 32 - rem]);
                }
            }
        }
    }

    let mut out = Vec::with_capacity(4 + head.len() + tail.len());
    out.extend_from_slice(&selector);
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    out
}

fn encode_u256(value: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&(value as u64).to_be_bytes());
    out
}

/// 解码事件 data 中的单个动态 bytes 参数
fn decode_log_bytes(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 64 {
        return Err(CoreError::Codec(format!(
            "log data too short: {} bytes",
            data.len()
        )));
    }
    // offset 与 len 来自节点返回的原始字节，加法必须防回绕
    let offset = decode_u256(&data[..32])?;
    let start = offset
        .checked_add(32)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| CoreError::Codec("log data offset out of range".into()))?;
    let len = decode_u256(&data[offset..start])?;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| CoreError::Codec("log data payload truncated".into()))?;
    Ok(data[start..end].to_vec())
}

fn decode_u256(word: &[u8]) -> Result<usize> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(CoreError::Codec("u256 value exceeds usize".into()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..32]);
    Ok(u64::from_be_bytes(buf) as usize)
}

fn decode_registry_log(log: &LogEntry, kind: RegistryEvent) -> Result<DdoEvent> {
    let did_topic = log
        .topics
        .get(1)
        .ok_or_else(|| CoreError::Codec("registry log missing did topic".into()))?;
    let did = Did::from_slice(&hex::decode(did_topic.trim_start_matches("0x"))?)?;
    let data = decode_log_bytes(&hex::decode(log.data.trim_start_matches("0x"))?)?;

    Ok(DdoEvent {
        kind,
        did,
        data,
        block_number: log.block_number,
        log_index: log.log_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_log_data(payload: &[u8]) -> String {
        // offset(32) | len(32) | padded payload
        let mut data = Vec::new();
        data.extend_from_slice(&encode_u256(32));
        data.extend_from_slice(&encode_u256(payload.len()));
        data.extend_from_slice(payload);
        let rem = payload.len() % 32;
        if rem != 0 {
            data.extend_from_slice(&vec![0u8; 32 - rem]);
        }
        format!("0x{}", hex::encode(data))
    }

    #[test]
    fn test_encode_call_layout() {
        let did = [0xaa; 32];
        let payload = vec![1u8, 2, 3];
        let call = encode_call(
            function_selector("create(bytes32,bytes,bytes)"),
            &[
                AbiToken::Bytes32(did),
                AbiToken::Bytes(vec![FLAG_COMPRESSED]),
                AbiToken::Bytes(payload),
            ],
        );

        // selector
        assert_eq!(&call[..4], &function_selector("create(bytes32,bytes,bytes)"));
        // head[0] = did
        assert_eq!(&call[4..36], &did);
        // head[1] = flags 偏移（3 * 32 = 96）
        assert_eq!(decode_u256(&call[36..68]).unwrap(), 96);
        // head[2] = data 偏移（96 + 32 + 32 = 160）
        assert_eq!(decode_u256(&call[68..100]).unwrap(), 160);
        // flags tail: 长度 1 + 载荷补齐
        assert_eq!(decode_u256(&call[100..132]).unwrap(), 1);
        assert_eq!(call[132], FLAG_COMPRESSED);
        // data tail
        assert_eq!(decode_u256(&call[164..196]).unwrap(), 3);
        assert_eq!(&call[196..199], &[1, 2, 3]);
        // 总长度按 32 对齐
        assert_eq!((call.len() - 4) % 32, 0);
    }

    #[test]
    fn test_encode_call_address_padding() {
        let addr: Address = "0x66aB6D9362d4F35596279692F0251Db635165871".parse().unwrap();
        let call = encode_call(
            function_selector("transferOwnership(bytes32,address)"),
            &[AbiToken::Bytes32([1u8; 32]), AbiToken::Address(addr)],
        );
        assert_eq!(call.len(), 4 + 64);
        assert_eq!(&call[36..48], &[0u8; 12]);
        assert_eq!(&call[48..68], addr.as_bytes());
    }

    #[test]
    fn test_decode_log_bytes_round_trip() {
        let payload = b"compressed document text".to_vec();
        let hex_data = encoded_log_data(&payload);
        let raw = hex::decode(hex_data.trim_start_matches("0x")).unwrap();
        assert_eq!(decode_log_bytes(&raw).unwrap(), payload);
    }

    #[test]
    fn test_decode_log_bytes_rejects_truncated() {
        assert!(decode_log_bytes(&[0u8; 16]).is_err());

        // 声称长度超过实际载荷
        let mut data = Vec::new();
        data.extend_from_slice(&encode_u256(32));
        data.extend_from_slice(&encode_u256(1000));
        data.extend_from_slice(&[0u8; 32]);
        assert!(decode_log_bytes(&data).is_err());
    }

    #[test]
    fn test_decode_log_bytes_rejects_overflowing_words() {
        // offset 字为 u64::MAX，偏移加法回绕
        let mut data = vec![0u8; 64];
        data[24..32].copy_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(
            decode_log_bytes(&data),
            Err(CoreError::Codec(_))
        ));

        // len 字为 u64::MAX，长度加法回绕
        let mut data = Vec::new();
        data.extend_from_slice(&encode_u256(32));
        let mut len_word = [0u8; 32];
        len_word[24..].copy_from_slice(&u64::MAX.to_be_bytes());
        data.extend_from_slice(&len_word);
        assert!(matches!(
            decode_log_bytes(&data),
            Err(CoreError::Codec(_))
        ));
    }

    #[test]
    fn test_decode_registry_log() {
        let did = Did::from_checksum([7u8; 32]);
        let log = LogEntry {
            address: "0x66aB6D9362d4F35596279692F0251Db635165871".into(),
            topics: vec![RegistryEvent::Created.topic(), did.to_hex()],
            data: encoded_log_data(b"payload"),
            block_number: Some(42),
            log_index: Some(0),
        };

        let event = decode_registry_log(&log, RegistryEvent::Created).unwrap();
        assert_eq!(event.did, did);
        assert_eq!(event.data, b"payload");
        assert_eq!(event.block_number, Some(42));
    }

    #[test]
    fn test_decode_registry_log_missing_topic() {
        let log = LogEntry {
            address: "0x66aB6D9362d4F35596279692F0251Db635165871".into(),
            topics: vec![RegistryEvent::Updated.topic()],
            data: "0x".into(),
            block_number: None,
            log_index: None,
        };
        assert!(decode_registry_log(&log, RegistryEvent::Updated).is_err());
    }

    #[test]
    fn test_event_topics_are_distinct() {
        assert_ne!(
            RegistryEvent::Created.topic(),
            RegistryEvent::Updated.topic()
        );
        assert!(RegistryEvent::Created.topic().starts_with("0x"));
        assert_eq!(RegistryEvent::Created.topic().len(), 66);
    }

    #[test]
    fn test_normalize_unauthorized() {
        let err = normalize_unauthorized(CoreError::Submission("owner check failed".into()));
        assert!(matches!(err, CoreError::Unauthorized(_)));

        let err = normalize_unauthorized(CoreError::Timeout(std::time::Duration::from_secs(1)));
        assert!(matches!(err, CoreError::Timeout(_)));
    }
}
