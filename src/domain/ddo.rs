//! DID 文档（DDO）模型
//!
//! 文档由嵌套元数据、有序的 service 列表和完整性证明组成。
//! DID 由证明中的聚合校验和确定性派生，同一内容恒得同一标识。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::wallet::Wallet;
use crate::error::{CoreError, Result};
use crate::utils::hash::keccak256;

/// DID method 前缀
const DID_PREFIX: &str = "did:dc:";

/// 去中心化标识符，链上注册表以其 32 字节原始形式为键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Did([u8; 32]);

impl Did {
    /// 由聚合校验和派生
    pub fn from_checksum(checksum: [u8; 32]) -> Self {
        Self(checksum)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != 32 {
            return Err(CoreError::Codec(format!(
                "did must be 32 bytes, got {}",
                slice.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn raw(&self) -> &[u8; 32] {
        &self.0
    }

    /// 0x 前缀的十六进制标识（bytes32 参数形式）
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", DID_PREFIX, hex::encode(self.0))
    }
}

impl FromStr for Did {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix(DID_PREFIX)
            .ok_or_else(|| CoreError::Codec(format!("not a {} identifier: {}", DID_PREFIX, s)))?;
        let bytes = hex::decode(hex_part)?;
        Self::from_slice(&bytes)
    }
}

/// 文档中的单个 service 描述
///
/// index 在文档生命周期内保持稳定，main 载荷的校验和进入 proof。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub index: u32,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "serviceEndpoint", skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,
    pub main: serde_json::Value,
}

/// 文档完整性证明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: String,
    pub creator: String,
    /// service index -> main 载荷校验和
    pub checksum: BTreeMap<String, String>,
    pub signature_value: String,
}

/// DID 文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ddo {
    #[serde(default)]
    pub id: String,
    /// 任意深度的嵌套键值元数据
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl Ddo {
    pub fn new(metadata: serde_json::Value, services: Vec<Service>) -> Self {
        Self {
            id: String::new(),
            metadata,
            services,
            proof: None,
        }
    }

    /// 逐 service 计算 main 载荷的校验和
    ///
    /// 校验和为载荷规范化 JSON 的 Keccak-256，键按字典序。
    pub fn service_checksums(&self) -> Result<BTreeMap<String, String>> {
        let mut checksums = BTreeMap::new();
        for service in &self.services {
            let canonical = serde_json::to_vec(&service.main)?;
            checksums.insert(
                service.index.to_string(),
                format!("0x{}", hex::encode(keccak256(&canonical))),
            );
        }
        Ok(checksums)
    }

    /// 计算证明并派生 DID
    ///
    /// 聚合校验和 = 校验和映射规范化 JSON 的 Keccak-256；签名为发布者
    /// 对聚合校验和的 personal-sign。DID 仅由内容决定，与签名者无关。
    pub fn add_proof(&mut self, wallet: &Wallet) -> Result<Did> {
        let checksums = self.service_checksums()?;
        let aggregate = keccak256(&serde_json::to_vec(&checksums)?);
        let signature = wallet.sign_message(&aggregate)?;

        let mut sig_bytes = Vec::with_capacity(65);
        sig_bytes.extend_from_slice(&signature.r);
        sig_bytes.extend_from_slice(&signature.s);
        sig_bytes.push(signature.recovery_id);

        self.proof = Some(Proof {
            proof_type: "DDOIntegritySignature".to_string(),
            created: chrono::Utc::now().to_rfc3339(),
            creator: wallet.address().to_checksum(),
            checksum: checksums,
            signature_value: format!("0x{}", hex::encode(sig_bytes)),
        });

        let did = Did::from_checksum(aggregate);
        self.id = did.to_string();
        Ok(did)
    }

    /// 文档的 DID（要求已调用过 add_proof 或从文本解析出 id）
    pub fn did(&self) -> Result<Did> {
        self.id.parse()
    }

    /// 序列化为文档文本
    pub fn as_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 从文档文本解析
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_ddo() -> Ddo {
        Ddo::new(
            json!({
                "main": {
                    "name": "coastal dataset",
                    "files": [{"index": 0, "checksum": "c0ffee", "contentType": "text/csv"}],
                    "additional": {"nested": {"deeper": [1, 2, 3]}}
                }
            }),
            vec![
                Service {
                    index: 0,
                    service_type: "metadata".into(),
                    service_endpoint: None,
                    main: json!({"name": "coastal dataset", "dateCreated": "2021-02-01"}),
                },
                Service {
                    index: 1,
                    service_type: "access".into(),
                    service_endpoint: Some("http://localhost:8030".into()),
                    main: json!({"cost": "10", "timeout": 3600}),
                },
            ],
        )
    }

    #[test]
    fn test_add_proof_derives_did() {
        let wallet = Wallet::random();
        let mut ddo = sample_ddo();
        let did = ddo.add_proof(&wallet).unwrap();

        assert!(ddo.id.starts_with("did:dc:"));
        assert_eq!(ddo.did().unwrap(), did);

        let proof = ddo.proof.as_ref().unwrap();
        assert_eq!(proof.creator, wallet.address().to_checksum());
        assert_eq!(proof.checksum.len(), 2);
        assert!(proof.checksum.contains_key("0"));
        assert!(proof.checksum.contains_key("1"));
    }

    #[test]
    fn test_did_is_content_derived() {
        // 同一内容在不同钱包下派生出同一 DID
        let mut a = sample_ddo();
        let mut b = sample_ddo();
        let did_a = a.add_proof(&Wallet::random()).unwrap();
        let did_b = b.add_proof(&Wallet::random()).unwrap();
        assert_eq!(did_a, did_b);

        // 内容变化则 DID 变化
        let mut c = sample_ddo();
        c.services[0].main["name"] = json!("another dataset");
        let did_c = c.add_proof(&Wallet::random()).unwrap();
        assert_ne!(did_a, did_c);
    }

    #[test]
    fn test_text_round_trip() {
        let wallet = Wallet::random();
        let mut ddo = sample_ddo();
        ddo.add_proof(&wallet).unwrap();

        let text = ddo.as_text().unwrap();
        let parsed = Ddo::from_text(&text).unwrap();
        assert_eq!(parsed, ddo);
        // 再序列化得到完全相同的文本
        assert_eq!(parsed.as_text().unwrap(), text);
    }

    #[test]
    fn test_from_text_tolerates_deep_nesting() {
        let text = r#"{
            "id": "",
            "metadata": {"a": {"b": {"c": {"d": {"e": [{"f": 1}]}}}}},
            "services": [
                {"index": 0, "type": "metadata", "main": {"x": 1}},
                {"index": 1, "type": "access", "main": {"y": 2}},
                {"index": 2, "type": "compute", "main": {"z": {"w": [null, true]}}}
            ]
        }"#;
        let ddo = Ddo::from_text(text).unwrap();
        assert_eq!(ddo.services.len(), 3);
        assert_eq!(ddo.services[2].index, 2);
    }

    #[test]
    fn test_did_parse_round_trip() {
        let did = Did::from_checksum([7u8; 32]);
        let rendered = did.to_string();
        let parsed: Did = rendered.parse().unwrap();
        assert_eq!(parsed, did);

        assert!("did:op:00".parse::<Did>().is_err());
        assert!("did:dc:1234".parse::<Did>().is_err());
    }
}
