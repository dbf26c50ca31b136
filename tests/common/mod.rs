//! 集成测试辅助函数
#![allow(dead_code)]

use std::sync::Arc;

use didcore::config::{ChainConfig, RegistryConfig};
use didcore::domain::{Ddo, Service, Wallet};
use didcore::service::{ChainClient, NonceManager, TransactionBuilder};
use serde_json::json;

/// 本地开发链默认账户私钥（ganache 确定性助记词，仅测试用）
const ALICE_KEY: &str = "0x4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d";
const BOB_KEY: &str = "0x6cbed15c793ce57650b9877cf6fa156fbef513c4e6134f022a85b1ffdd59b2a1";

pub fn devnet_chain_config() -> ChainConfig {
    ChainConfig {
        rpc_url: std::env::var("TEST_RPC_URL").unwrap_or_else(|_| "http://localhost:8545".into()),
        chain_id: std::env::var("TEST_CHAIN_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1337),
        accepted_chain_ids: vec![1336, 1337],
        confirm_timeout_secs: 30,
        poll_interval_ms: 200,
        request_timeout_secs: 10,
    }
}

pub fn devnet_registry_config() -> RegistryConfig {
    RegistryConfig {
        address: std::env::var("TEST_REGISTRY_ADDRESS").unwrap_or_default(),
        deploy_block: 0,
    }
}

pub fn alice() -> Wallet {
    let key = std::env::var("TEST_KEY_ALICE").unwrap_or_else(|_| ALICE_KEY.into());
    Wallet::from_private_key(&key).expect("invalid alice key")
}

pub fn bob() -> Wallet {
    let key = std::env::var("TEST_KEY_BOB").unwrap_or_else(|_| BOB_KEY.into());
    Wallet::from_private_key(&key).expect("invalid bob key")
}

pub fn test_builder() -> Arc<TransactionBuilder> {
    let client = Arc::new(ChainClient::new(devnet_chain_config()));
    let nonces = Arc::new(NonceManager::new());
    Arc::new(TransactionBuilder::new(client, nonces))
}

/// 带两个 service 的样例文档
pub fn sample_ddo() -> Ddo {
    Ddo::new(
        json!({
            "main": {
                "name": "integration dataset",
                "dateCreated": "2021-02-01T10:55:11Z",
                "files": [{"index": 0, "checksum": "efb2c764274b745f5fc37f97c6b0e761", "contentType": "text/csv"}]
            }
        }),
        vec![
            Service {
                index: 0,
                service_type: "metadata".into(),
                service_endpoint: None,
                main: json!({"name": "integration dataset", "type": "dataset"}),
            },
            Service {
                index: 1,
                service_type: "access".into(),
                service_endpoint: Some("http://localhost:8030/api".into()),
                main: json!({"cost": "10", "timeout": 3600}),
            },
        ],
    )
}
