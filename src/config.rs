//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::wallet::Address;

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 链连接配置
///
/// 链标识集合显式可配：私链/测试网默认接受 1336 与 1337，
/// 主网部署必须覆盖这两个字段，不允许写死。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    /// 签名时嵌入的链标识
    pub chain_id: u64,
    /// 验证已确认交易时接受的链标识集合
    pub accepted_chain_ids: Vec<u64>,
    /// 等待回执的时间窗口（秒）
    pub confirm_timeout_secs: u64,
    /// 回执轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 单次 RPC 请求超时（秒）
    pub request_timeout_secs: u64,
}

/// DDO 注册表合约配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// 合约地址
    pub address: String,
    /// 合约部署区块，事件回放的扫描起点
    pub deploy_block: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_file_logging: bool,
    pub log_file_path: Option<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: std::env::var("RPC_URL")
                .unwrap_or_else(|_| "http://localhost:8545".into()),
            chain_id: std::env::var("CHAIN_ID")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1337),
            accepted_chain_ids: std::env::var("ACCEPTED_CHAIN_IDS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .filter_map(|part| part.trim().parse().ok())
                        .collect()
                })
                .unwrap_or_else(|| vec![1336, 1337]),
            confirm_timeout_secs: std::env::var("CONFIRM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(500),
            request_timeout_secs: std::env::var("RPC_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl ChainConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            address: std::env::var("REGISTRY_ADDRESS").unwrap_or_default(),
            deploy_block: std::env::var("REGISTRY_DEPLOY_BLOCK")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
            enable_file_logging: std::env::var("LOG_FILE_ENABLED")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(false),
            log_file_path: std::env::var("LOG_FILE_PATH").ok(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            chain: ChainConfig::default(),
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if !self.chain.rpc_url.starts_with("http://") && !self.chain.rpc_url.starts_with("https://")
        {
            anyhow::bail!("RPC_URL must start with http:// or https://");
        }

        if self.chain.accepted_chain_ids.is_empty() {
            anyhow::bail!("ACCEPTED_CHAIN_IDS must not be empty");
        }

        // 签名用的链标识必须位于接受集合内，否则自己发的交易都过不了验证
        if !self.chain.accepted_chain_ids.contains(&self.chain.chain_id) {
            anyhow::bail!(
                "CHAIN_ID {} is not in the accepted set {:?}",
                self.chain.chain_id,
                self.chain.accepted_chain_ids
            );
        }

        if self.chain.poll_interval_ms == 0 || self.chain.confirm_timeout_secs == 0 {
            anyhow::bail!("poll interval and confirm timeout must be positive");
        }

        if !self.registry.address.is_empty() {
            Address::from_str(&self.registry.address)
                .map_err(|e| anyhow::anyhow!("invalid REGISTRY_ADDRESS: {}", e))?;
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config {
            chain: ChainConfig {
                rpc_url: "http://localhost:8545".into(),
                chain_id: 1337,
                accepted_chain_ids: vec![1336, 1337],
                confirm_timeout_secs: 60,
                poll_interval_ms: 500,
                request_timeout_secs: 30,
            },
            registry: RegistryConfig {
                address: String::new(),
                deploy_block: 0,
            },
            logging: LoggingConfig {
                level: "info".into(),
                format: "text".into(),
                enable_file_logging: false,
                log_file_path: None,
            },
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.chain.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[chain]
rpc_url = "http://localhost:8545"
chain_id = 1336
accepted_chain_ids = [1336, 1337]
confirm_timeout_secs = 30
poll_interval_ms = 250
request_timeout_secs = 10

[registry]
address = "0x66aB6D9362d4F35596279692F0251Db635165871"
deploy_block = 12

[logging]
level = "debug"
format = "text"
enable_file_logging = false
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.chain.chain_id, 1336);
        assert_eq!(config.registry.deploy_block, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut config = Config::from_env().unwrap();
        config.chain.rpc_url = "ftp://nope".into();
        assert!(config.validate().is_err());

        let mut config = Config::from_env().unwrap();
        config.chain.chain_id = 1;
        config.chain.accepted_chain_ids = vec![1336, 1337];
        assert!(config.validate().is_err());

        let mut config = Config::from_env().unwrap();
        config.registry.address = "0x1234".into();
        assert!(config.validate().is_err());
    }
}
