//! 日志系统初始化
//! 支持结构化日志、级别过滤与按天轮转的文件输出

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LoggingConfig;

/// 初始化日志系统
///
/// 启用文件日志时返回写入器的 guard，调用方必须持有它直到进程退出，
/// 否则缓冲中的日志会丢失。
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_writer = if config.enable_file_logging {
        let log_dir = config
            .log_file_path
            .as_ref()
            .and_then(|p| Path::new(p).parent())
            .unwrap_or_else(|| Path::new("./logs"));
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

        let appender = rolling::daily(log_dir, "didcore.log");
        Some(non_blocking(appender))
    } else {
        None
    };

    let guard = match (config.format.as_str(), file_writer) {
        ("json", Some((writer, guard))) => {
            let file_layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339());
            let stdout_layer = fmt::layer().json().with_timer(ChronoUtc::rfc_3339());
            Registry::default()
                .with(filter)
                .with(file_layer)
                .with(stdout_layer)
                .init();
            Some(guard)
        }
        ("json", None) => {
            Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_timer(ChronoUtc::rfc_3339()))
                .init();
            None
        }
        (_, Some((writer, guard))) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false);
            let stdout_layer = fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true);
            Registry::default()
                .with(filter)
                .with(file_layer)
                .with(stdout_layer)
                .init();
            Some(guard)
        }
        (_, None) => {
            Registry::default()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_ansi(true),
                )
                .init();
            None
        }
    };

    Ok(guard)
}

/// 简化初始化（默认配置，测试与示例用）
pub fn init_default_logging() {
    let config = LoggingConfig::default();
    if init_logging(&config).is_err() {
        // 回退到最基本的日志初始化
        tracing_subscriber::fmt::init();
    }
}
