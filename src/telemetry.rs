//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 日志初始化
//!
//! 基于 `tracing-subscriber` 安装全局日志订阅者。
//!
//! # 示例
//!
//! ```rust
//! use dialgate::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::new("my-service").with_log_filter("dialgate=debug");
//! init_telemetry(&config).unwrap();
//! ```

use crate::error::GateError;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 默认日志过滤规则
pub const DEFAULT_LOG_FILTER: &str = "info";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 服务名称
    pub service_name: String,
    /// 过滤规则，为空时读取 `RUST_LOG`
    pub log_filter: Option<String>,
    /// 是否输出目标模块
    pub with_target: bool,
    /// 是否输出ANSI颜色
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "dialgate".to_string(),
            log_filter: None,
            with_target: true,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// 创建新的配置
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// 设置过滤规则
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// 设置是否输出ANSI颜色
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// 构造过滤器
    ///
    /// 优先使用显式规则，其次 `RUST_LOG`，最后使用 [`DEFAULT_LOG_FILTER`]。
    pub fn env_filter(&self) -> Result<EnvFilter, GateError> {
        match &self.log_filter {
            Some(filter) => EnvFilter::try_new(filter)
                .map_err(|e| GateError::Config(format!("无效的日志过滤规则 {}: {}", filter, e))),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
        }
    }
}

/// 初始化日志
///
/// 全局订阅者已安装时不会覆盖，返回 `Ok(())`。
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), GateError> {
    let filter = config.env_filter()?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .is_ok();

    if installed {
        info!("日志已初始化: service={}", config.service_name);
    }
    Ok(())
}
