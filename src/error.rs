//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。

use std::time::Duration;
use thiserror::Error;

/// 连接闸门错误类型
#[derive(Error, Debug)]
pub enum GateError {
    /// 配置错误（致命）
    #[error("配置错误: {0}")]
    Config(String),

    /// 目标地址非法（致命）
    #[error("目标地址非法: {input}: {reason}")]
    InvalidTarget { input: String, reason: String },

    /// 拨号器报告的不可重试错误（致命）
    #[error("无法连接到 {target}: {reason}")]
    Fatal { target: String, reason: String },

    /// 熔断器打开，拒绝本次尝试
    #[error("熔断器打开，{retry_after:?} 后允许重试")]
    BreakerOpen { retry_after: Duration },

    /// 等待被取消
    #[error("等待已取消 (已尝试 {attempts} 次)")]
    Cancelled { attempts: u64 },

    /// 超过最大等待时间（致命）
    #[error("超过最大等待时间: 已等待 {waited:?}, 已尝试 {attempts} 次")]
    MaxWaitExceeded { waited: Duration, attempts: u64 },

    /// 后台任务异常退出
    #[error("后台任务失败: {0}")]
    TaskFailed(String),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON解析错误
    #[error("JSON解析错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[error("TOML解析错误: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GateError {
    /// 是否为致命错误（启动应立即中止）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GateError::Config(_)
                | GateError::InvalidTarget { .. }
                | GateError::Fatal { .. }
                | GateError::MaxWaitExceeded { .. }
                | GateError::Io(_)
                | GateError::Json(_)
                | GateError::Yaml(_)
                | GateError::Toml(_)
        )
    }

    /// 是否为取消
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GateError::Cancelled { .. })
    }
}

/// 单次拨号错误
///
/// 除 [`DialError::Fatal`] 外均视为瞬时错误，由闸门在本地重试。
#[derive(Error, Debug)]
pub enum DialError {
    /// 对端拒绝连接
    #[error("连接被拒绝: {0}")]
    Refused(String),

    /// 无法到达（解析失败、网络不可达等）
    #[error("目标不可达: {0}")]
    Unreachable(String),

    /// 单次拨号超时
    ///
    /// `limit` 为闸门配置的拨号超时；由系统报告的超时没有该值。
    #[error("拨号超时 ({})", .limit.map_or_else(|| "系统超时".to_string(), |limit| format!("{:?}", limit)))]
    TimedOut { limit: Option<Duration> },

    /// 其他IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 不可重试的错误
    #[error("致命错误: {0}")]
    Fatal(String),
}

impl DialError {
    /// 是否可重试
    pub fn is_transient(&self) -> bool {
        !matches!(self, DialError::Fatal(_))
    }

    /// 根据IO错误类型归类
    pub fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::ConnectionRefused => DialError::Refused(err.to_string()),
            ErrorKind::NotFound | ErrorKind::AddrNotAvailable => {
                DialError::Unreachable(err.to_string())
            }
            ErrorKind::TimedOut => DialError::TimedOut { limit: None },
            _ => DialError::Io(err),
        }
    }
}

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerState {
    /// 关闭状态（允许尝试）
    Closed,
    /// 打开状态（快速失败）
    Open,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
        }
    }
}

/// 熔断器统计信息
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BreakerStats {
    /// 当前状态
    pub state: BreakerState,
    /// 连续失败次数
    pub consecutive_failures: u64,
    /// 累计成功次数
    pub total_successes: u64,
    /// 累计失败次数
    pub total_failures: u64,
    /// 累计拒绝次数
    pub total_rejections: u64,
    /// 熔断次数
    pub trips: u64,
    /// 最后失败时间
    pub last_failure_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 最后状态变更时间
    pub last_state_change: Option<chrono::DateTime<chrono::Utc>>,
}
