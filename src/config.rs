//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 配置模块
//!
//! - [`GateConfig`]：运行时配置，直接使用 `Duration`
//! - [`ServiceConfig`]：配置文件形式（TOML / YAML / JSON），时间字段以毫秒表示

use crate::constants::*;
use crate::error::GateError;
use crate::target::Target;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 熔断器打开时的尝试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OpenPolicy {
    /// 打开状态下立即拒绝，冷却结束后才允许下一次拨号
    #[default]
    Reject,
    /// 打开状态下仍按退避节奏继续拨号
    Attempt,
}

/// 熔断器配置
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// 连续失败阈值（达到此值时熔断）
    pub failure_threshold: u64,
    /// 冷却时间（打开状态后等待此时间再允许尝试）
    pub cool_down: Duration,
    /// 打开状态下的尝试策略
    pub open_policy: OpenPolicy,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cool_down: Duration::from_millis(DEFAULT_COOL_DOWN_MS),
            open_policy: OpenPolicy::default(),
        }
    }
}

impl BreakerConfig {
    /// 创建新的熔断器配置
    pub fn new(failure_threshold: u64, cool_down: Duration) -> Self {
        Self {
            failure_threshold,
            cool_down,
            open_policy: OpenPolicy::default(),
        }
    }

    /// 设置打开状态下的尝试策略
    pub fn open_policy(mut self, policy: OpenPolicy) -> Self {
        self.open_policy = policy;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), GateError> {
        if self.failure_threshold == 0 {
            return Err(GateError::Config("失败阈值必须大于0".to_string()));
        }
        if self.cool_down.is_zero() {
            return Err(GateError::Config("冷却时间必须大于0".to_string()));
        }
        check_upper_bound("冷却时间", self.cool_down)
    }
}

/// 时间配置上限
fn check_upper_bound(name: &str, value: Duration) -> Result<(), GateError> {
    let limit = Duration::from_millis(MAX_CONFIG_DURATION_MS);
    if value > limit {
        return Err(GateError::Config(format!(
            "{} {:?} 超过上限 {:?}",
            name, value, limit
        )));
    }
    Ok(())
}

/// 退避配置
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// 初始退避时间
    pub initial: Duration,
    /// 最大退避时间
    pub max: Duration,
    /// 增长倍数
    pub multiplier: f64,
    /// 抖动比例（0.0-1.0）
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(DEFAULT_BACKOFF_INITIAL_MS),
            max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

impl BackoffConfig {
    /// 创建新的退避配置
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// 设置增长倍数
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// 设置抖动比例
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), GateError> {
        if self.initial.is_zero() {
            return Err(GateError::Config("初始退避时间必须大于0".to_string()));
        }
        if self.max < self.initial {
            return Err(GateError::Config(format!(
                "最大退避时间 {:?} 小于初始退避时间 {:?}",
                self.max, self.initial
            )));
        }
        check_upper_bound("最大退避时间", self.max)?;
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.multiplier) {
            return Err(GateError::Config(format!(
                "增长倍数必须在1.0到{}之间: {}",
                MAX_BACKOFF_MULTIPLIER, self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(GateError::Config(format!(
                "抖动比例必须在0.0到1.0之间: {}",
                self.jitter
            )));
        }
        Ok(())
    }
}

/// 连接闸门配置
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    pub breaker: BreakerConfig,
    pub backoff: BackoffConfig,
    /// 单次拨号超时（`None` 表示由拨号器自行决定）
    pub dial_timeout: Option<Duration>,
    /// 最大等待时间（`None` 表示无限等待）
    pub max_wait: Option<Duration>,
    /// 事件通道容量
    pub event_capacity: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            backoff: BackoffConfig::default(),
            dial_timeout: None,
            max_wait: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl GateConfig {
    pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = Some(timeout);
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), GateError> {
        self.breaker.validate()?;
        self.backoff.validate()?;

        if let Some(timeout) = self.dial_timeout {
            if timeout.is_zero() {
                return Err(GateError::Config("拨号超时必须大于0".to_string()));
            }
            check_upper_bound("拨号超时", timeout)?;
        }
        if let Some(max_wait) = self.max_wait {
            if max_wait.is_zero() {
                return Err(GateError::Config("最大等待时间必须大于0".to_string()));
            }
            check_upper_bound("最大等待时间", max_wait)?;
        }
        if self.event_capacity == 0 {
            return Err(GateError::Config("事件通道容量必须大于0".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// 配置文件
// ============================================================================

/// 服务配置（配置文件形式）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub broker: BrokerSection,
    pub breaker: BreakerSection,
    pub backoff: BackoffSection,
    pub gate: GateSection,
}

/// 消息服务地址配置
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrokerSection {
    /// `host:port` 或完整地址
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub vhost: Option<String>,
}

impl std::fmt::Debug for BrokerSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSection")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("vhost", &self.vhost)
            .finish()
    }
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            address: DEFAULT_BROKER_ADDRESS.to_string(),
            username: None,
            password: None,
            vhost: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BreakerSection {
    pub failure_threshold: u64,
    pub cool_down_ms: u64,
    pub open_policy: OpenPolicy,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cool_down_ms: DEFAULT_COOL_DOWN_MS,
            open_policy: OpenPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffSection {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            max_ms: DEFAULT_BACKOFF_MAX_MS,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateSection {
    pub dial_timeout_ms: Option<u64>,
    pub max_wait_ms: Option<u64>,
    pub event_capacity: usize,
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            dial_timeout_ms: None,
            max_wait_ms: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// 根据扩展名判断格式
    pub fn from_path(path: &Path) -> Result<Self, GateError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| GateError::Config("无法确定配置文件类型".to_string()))?;

        match extension {
            "toml" => Ok(ConfigFormat::Toml),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(GateError::Config(format!(
                "不支持的配置文件类型: {}",
                extension
            ))),
        }
    }
}

impl ServiceConfig {
    /// 从文件加载配置并校验
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, GateError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content, format)
    }

    /// 解析配置内容并校验
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, GateError> {
        let config: ServiceConfig = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// 校验配置（地址与运行时参数）
    pub fn validate(&self) -> Result<(), GateError> {
        self.target()?;
        self.gate_config().validate()
    }

    /// 构造目标地址
    ///
    /// 配置中单独给出的用户名、密码和虚拟主机逐项覆盖地址中的内容，
    /// 未给出的项保留地址中的值（或默认值）。
    pub fn target(&self) -> Result<Target, GateError> {
        let mut target = Target::parse(&self.broker.address)?;

        if self.broker.username.is_some() || self.broker.password.is_some() {
            let username = self
                .broker
                .username
                .clone()
                .unwrap_or_else(|| target.username().to_string());
            let password = match &self.broker.password {
                Some(password) => Secret::new(password.clone()),
                None => Secret::new(target.password().expose_secret().clone()),
            };
            target = target.with_credentials(username, password);
        }
        if let Some(vhost) = &self.broker.vhost {
            target = target.with_vhost(vhost.clone());
        }

        Ok(target)
    }

    /// 转换为运行时配置（不做校验）
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            breaker: BreakerConfig {
                failure_threshold: self.breaker.failure_threshold,
                cool_down: Duration::from_millis(self.breaker.cool_down_ms),
                open_policy: self.breaker.open_policy,
            },
            backoff: BackoffConfig {
                initial: Duration::from_millis(self.backoff.initial_ms),
                max: Duration::from_millis(self.backoff.max_ms),
                multiplier: self.backoff.multiplier,
                jitter: self.backoff.jitter,
            },
            dial_timeout: self.gate.dial_timeout_ms.map(Duration::from_millis),
            max_wait: self.gate.max_wait_ms.map(Duration::from_millis),
            event_capacity: self.gate.event_capacity,
        }
    }
}
