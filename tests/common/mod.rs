//! 测试通用工具模块
//!
//! 提供测试中常用的拨号器和配置。

use async_trait::async_trait;
use dialgate::{BackoffConfig, BreakerConfig, DialError, Dialer, GateConfig, OpenPolicy, Target};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// 单次拨号的预设结果
#[derive(Debug, Clone)]
pub enum Outcome {
    Fail,
    Succeed,
    Fatal,
    /// 挂起指定时间后失败
    Hang(Duration),
}

/// 按脚本返回结果的拨号器
///
/// 句柄为尝试序号（从1开始）。脚本耗尽后使用 `fallback`。
#[derive(Debug)]
pub struct ScriptedDialer {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    attempts: AtomicU64,
    dialed_at: Mutex<Vec<Instant>>,
}

impl ScriptedDialer {
    pub fn new(script: impl IntoIterator<Item = Outcome>, fallback: Outcome) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            attempts: AtomicU64::new(0),
            dialed_at: Mutex::new(Vec::new()),
        }
    }

    /// 前 `failures` 次失败，之后成功
    pub fn fail_then_succeed(failures: usize) -> Self {
        Self::new(vec![Outcome::Fail; failures], Outcome::Succeed)
    }

    /// 始终失败
    pub fn always_fail() -> Self {
        Self::new(Vec::new(), Outcome::Fail)
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// 每次拨号的时间点
    pub fn dialed_at(&self) -> Vec<Instant> {
        self.dialed_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    type Handle = u64;

    async fn dial(&self, _target: &Target) -> Result<u64, DialError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.dialed_at.lock().unwrap().push(Instant::now());

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match outcome {
            Outcome::Fail => Err(DialError::Refused(format!("attempt {}", attempt))),
            Outcome::Succeed => Ok(attempt),
            Outcome::Fatal => Err(DialError::Fatal("access refused".to_string())),
            Outcome::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Err(DialError::Unreachable(format!("attempt {} hung", attempt)))
            }
        }
    }
}

/// 测试用配置：无抖动，短退避
pub fn test_config(threshold: u64, cool_down: Duration, policy: OpenPolicy) -> GateConfig {
    GateConfig::default()
        .breaker(BreakerConfig::new(threshold, cool_down).open_policy(policy))
        .backoff(BackoffConfig::new(Duration::from_millis(10), Duration::from_millis(100)).jitter(0.0))
}

pub const TARGET: &str = "localhost:5672";
