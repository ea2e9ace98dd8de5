//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 指数退避
//!
//! 每次失败后等待时间按倍数增长，并叠加对称抖动，上限为最大退避时间。
//! 成功后调用 [`Backoff::reset`] 回到初始值。

use crate::config::BackoffConfig;
use std::time::Duration;

/// 指数退避计时器
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    /// 下一次未加抖动的基础等待时间
    current: Duration,
    /// 已产生的等待次数
    attempts: u32,
    rng: fastrand::Rng,
}

impl Backoff {
    /// 创建新的退避计时器
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial,
            config,
            attempts: 0,
            rng: fastrand::Rng::new(),
        }
    }

    /// 使用固定种子创建（抖动序列可复现）
    pub fn with_seed(config: BackoffConfig, seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            ..Self::new(config)
        }
    }

    /// 计算下一次等待时间并推进状态
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current.min(self.config.max);
        let delay = self.apply_jitter(base);

        self.attempts = self.attempts.saturating_add(1);
        self.current = scale(base, self.config.multiplier).map_or(self.config.max, |next| next.min(self.config.max));

        delay
    }

    /// 重置到初始等待时间
    pub fn reset(&mut self) {
        self.current = self.config.initial;
        self.attempts = 0;
    }

    /// 已产生的等待次数
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    fn apply_jitter(&mut self, base: Duration) -> Duration {
        if self.config.jitter <= 0.0 {
            return base;
        }
        // [-jitter, +jitter]
        let factor = 1.0 + self.config.jitter * (self.rng.f64() * 2.0 - 1.0);
        scale(base, factor.max(0.0)).map_or(base, |delay| delay.min(self.config.max))
    }
}

/// 按比例缩放，溢出时返回 `None`
fn scale(duration: Duration, factor: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).ok()
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_delay())
    }
}
