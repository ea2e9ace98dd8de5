//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 熔断器实现
//!
//! 基于连续失败计数的两状态熔断器。
//!
//! # 特性
//!
//! - **两状态**: Closed（关闭）、Open（打开）
//! - **自动熔断**: 连续失败次数达到阈值自动熔断
//! - **冷却恢复**: 冷却时间结束后允许探测，探测成功即恢复
//! - **单写者**: 所有状态变更通过 `&mut self` 完成，读取方通过事件和状态通道观察
//! - **统计信息**: 提供详细的统计信息

use crate::config::{BreakerConfig, OpenPolicy};
use crate::error::{BreakerState, BreakerStats, GateError};
use crate::events::{BreakerEvent, BreakerEvents};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{info, trace, warn};

/// 熔断器
#[derive(Debug)]
pub struct CircuitBreaker {
    /// 当前状态
    state: BreakerState,
    /// 连续失败计数
    consecutive_failures: u64,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
    /// 熔断次数
    trips: u64,
    /// 进入（或重新进入）打开状态的时间
    opened_at: Option<Instant>,
    /// 本轮冷却结束是否已发布事件
    cool_down_announced: bool,
    /// 最后失败时间
    last_failure_time: Option<DateTime<Utc>>,
    /// 最后状态变更时间
    last_state_change: Option<DateTime<Utc>>,
    events: broadcast::Sender<BreakerEvent>,
    state_tx: watch::Sender<BreakerState>,
    /// 配置
    config: BreakerConfig,
}

impl CircuitBreaker {
    /// 创建新的熔断器
    ///
    /// # 参数
    /// - `config`: 熔断器配置
    /// - `event_capacity`: 事件通道容量，必须大于0
    ///
    /// # 示例
    /// ```rust
    /// use dialgate::circuit_breaker::CircuitBreaker;
    /// use dialgate::config::BreakerConfig;
    /// use std::time::Duration;
    ///
    /// let config = BreakerConfig::new(10, Duration::from_secs(30));
    /// let breaker = CircuitBreaker::new(config, 64);
    /// assert!(breaker.is_closed());
    /// ```
    pub fn new(config: BreakerConfig, event_capacity: usize) -> Self {
        info!(
            "创建熔断器: failure_threshold={}, cool_down={:?}, open_policy={:?}",
            config.failure_threshold, config.cool_down, config.open_policy
        );

        let (events, _) = broadcast::channel(event_capacity.max(1));
        let (state_tx, _) = watch::channel(BreakerState::Closed);

        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            total_successes: 0,
            total_failures: 0,
            total_rejections: 0,
            trips: 0,
            opened_at: None,
            cool_down_announced: false,
            last_failure_time: None,
            last_state_change: Some(Utc::now()),
            events,
            state_tx,
            config,
        }
    }

    /// 申请一次尝试
    ///
    /// # 返回
    /// - `Ok(())`: 允许拨号
    /// - `Err(GateError::BreakerOpen)`: 打开状态且冷却未结束
    pub fn try_acquire(&mut self) -> Result<(), GateError> {
        match self.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => match self.config.open_policy {
                OpenPolicy::Attempt => Ok(()),
                OpenPolicy::Reject => {
                    let remaining = self.cool_down_remaining();
                    if remaining.is_zero() {
                        if !self.cool_down_announced {
                            self.cool_down_announced = true;
                            info!("熔断器冷却结束，允许探测");
                            self.publish(BreakerEvent::CoolDownElapsed);
                        }
                        Ok(())
                    } else {
                        self.total_rejections += 1;
                        trace!("熔断器打开，拒绝尝试，剩余冷却 {:?}", remaining);
                        self.publish(BreakerEvent::Rejected {
                            retry_after: remaining,
                        });
                        Err(GateError::BreakerOpen {
                            retry_after: remaining,
                        })
                    }
                }
            },
        }
    }

    /// 拨号成功
    pub fn on_success(&mut self) {
        let previous_failures = self.consecutive_failures;
        self.consecutive_failures = 0;
        self.total_successes += 1;
        self.publish(BreakerEvent::Success);

        match self.state {
            BreakerState::Closed => {
                trace!("拨号成功（关闭状态）");
            }
            BreakerState::Open => {
                self.transition_to_closed(previous_failures);
            }
        }
    }

    /// 拨号失败
    pub fn on_failure(&mut self) {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.last_failure_time = Some(Utc::now());
        self.publish(BreakerEvent::Failure {
            consecutive_failures: self.consecutive_failures,
        });

        match self.state {
            BreakerState::Closed => {
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.transition_to_open();
                } else {
                    trace!(
                        "拨号失败（关闭状态）: {}/{}",
                        self.consecutive_failures,
                        self.config.failure_threshold
                    );
                }
            }
            BreakerState::Open => {
                // 探测失败，重新开始冷却，不重复发布熔断事件
                self.opened_at = Some(Instant::now());
                self.cool_down_announced = false;
                trace!(
                    "拨号失败（打开状态）: consecutive_failures={}",
                    self.consecutive_failures
                );
            }
        }
    }

    /// 切换到打开状态
    fn transition_to_open(&mut self) {
        self.state = BreakerState::Open;
        self.trips += 1;
        self.opened_at = Some(Instant::now());
        self.cool_down_announced = false;
        self.last_state_change = Some(Utc::now());
        self.state_tx.send_replace(BreakerState::Open);
        warn!(
            "熔断器状态变更: Closed -> Open (consecutive_failures={})",
            self.consecutive_failures
        );
        self.publish(BreakerEvent::Tripped {
            consecutive_failures: self.consecutive_failures,
        });
    }

    /// 切换到关闭状态
    fn transition_to_closed(&mut self, previous_failures: u64) {
        self.state = BreakerState::Closed;
        self.opened_at = None;
        self.cool_down_announced = false;
        self.last_state_change = Some(Utc::now());
        self.state_tx.send_replace(BreakerState::Closed);
        info!(
            "熔断器状态变更: Open -> Closed (previous_failures={})",
            previous_failures
        );
        self.publish(BreakerEvent::Reset { previous_failures });
    }

    fn publish(&self, event: BreakerEvent) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.events.send(event);
    }

    /// 剩余冷却时间（非打开状态为0）
    pub fn cool_down_remaining(&self) -> Duration {
        match (self.state, self.opened_at) {
            (BreakerState::Open, Some(opened_at)) => {
                self.config.cool_down.saturating_sub(opened_at.elapsed())
            }
            _ => Duration::ZERO,
        }
    }

    /// 当前是否允许尝试（不改变状态，不发布事件）
    pub fn ready(&self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                self.config.open_policy == OpenPolicy::Attempt
                    || self.cool_down_remaining().is_zero()
            }
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> BreakerEvents {
        BreakerEvents::new(self.events.subscribe())
    }

    /// 订阅状态变更
    pub fn watch_state(&self) -> watch::Receiver<BreakerState> {
        self.state_tx.subscribe()
    }

    /// 获取当前状态
    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// 检查熔断器是否打开
    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }

    /// 检查熔断器是否关闭
    pub fn is_closed(&self) -> bool {
        self.state == BreakerState::Closed
    }

    /// 连续失败次数
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    /// 重置熔断器到关闭状态
    pub fn reset(&mut self) {
        info!("重置熔断器");
        let was_open = self.is_open();
        let previous_failures = self.consecutive_failures;

        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
        self.total_successes = 0;
        self.total_failures = 0;
        self.total_rejections = 0;
        self.trips = 0;
        self.opened_at = None;
        self.cool_down_announced = false;
        self.last_failure_time = None;
        self.last_state_change = Some(Utc::now());
        self.state_tx.send_replace(BreakerState::Closed);

        if was_open {
            self.publish(BreakerEvent::Reset { previous_failures });
        }
    }

    /// 获取统计信息
    pub fn stats(&self) -> BreakerStats {
        BreakerStats {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            total_successes: self.total_successes,
            total_failures: self.total_failures,
            total_rejections: self.total_rejections,
            trips: self.trips,
            last_failure_time: self.last_failure_time,
            last_state_change: self.last_state_change,
        }
    }

    /// 获取配置
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(
            BreakerConfig::default(),
            crate::constants::DEFAULT_EVENT_CAPACITY,
        )
    }
}
