//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 连接闸门
//!
//! 在依赖服务（消息服务）可达之前阻塞服务启动。
//!
//! # 流程
//!
//! 1. 向熔断器申请尝试；打开且冷却未结束时等待剩余冷却时间
//! 2. 拨号；瞬时失败记录日志、计入熔断器，并按指数退避等待
//! 3. 成功后重置熔断器与退避，返回连接句柄
//!
//! 等待过程中随时响应取消信号，配置了最大等待时间时超时返回致命错误。
//!
//! # 示例
//!
//! ```rust,no_run
//! use dialgate::{ConnectivityGate, GateConfig, TcpDialer};
//!
//! # async fn run() -> Result<(), dialgate::GateError> {
//! let mut gate = ConnectivityGate::connect(GateConfig::default(), TcpDialer::new(), "localhost:5672")?;
//! let connection = gate.acquire().await?;
//! # Ok(())
//! # }
//! ```

use crate::backoff::Backoff;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::GateConfig;
use crate::dialer::Dialer;
use crate::error::{BreakerState, BreakerStats, DialError, GateError};
use crate::events::BreakerEvents;
use crate::target::Target;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// 连接闸门
///
/// 每个实例绑定一个目标。`acquire` 需要 `&mut self`，因此同一目标同时只有一个连接状态机在运行。
pub struct ConnectivityGate<D: Dialer> {
    target: Target,
    dialer: D,
    config: GateConfig,
    breaker: CircuitBreaker,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl<D: Dialer> std::fmt::Debug for ConnectivityGate<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityGate")
            .field("target", &self.target)
            .field("config", &self.config)
            .field("breaker", &self.breaker)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl<D: Dialer> ConnectivityGate<D> {
    /// 创建连接闸门
    ///
    /// 配置非法时立即返回 [`GateError::Config`]。
    pub fn new(config: GateConfig, dialer: D, target: Target) -> Result<Self, GateError> {
        config.validate()?;

        let breaker = CircuitBreaker::new(config.breaker.clone(), config.event_capacity);
        let backoff = Backoff::new(config.backoff.clone());

        Ok(Self {
            target,
            dialer,
            config,
            breaker,
            backoff,
            cancel: CancellationToken::new(),
        })
    }

    /// 解析地址并创建连接闸门
    ///
    /// 地址非法时在任何拨号之前返回 [`GateError::InvalidTarget`]。
    pub fn connect(config: GateConfig, dialer: D, address: &str) -> Result<Self, GateError> {
        let target = Target::parse(address)?;
        Self::new(config, dialer, target)
    }

    /// 使用外部取消令牌（例如进程关闭信号）
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// 使用固定种子的退避抖动
    pub fn with_backoff_seed(mut self, seed: u64) -> Self {
        self.backoff = Backoff::with_seed(self.config.backoff.clone(), seed);
        self
    }

    /// 取消令牌
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 订阅熔断器事件
    pub fn subscribe(&self) -> BreakerEvents {
        self.breaker.subscribe()
    }

    /// 订阅熔断器状态
    pub fn watch_state(&self) -> watch::Receiver<BreakerState> {
        self.breaker.watch_state()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn stats(&self) -> BreakerStats {
        self.breaker.stats()
    }

    /// 等待直到连接建立
    ///
    /// 瞬时失败在内部重试，不会返回给调用方。可能的错误：
    /// - [`GateError::Cancelled`]: 取消令牌被触发
    /// - [`GateError::MaxWaitExceeded`]: 超过配置的最大等待时间
    /// - [`GateError::Fatal`]: 拨号器报告不可重试的错误
    #[instrument(skip(self), fields(target = %self.target, acquisition = %Uuid::new_v4()))]
    pub async fn acquire(&mut self) -> Result<D::Handle, GateError> {
        let started = Instant::now();
        // 截止时间超出时钟范围时视为无截止时间
        let deadline = self
            .config
            .max_wait
            .and_then(|max_wait| started.checked_add(max_wait));
        let mut attempts: u64 = 0;

        self.backoff.reset();
        info!("等待依赖服务就绪: {}", self.target.redacted_url());

        loop {
            if self.cancel.is_cancelled() {
                info!("等待已取消: {} (已尝试 {} 次)", self.target, attempts);
                return Err(GateError::Cancelled { attempts });
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    error!(
                        "等待 {} 超过最大等待时间 {:?} (已尝试 {} 次)",
                        self.target, self.config.max_wait, attempts
                    );
                    return Err(GateError::MaxWaitExceeded {
                        waited: started.elapsed(),
                        attempts,
                    });
                }
            }

            match self.breaker.try_acquire() {
                Ok(()) => {}
                Err(GateError::BreakerOpen { retry_after }) => {
                    debug!("熔断器打开，{:?} 后重试 {}", retry_after, self.target);
                    self.pause(retry_after, deadline, attempts).await?;
                    continue;
                }
                Err(e) => return Err(e),
            }

            attempts += 1;
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("拨号中途取消: {} (第 {} 次尝试)", self.target, attempts);
                    return Err(GateError::Cancelled { attempts });
                }
                _ = sleep_until_deadline(deadline) => {
                    continue;
                }
                outcome = self.dial_once() => outcome,
            };

            match outcome {
                Ok(handle) => {
                    self.breaker.on_success();
                    self.backoff.reset();
                    info!(
                        "成功连接到 {} (第 {} 次尝试, 耗时 {:?})",
                        self.target.redacted_url(),
                        attempts,
                        started.elapsed()
                    );
                    return Ok(handle);
                }
                Err(DialError::Fatal(reason)) => {
                    error!("无法连接到 {}，不可重试: {}", self.target, reason);
                    return Err(GateError::Fatal {
                        target: self.target.to_string(),
                        reason,
                    });
                }
                Err(e) => {
                    self.breaker.on_failure();
                    let delay = self.backoff.next_delay();
                    warn!(
                        "无法连接到 {}，将在 {:?} 后重试 (第 {} 次尝试): {}",
                        self.target.redacted_url(),
                        delay,
                        attempts,
                        e
                    );
                    self.pause(delay, deadline, attempts).await?;
                }
            }
        }
    }

    async fn dial_once(&self) -> Result<D::Handle, DialError> {
        match self.config.dial_timeout {
            Some(limit) => tokio::time::timeout(limit, self.dialer.dial(&self.target))
                .await
                .unwrap_or(Err(DialError::TimedOut { limit: Some(limit) })),
            None => self.dialer.dial(&self.target).await,
        }
    }

    /// 等待指定时间，不超过截止时间，期间响应取消
    async fn pause(
        &self,
        delay: Duration,
        deadline: Option<Instant>,
        attempts: u64,
    ) -> Result<(), GateError> {
        let wake = match (Instant::now().checked_add(delay), deadline) {
            (Some(wake), Some(deadline)) => Some(wake.min(deadline)),
            (Some(wake), None) => Some(wake),
            (None, deadline) => deadline,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("等待已取消: {} (已尝试 {} 次)", self.target, attempts);
                Err(GateError::Cancelled { attempts })
            }
            _ = sleep_until_deadline(wake) => Ok(()),
        }
    }
}

impl<D> ConnectivityGate<D>
where
    D: Dialer + 'static,
{
    /// 在独立任务上运行 `acquire`
    ///
    /// 返回的 [`PendingConnection`] 可用于等待结果或取消。
    pub fn spawn(mut self) -> PendingConnection<D> {
        let cancel = self.cancel.clone();
        let state = self.breaker.watch_state();
        let events = self.breaker.subscribe();

        let handle = tokio::spawn(async move {
            let result = self.acquire().await;
            (self, result)
        });

        PendingConnection {
            handle: Some(handle),
            cancel,
            state,
            events: Some(events),
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// 后台进行中的连接
///
/// 未等待结果就被丢弃时，后台任务随之终止，不会继续拨号。
pub struct PendingConnection<D: Dialer> {
    handle: Option<JoinHandle<(ConnectivityGate<D>, Result<D::Handle, GateError>)>>,
    cancel: CancellationToken,
    state: watch::Receiver<BreakerState>,
    events: Option<BreakerEvents>,
}

impl<D: Dialer> std::fmt::Debug for PendingConnection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingConnection")
            .field("finished", &self.is_finished())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl<D: Dialer> PendingConnection<D> {
    /// 取消等待
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 当前熔断器状态
    pub fn state(&self) -> BreakerState {
        *self.state.borrow()
    }

    /// 订阅状态变更
    pub fn watch_state(&self) -> watch::Receiver<BreakerState> {
        self.state.clone()
    }

    /// 取出启动时建立的事件订阅（包含启动后的全部事件）
    pub fn take_events(&mut self) -> Option<BreakerEvents> {
        self.events.take()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// 等待连接结果
    pub async fn wait(self) -> Result<D::Handle, GateError> {
        self.wait_with_gate().await.1
    }

    /// 等待连接结果，同时取回闸门（用于读取统计或再次等待）
    pub async fn wait_with_gate(
        mut self,
    ) -> (Option<ConnectivityGate<D>>, Result<D::Handle, GateError>) {
        let Some(handle) = self.handle.take() else {
            return (None, Err(GateError::TaskFailed("连接任务已被取走".to_string())));
        };
        match handle.await {
            Ok((gate, result)) => (Some(gate), result),
            Err(e) => {
                error!("连接任务异常退出: {}", e);
                (None, Err(GateError::TaskFailed(e.to_string())))
            }
        }
    }
}

impl<D: Dialer> Drop for PendingConnection<D> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                debug!("连接等待被丢弃，终止后台任务");
            }
            handle.abort();
        }
    }
}
