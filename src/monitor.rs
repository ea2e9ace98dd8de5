//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 事件监控
//!
//! 在独立任务上消费熔断器事件：记录日志、更新指标，并在结束时返回汇总。
//! 监控任务只读取事件通道，连接循环从不等待它。
//!
//! # 示例
//!
//! ```rust,no_run
//! use dialgate::{ConnectivityGate, EventMonitor, GateConfig, TcpDialer};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), dialgate::GateError> {
//! let token = CancellationToken::new();
//! let mut gate = ConnectivityGate::connect(GateConfig::default(), TcpDialer::new(), "localhost:5672")?
//!     .with_cancellation(token.clone());
//!
//! let monitor = EventMonitor::new(gate.subscribe())
//!     .with_cancellation(token.child_token())
//!     .spawn();
//!
//! let connection = gate.acquire().await?;
//! drop(gate);
//! let summary = monitor.await.unwrap_or_default();
//! println!("trips: {}", summary.tripped);
//! # Ok(())
//! # }
//! ```

use crate::events::{BreakerEvent, BreakerEvents};
#[cfg(feature = "monitoring")]
use crate::metrics::Metrics;
use serde::{Deserialize, Serialize};
#[cfg(feature = "monitoring")]
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// 事件汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSummary {
    /// CLOSED -> OPEN 次数
    pub tripped: u64,
    /// OPEN -> CLOSED 次数
    pub reset: u64,
    pub failures: u64,
    pub successes: u64,
    pub rejections: u64,
    pub cool_downs: u64,
    /// 因落后丢失的事件数
    pub skipped: u64,
}

impl MonitorSummary {
    /// 计入一个事件
    pub fn record(&mut self, event: &BreakerEvent) {
        match event {
            BreakerEvent::Success => self.successes += 1,
            BreakerEvent::Failure { .. } => self.failures += 1,
            BreakerEvent::Rejected { .. } => self.rejections += 1,
            BreakerEvent::Tripped { .. } => self.tripped += 1,
            BreakerEvent::CoolDownElapsed => self.cool_downs += 1,
            BreakerEvent::Reset { .. } => self.reset += 1,
        }
    }

    /// 状态变更总次数
    pub fn transitions(&self) -> u64 {
        self.tripped + self.reset
    }
}

/// 熔断器事件监控
pub struct EventMonitor {
    events: BreakerEvents,
    cancel: CancellationToken,
    #[cfg(feature = "monitoring")]
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for EventMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMonitor")
            .field("events", &self.events)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl EventMonitor {
    pub fn new(events: BreakerEvents) -> Self {
        Self {
            events,
            cancel: CancellationToken::new(),
            #[cfg(feature = "monitoring")]
            metrics: None,
        }
    }

    /// 使用外部取消令牌
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// 同步更新Prometheus指标
    #[cfg(feature = "monitoring")]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 在后台任务上运行
    pub fn spawn(self) -> JoinHandle<MonitorSummary> {
        tokio::spawn(self.run())
    }

    /// 消费事件直到取消或熔断器被销毁
    pub async fn run(mut self) -> MonitorSummary {
        let mut summary = MonitorSummary::default();
        debug!("事件监控已启动");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    // 取消前已到达的事件仍然计入
                    for event in self.events.drain() {
                        self.handle(&event, &mut summary);
                    }
                    debug!("事件监控已取消");
                    break;
                }
                event = self.events.recv() => event,
            };

            match event {
                Some(event) => self.handle(&event, &mut summary),
                None => {
                    debug!("熔断器已销毁，事件监控结束");
                    break;
                }
            }
        }

        summary.skipped = self.events.skipped();
        if summary.skipped > 0 {
            warn!("事件监控共丢失 {} 个事件", summary.skipped);
        }
        summary
    }

    fn handle(&self, event: &BreakerEvent, summary: &mut MonitorSummary) {
        summary.record(event);

        #[cfg(feature = "monitoring")]
        if let Some(metrics) = &self.metrics {
            metrics.record(event);
        }

        match event {
            BreakerEvent::Tripped {
                consecutive_failures,
            } => warn!(
                "熔断器已打开: 连续失败 {} 次",
                consecutive_failures
            ),
            BreakerEvent::Reset { previous_failures } => info!(
                "熔断器已恢复: 此前连续失败 {} 次",
                previous_failures
            ),
            BreakerEvent::CoolDownElapsed => debug!("熔断器冷却结束"),
            BreakerEvent::Failure { .. } | BreakerEvent::Rejected { .. } => {
                debug!("熔断器事件: {}", event)
            }
            BreakerEvent::Success => trace!("熔断器事件: {}", event),
        }
    }
}
