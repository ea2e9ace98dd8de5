//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 熔断器事件
//!
//! 熔断器通过有界广播通道发布事件，发布方从不等待订阅方。
//! 订阅方落后过多时会丢失最旧的事件，[`BreakerEvents`] 记录丢失数量并继续接收。

use futures::Stream;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

/// 熔断器事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerEvent {
    /// 拨号成功
    Success,
    /// 拨号失败
    Failure { consecutive_failures: u64 },
    /// 打开状态下拒绝尝试
    Rejected { retry_after: Duration },
    /// CLOSED -> OPEN
    Tripped { consecutive_failures: u64 },
    /// 冷却结束，允许下一次尝试
    CoolDownElapsed,
    /// OPEN -> CLOSED
    Reset { previous_failures: u64 },
}

impl BreakerEvent {
    /// 是否为状态变更事件
    pub fn is_transition(&self) -> bool {
        matches!(self, BreakerEvent::Tripped { .. } | BreakerEvent::Reset { .. })
    }
}

impl std::fmt::Display for BreakerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerEvent::Success => write!(f, "success"),
            BreakerEvent::Failure {
                consecutive_failures,
            } => write!(f, "failure (consecutive={})", consecutive_failures),
            BreakerEvent::Rejected { retry_after } => {
                write!(f, "rejected (retry_after={:?})", retry_after)
            }
            BreakerEvent::Tripped {
                consecutive_failures,
            } => write!(f, "tripped (consecutive={})", consecutive_failures),
            BreakerEvent::CoolDownElapsed => write!(f, "cool-down elapsed"),
            BreakerEvent::Reset { previous_failures } => {
                write!(f, "reset (previous={})", previous_failures)
            }
        }
    }
}

/// 熔断器事件订阅
///
/// 只接收订阅之后发布的事件。需要重新开始时调用 [`BreakerEvents::resubscribe`]。
#[derive(Debug)]
pub struct BreakerEvents {
    receiver: broadcast::Receiver<BreakerEvent>,
    skipped: u64,
}

impl BreakerEvents {
    pub(crate) fn new(receiver: broadcast::Receiver<BreakerEvent>) -> Self {
        Self {
            receiver,
            skipped: 0,
        }
    }

    /// 等待下一个事件
    ///
    /// 熔断器被销毁且已无剩余事件时返回 `None`。
    pub async fn recv(&mut self) -> Option<BreakerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("事件订阅落后，丢失 {} 个事件", n);
                    self.skipped += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞获取一个已到达的事件
    pub fn try_recv(&mut self) -> Option<BreakerEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("事件订阅落后，丢失 {} 个事件", n);
                    self.skipped += n;
                }
                Err(_) => return None,
            }
        }
    }

    /// 取出所有已到达的事件
    pub fn drain(&mut self) -> Vec<BreakerEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// 因落后而丢失的事件数
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// 创建一个新的订阅，从当前时刻开始接收
    pub fn resubscribe(&self) -> Self {
        Self::new(self.receiver.resubscribe())
    }

    /// 转换为异步流
    pub fn into_stream(self) -> impl Stream<Item = BreakerEvent> + Send + 'static {
        futures::stream::unfold(self, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }
}
