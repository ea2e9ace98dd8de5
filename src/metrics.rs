//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 监控指标
//!
//! 将熔断器事件映射为Prometheus指标，由事件监控任务更新。

use crate::events::BreakerEvent;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use tracing::error;

/// 监控指标
#[derive(Clone)]
pub struct Metrics {
    /// 拨号总次数
    pub dial_attempts_total: IntCounter,
    /// 拨号失败次数
    pub dial_failures_total: IntCounter,
    /// 打开状态下被拒绝的次数
    pub breaker_rejections_total: IntCounter,
    /// 熔断次数
    pub breaker_trips_total: IntCounter,
    /// 恢复次数
    pub breaker_resets_total: IntCounter,
    /// 熔断器是否打开（0/1）
    pub breaker_open: IntGauge,
    registry: Registry,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Metrics {
    /// 创建并注册所有指标
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let dial_attempts_total = counter(
            &registry,
            "dialgate_dial_attempts_total",
            "Total number of dial attempts",
        )?;
        let dial_failures_total = counter(
            &registry,
            "dialgate_dial_failures_total",
            "Total number of failed dial attempts",
        )?;
        let breaker_rejections_total = counter(
            &registry,
            "dialgate_breaker_rejections_total",
            "Attempts rejected while the breaker was open",
        )?;
        let breaker_trips_total = counter(
            &registry,
            "dialgate_breaker_trips_total",
            "Closed to open transitions",
        )?;
        let breaker_resets_total = counter(
            &registry,
            "dialgate_breaker_resets_total",
            "Open to closed transitions",
        )?;

        let breaker_open = IntGauge::with_opts(Opts::new(
            "dialgate_breaker_open",
            "Whether the breaker is currently open (1) or closed (0)",
        ))?;
        registry.register(Box::new(breaker_open.clone()))?;

        Ok(Self {
            dial_attempts_total,
            dial_failures_total,
            breaker_rejections_total,
            breaker_trips_total,
            breaker_resets_total,
            breaker_open,
            registry,
        })
    }

    /// 根据事件更新指标
    pub fn record(&self, event: &BreakerEvent) {
        match event {
            BreakerEvent::Success => {
                self.dial_attempts_total.inc();
            }
            BreakerEvent::Failure { .. } => {
                self.dial_attempts_total.inc();
                self.dial_failures_total.inc();
            }
            BreakerEvent::Rejected { .. } => {
                self.breaker_rejections_total.inc();
            }
            BreakerEvent::Tripped { .. } => {
                self.breaker_trips_total.inc();
                self.breaker_open.set(1);
            }
            BreakerEvent::Reset { .. } => {
                self.breaker_resets_total.inc();
                self.breaker_open.set(0);
            }
            BreakerEvent::CoolDownElapsed => {}
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 导出文本格式指标
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
