//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Dialgate - Startup Connectivity Gate
//!
//! Blocks service startup until a dependent service (typically a message broker)
//! becomes reachable, using a consecutive-failure circuit breaker and bounded
//! exponential backoff so an unavailable dependency is never hot-looped.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use dialgate::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`ConnectivityGate`] - Retry loop that hands off a live connection handle
//! - [`GateConfig`] - Breaker, backoff and timeout configuration
//! - [`Dialer`] - One connection attempt against a [`Target`]
//! - [`GateError`] - Error types
//!
//! ## Observability
//!
//! - [`BreakerEvents`] - Resubscribable breaker event stream
//! - [`EventMonitor`] - Background event drain with logging and optional metrics
//!
//! ## Extensions (feature-gated)
//!
//! - [`AmqpDialer`](amqp::AmqpDialer) - AMQP handshake and authentication (requires `amqp` feature)
//! - Prometheus metrics (requires `monitoring` feature)
//! - tracing-subscriber initialization (requires `telemetry` feature)
//! - `await-broker` binary (requires `cli` feature)
//!
//! # Examples
//!
//! ```rust,no_run
//! use dialgate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GateError> {
//!     let config = GateConfig::default();
//!     let mut gate = ConnectivityGate::connect(config, TcpDialer::new(), "localhost:5672")?;
//!
//!     // 阻塞直到消息服务可达
//!     let connection = gate.acquire().await?;
//!     println!("connected to {}", connection.peer_addr());
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **Circuit breaker**: Trips after N consecutive failures, re-permits attempts after a cool-down
//! - **Bounded backoff**: Exponential delays with jitter between attempts
//! - **Cancellation**: Responds to shutdown signals while waiting
//! - **Bounded wait**: Optional overall deadline
//! - **Monitoring**: Breaker events, state watch channel and Prometheus metrics

pub mod prelude;

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod backoff;
pub mod circuit_breaker;
pub mod config;
pub mod constants;
pub mod dialer;
pub mod error;
pub mod events;
pub mod gate;
#[cfg(feature = "monitoring")]
pub mod metrics;
pub mod monitor;
pub mod target;
#[cfg(feature = "telemetry")]
pub mod telemetry;

// 重新导出常用类型
#[cfg(feature = "amqp")]
pub use amqp::{AmqpConnection, AmqpDialer};
pub use backoff::Backoff;
pub use circuit_breaker::CircuitBreaker;
pub use config::{BackoffConfig, BreakerConfig, ConfigFormat, GateConfig, OpenPolicy, ServiceConfig};
pub use dialer::{Dialer, TcpConnection, TcpDialer};
pub use error::{BreakerState, BreakerStats, DialError, GateError};
pub use events::{BreakerEvent, BreakerEvents};
pub use gate::{ConnectivityGate, PendingConnection};
#[cfg(feature = "monitoring")]
pub use metrics::Metrics;
pub use monitor::{EventMonitor, MonitorSummary};
pub use target::Target;
#[cfg(feature = "telemetry")]
pub use telemetry::{init_telemetry, TelemetryConfig};
