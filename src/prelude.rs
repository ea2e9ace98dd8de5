//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from Dialgate,
//! allowing users to import them with a single `use dialgate::prelude::*;`
//! statement instead of importing each type individually.

// Core types - always available
pub use crate::config::{BackoffConfig, BreakerConfig, GateConfig, OpenPolicy, ServiceConfig};
pub use crate::error::{BreakerState, DialError, GateError};
pub use crate::gate::{ConnectivityGate, PendingConnection};
pub use crate::target::Target;

// Dialers
pub use crate::dialer::{Dialer, TcpConnection, TcpDialer};

#[cfg(feature = "amqp")]
pub use crate::amqp::{AmqpConnection, AmqpDialer};

// Observability
pub use crate::events::{BreakerEvent, BreakerEvents};
pub use crate::monitor::{EventMonitor, MonitorSummary};

// Feature-gated exports
#[cfg(feature = "monitoring")]
pub use crate::metrics::Metrics;

#[cfg(feature = "telemetry")]
pub use crate::telemetry::{init_telemetry, TelemetryConfig};

// Cancellation
pub use tokio_util::sync::CancellationToken;
