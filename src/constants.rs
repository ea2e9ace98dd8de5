//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for dialgate.
//!
//! All defaults used by the breaker, the backoff schedule and the gate live
//! here so that configuration files and builders agree on them.

// ============================================================================
// Circuit Breaker Constants
// ============================================================================

/// Default consecutive-failure threshold.
///
/// The breaker trips to OPEN once this many dials in a row have failed.
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 10;

/// Default cool-down (30 seconds).
///
/// Minimum time the breaker stays OPEN before another dial is permitted.
pub const DEFAULT_COOL_DOWN_MS: u64 = 30_000;

/// Capacity of the breaker event channel.
///
/// Subscribers that fall further behind than this lose the oldest events.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// ============================================================================
// Backoff Constants
// ============================================================================

/// First retry delay (100 milliseconds).
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 100;

/// Upper bound for any retry delay (10 seconds).
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 10_000;

/// Growth factor applied after every failed dial.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Symmetric jitter ratio.
///
/// A value of `0.2` spreads each delay over `[0.8 * d, 1.2 * d]`, clamped to the max.
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.2;

/// Largest accepted growth factor.
pub const MAX_BACKOFF_MULTIPLIER: f64 = 16.0;

// ============================================================================
// Limits
// ============================================================================

/// Upper bound for every configured duration (7 days).
///
/// Applies to cool-down, backoff bounds, dial timeout and max wait. Leave
/// `max_wait` unset to wait indefinitely.
pub const MAX_CONFIG_DURATION_MS: u64 = 7 * 24 * 60 * 60 * 1000;

// ============================================================================
// Target Constants
// ============================================================================

/// Broker address used when nothing is configured.
pub const DEFAULT_BROKER_ADDRESS: &str = "localhost:5672";

/// Scheme used when rendering a broker URL.
pub const DEFAULT_SCHEME: &str = "amqp";

/// Default broker user.
pub const DEFAULT_USERNAME: &str = "guest";

/// Default broker password.
pub const DEFAULT_PASSWORD: &str = "guest";

/// Default virtual host.
pub const DEFAULT_VHOST: &str = "/";

/// Maximum accepted host length (RFC 1035 limit).
pub const MAX_HOST_LENGTH: usize = 253;
