//! # Constants
//!
//! Process-wide defaults and environment variable names.

/// Environment variable carrying the identity of the node this controller
/// instance runs on. Read once at startup.
pub const NODE_NAME_ENV: &str = "NODE_NAME";

/// Default HTTP port for metrics and health probes.
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to become ready before giving up.
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 30;

/// How often to poll server readiness during startup.
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 100;

/// Fallback requeue delay when the per-resource backoff state is unavailable.
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Minimum error backoff (minutes) for the Fibonacci requeue schedule.
pub const ERROR_BACKOFF_MIN_MINUTES: u64 = 1;

/// Maximum error backoff (minutes) for the Fibonacci requeue schedule.
pub const ERROR_BACKOFF_MAX_MINUTES: u64 = 10;
