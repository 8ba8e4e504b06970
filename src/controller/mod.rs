//! # Controller Module
//!
//! Reconciliation state machine and its supporting pieces: per-resource error
//! backoff and the HTTP server for metrics and probes.

pub mod backoff;
pub mod reconciler;
pub mod server;
