//! ISCSIConnection Controller Library
//!
//! This library provides the core functionality for the ISCSIConnection
//! controller: the CRD types, the reconciliation state machine, the connector
//! adapter, and the runtime wiring. Tests for the state machine live in the
//! `tests/` directory and drive it through an in-memory resource store.

pub mod connector;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod store;

// Re-export CRD types for convenience
pub use crd::*;
