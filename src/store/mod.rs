//! # Resource Store
//!
//! The reconciler talks to the resource store through the [`ConnectionStore`]
//! trait: a `get` that reports absence without error, and a status write with
//! optimistic-concurrency conflicts surfaced as a distinct error kind.
//! `KubeStore` is the production implementation; `InMemoryStore` backs the
//! integration test-suite.

pub mod kube_store;
pub mod memory;

pub use kube_store::KubeStore;
pub use memory::InMemoryStore;

use crate::crd::ISCSIConnection;
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the resource store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic-concurrency failure: the resource changed underneath the
    /// caller-supplied copy. The caller decides whether to retry.
    #[error("conflicting status write for {name}: {message}")]
    Conflict { name: String, message: String },

    /// The resource is missing a piece of metadata the store needs to
    /// address it.
    #[error("resource has no {0} set")]
    MissingMetadata(&'static str),

    /// The resource could not be serialized for the write.
    #[error("failed to encode resource")]
    Encode(#[from] serde_json::Error),

    /// Any other store/transport failure. Displays the underlying error so a
    /// single-line log still says what went wrong.
    #[error("resource store request failed: {0}")]
    Request(#[from] kube::Error),
}

/// Desired+observed state store for [`ISCSIConnection`] resources.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Fetch a resource by key. A deleted resource is `Ok(None)`, not an
    /// error; deletion is not the reconciler's concern.
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ISCSIConnection>, StoreError>;

    /// Persist the status of the caller-supplied in-memory resource.
    ///
    /// The supplied object carries the resource version the caller read, so a
    /// concurrent modification surfaces as [`StoreError::Conflict`]. The store
    /// never retries on conflict.
    async fn update_status(&self, cr: &ISCSIConnection) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_error_displays_the_underlying_cause() {
        let err = StoreError::Request(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "iscsiconnections.openebs.io is forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        }));
        assert!(err.to_string().contains("forbidden"));
    }
}
