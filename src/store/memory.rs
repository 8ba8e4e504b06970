//! # In-Memory Store
//!
//! [`ConnectionStore`] double used by the integration test-suite. Holds
//! resources in a map and can be told to reject status writes the way the API
//! server rejects a conflicting update.

use crate::crd::ISCSIConnection;
use crate::store::{ConnectionStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-memory [`ConnectionStore`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: Mutex<HashMap<(String, String), ISCSIConnection>>,
    fail_status_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a resource.
    pub fn insert(&self, cr: ISCSIConnection) {
        let key = Self::key_of(&cr);
        self.items
            .lock()
            .expect("store mutex poisoned")
            .insert(key, cr);
    }

    /// Make every subsequent status write fail with a conflict.
    pub fn reject_status_writes(&self) {
        self.fail_status_writes.store(true, Ordering::Relaxed);
    }

    /// Current copy of a stored resource, for assertions.
    pub fn stored(&self, namespace: &str, name: &str) -> Option<ISCSIConnection> {
        self.items
            .lock()
            .expect("store mutex poisoned")
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn key_of(cr: &ISCSIConnection) -> (String, String) {
        (
            cr.metadata
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            cr.metadata.name.clone().unwrap_or_default(),
        )
    }
}

#[async_trait]
impl ConnectionStore for InMemoryStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ISCSIConnection>, StoreError> {
        Ok(self.stored(namespace, name))
    }

    async fn update_status(&self, cr: &ISCSIConnection) -> Result<(), StoreError> {
        if self.fail_status_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Conflict {
                name: cr.metadata.name.clone().unwrap_or_default(),
                message: "the object has been modified".to_string(),
            });
        }
        self.insert(cr.clone());
        Ok(())
    }
}
