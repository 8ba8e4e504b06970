//! # Kubernetes Store
//!
//! [`ConnectionStore`] implementation backed by the Kubernetes API server.

use crate::crd::ISCSIConnection;
use crate::store::{ConnectionStore, StoreError};
use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::Client;
use std::fmt;

/// Resource store backed by `kube::Api<ISCSIConnection>`.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<ISCSIConnection> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl ConnectionStore for KubeStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ISCSIConnection>, StoreError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn update_status(&self, cr: &ISCSIConnection) -> Result<(), StoreError> {
        let namespace = cr.metadata.namespace.as_deref().unwrap_or("default");
        let name = cr
            .metadata
            .name
            .as_deref()
            .ok_or(StoreError::MissingMetadata("name"))?;

        // replace_status keeps the caller's resourceVersion in play, so the
        // API server detects concurrent modification (409) for us.
        let data = serde_json::to_vec(cr)?;
        match self
            .api(namespace)
            .replace_status(name, &PostParams::default(), data)
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 409 => {
                Err(StoreError::Conflict {
                    name: name.to_string(),
                    message: response.message,
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}
