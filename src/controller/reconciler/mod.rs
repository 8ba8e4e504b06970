//! # Reconciliation State Machine
//!
//! Converges host-level iSCSI connection state to the state declared by an
//! ISCSIConnection resource. One reconcile invocation processes one resource
//! key to completion; the watch substrate serializes repeated notifications
//! for the same key and may redeliver at-least-once in any order, so every
//! path here is safe to re-run.
//!
//! Phase dispatch:
//!
//! | Current phase     | Action     | Success          | Failure      |
//! |-------------------|------------|------------------|--------------|
//! | Pending (or none) | connect    | LoginSuccessful  | LoginFailed  |
//! | LogoutStart       | disconnect | LogoutSuccessful | LogoutFailed |
//! | anything else     | no-op      |                  |              |

pub mod eligibility;
pub mod status;

use crate::connector::{ConnectRequest, Connector, ConnectorError, TranslationError};
use crate::constants;
use crate::controller::backoff::FibonacciBackoff;
use crate::crd::{ISCSIConnection, ISCSIConnectionPhase};
use crate::observability;
use crate::store::{ConnectionStore, StoreError};
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors surfaced by the top-level reconcile operation.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Configuration error: the resource cannot be converged without a target
    /// host. The phase is left untouched and no automatic retry is scheduled.
    #[error("login failed as node_name is empty")]
    MissingNodeName,

    /// The spec could not be mapped to a connection request.
    #[error("failed to build connection request: {0}")]
    Translation(#[from] TranslationError),

    /// The connector rejected the login/logout.
    #[error("connector operation failed: {0}")]
    Connector(#[from] ConnectorError),

    /// The connector reported success but produced no usable device.
    #[error("connection successful but returned empty device path")]
    EmptyDevicePath,

    /// The resource store failed while loading the resource.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-resource error backoff state, consumed by the runtime error policy.
#[derive(Debug)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

/// Reconciler context shared across all reconcile invocations.
pub struct Reconciler {
    store: Arc<dyn ConnectionStore>,
    connector: Arc<dyn Connector>,
    /// Identity of the host this instance runs on, injected once at startup.
    node_name: String,
    /// Backoff state per resource key, owned here but driven by the runtime
    /// error policy.
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("node_name", &self.node_name)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        connector: Arc<dyn Connector>,
        node_name: String,
    ) -> Self {
        Self {
            store,
            connector,
            node_name,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Converge one resource key to its declared state.
    ///
    /// Invoked repeatedly and concurrently-over-time for the same key; a
    /// converged resource is a no-op and a resource deleted between enqueue
    /// and processing is a success.
    pub async fn reconcile_key(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError> {
        let Some(mut cr) = self.store.get(namespace, name).await? else {
            // Deleted after the notification was enqueued. Garbage collection
            // of gone resources is the substrate's concern, not ours.
            debug!("ISCSIConnection {namespace}/{name} no longer exists, nothing to do");
            return Ok(());
        };

        if cr.spec.node_name.is_empty() {
            return Err(ReconcilerError::MissingNodeName);
        }

        if !eligibility::is_eligible_node(&cr.spec.node_name, &self.node_name) {
            debug!(
                declared_node = %cr.spec.node_name,
                host_node = %self.node_name,
                "node name does not match this host, ignoring resource"
            );
            return Ok(());
        }

        match cr.phase() {
            ISCSIConnectionPhase::Pending => self.connect(&mut cr).await,
            ISCSIConnectionPhase::LogoutStart => self.disconnect(&mut cr).await,
            phase => {
                debug!(%phase, "nothing to converge for current phase");
                Ok(())
            }
        }
    }

    /// Connect path: Pending -> LoginSuccessful | LoginFailed.
    async fn connect(&self, cr: &mut ISCSIConnection) -> Result<(), ReconcilerError> {
        let outcome = self.login(cr).await;

        // The phase transition happens on every exit path. A failed status
        // write is logged and surfaced to metrics but does not undo the login
        // that already completed; the next notification re-runs this no-op.
        let phase = if outcome.is_ok() {
            ISCSIConnectionPhase::LoginSuccessful
        } else {
            ISCSIConnectionPhase::LoginFailed
        };
        if let Err(err) = status::set_phase(self.store.as_ref(), cr, phase).await {
            observability::metrics::increment_status_write_failures();
            warn!(error = %err, %phase, "failed to update ISCSIConnection phase");
        }

        outcome.map(|device_path| {
            observability::metrics::increment_logins();
            info!(
                target_iqn = %cr.spec.target_iqn,
                %device_path,
                "logged in to target"
            );
        })
    }

    async fn login(&self, cr: &ISCSIConnection) -> Result<String, ReconcilerError> {
        let request = ConnectRequest::from_spec(&cr.spec)?;
        let device_path = self.connector.connect(&request).await?;
        if device_path.is_empty() {
            return Err(ReconcilerError::EmptyDevicePath);
        }
        Ok(device_path)
    }

    /// Disconnect path: LogoutStart -> LogoutSuccessful | LogoutFailed.
    /// Teardown needs only the target IQN and portal list.
    async fn disconnect(&self, cr: &mut ISCSIConnection) -> Result<(), ReconcilerError> {
        let outcome = self
            .connector
            .disconnect(&cr.spec.target_iqn, &cr.spec.target_portals)
            .await;

        let phase = if outcome.is_ok() {
            ISCSIConnectionPhase::LogoutSuccessful
        } else {
            ISCSIConnectionPhase::LogoutFailed
        };
        if let Err(err) = status::set_phase(self.store.as_ref(), cr, phase).await {
            observability::metrics::increment_status_write_failures();
            warn!(error = %err, %phase, "failed to update ISCSIConnection phase");
        }

        outcome
            .map(|()| {
                observability::metrics::increment_logouts();
                info!(target_iqn = %cr.spec.target_iqn, "logged out from target");
            })
            .map_err(Into::into)
    }

    /// Advance and return the error backoff for a resource key, in seconds.
    pub fn next_backoff_seconds(&self, resource_key: &str) -> u64 {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(|| BackoffState {
                        backoff: FibonacciBackoff::new(
                            constants::ERROR_BACKOFF_MIN_MINUTES,
                            constants::ERROR_BACKOFF_MAX_MINUTES,
                        ),
                        error_count: 0,
                    });
                state.increment_error();
                state.backoff.next_backoff_seconds()
            }
            Err(err) => {
                warn!("failed to lock backoff states: {err}, using default requeue");
                constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS
            }
        }
    }

    /// Drop the backoff state for a resource key after a successful reconcile.
    pub fn clear_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}

/// Top-level reconcile entry point for the watch substrate.
pub async fn reconcile(
    obj: Arc<ISCSIConnection>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    observability::metrics::increment_reconciliations();

    debug!("reconciling ISCSIConnection {namespace}/{name}");
    ctx.reconcile_key(namespace, name).await?;

    ctx.clear_backoff(&format!("{namespace}/{name}"));
    Ok(Action::await_change())
}
