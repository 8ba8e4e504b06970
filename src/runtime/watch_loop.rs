//! # Watch Loop
//!
//! Runs the kube-runtime controller over ISCSIConnection resources. Delivery
//! is at-least-once with no ordering guarantee; the reconciler is built to
//! tolerate both.

use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::ISCSIConnection;
use crate::runtime::error_policy::handle_reconciliation_error;
use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::controller::Controller;
use kube_runtime::watcher;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run the controller watch loop until shutdown.
pub async fn run_watch_loop(
    connections: Api<ISCSIConnection>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    server_state
        .is_ready
        .store(true, std::sync::atomic::Ordering::Relaxed);

    info!("Watching ISCSIConnection resources in all namespaces");

    Controller::new(connections, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((object_ref, _action)) => {
                    debug!("reconciled {object_ref}");
                }
                Err(err) => {
                    // Watch-stream level errors (expired resource versions,
                    // transient API failures); the controller restarts the
                    // watch on its own.
                    warn!("controller stream error: {err}");
                }
            }
        })
        .await;

    info!("Watch loop terminated, shutting down");
    Ok(())
}
