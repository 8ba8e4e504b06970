//! # ISCSIConnection Controller
//!
//! A Kubernetes controller that converges host-level iSCSI sessions to
//! declarative `ISCSIConnection` resources.
//!
//! ## Overview
//!
//! Each `ISCSIConnection` resource declares a remote block-storage target
//! (IQN, portals, LUN, CHAP credentials) and the node that should hold the
//! session. This controller:
//!
//! 1. **Watches ISCSIConnection resources** across all namespaces
//! 2. **Filters by node** - only the node named in `spec.node_name` acts on a
//!    resource; every other controller instance ignores it
//! 3. **Logs in** - resources in `Pending` are connected through the
//!    open-iscsi connector and move to `LoginSuccessful` or `LoginFailed`
//! 4. **Logs out** - resources moved to `LogoutStart` are disconnected and
//!    move to `LogoutSuccessful` or `LogoutFailed`
//! 5. **Reports status** - every connect/disconnect outcome is persisted to
//!    `status.phase`, idempotently
//!
//! Prometheus metrics and health probes are exposed over HTTP.

use anyhow::Result;

use iscsi_connection_controller::runtime::initialization::initialize;
use iscsi_connection_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the controller runtime
    let init_result = initialize().await?;

    // Run the watch loop
    run_watch_loop(
        init_result.connections,
        init_result.reconciler,
        init_result.server_state,
    )
    .await?;

    Ok(())
}
