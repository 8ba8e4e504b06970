//! # Error Policy
//!
//! Retry scheduling for failed reconciliations. The reconciler core never
//! retries internally; this layer decides whether and when a failed key is
//! requeued.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::ISCSIConnection;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Handle reconciliation errors with per-resource Fibonacci backoff.
///
/// Backoff state is tracked per resource so one persistently failing
/// resource does not affect the requeue schedule of any other.
pub fn handle_reconciliation_error(
    obj: Arc<ISCSIConnection>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    error!("Reconciliation error for {namespace}/{name}: {error}");
    observability::metrics::increment_reconciliation_errors();

    // Configuration errors cannot be fixed by retrying; wait for the
    // external writer to change the resource.
    if matches!(error, ReconcilerError::MissingNodeName) {
        observability::metrics::increment_requeues_total("config-error");
        return Action::await_change();
    }

    let resource_key = format!("{namespace}/{name}");
    let backoff_seconds = ctx.next_backoff_seconds(&resource_key);
    let next_retry = chrono::Utc::now() + chrono::Duration::seconds(backoff_seconds as i64);
    info!(
        "Retrying {resource_key} with Fibonacci backoff: {backoff_seconds}s (next attempt at {})",
        next_retry.to_rfc3339()
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::OpenIscsiConnector;
    use crate::crd::ISCSIConnectionSpec;
    use crate::store::InMemoryStore;

    fn context() -> Arc<Reconciler> {
        Arc::new(Reconciler::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(OpenIscsiConnector::default()),
            "node-a".to_string(),
        ))
    }

    fn connection() -> Arc<ISCSIConnection> {
        let mut cr = ISCSIConnection::new(
            "vol-1",
            ISCSIConnectionSpec {
                volume_name: "vol-1".into(),
                target_iqn: "iqn.2016-09.com.openebs.jiva:vol-1".into(),
                target_portals: vec!["10.4.0.11:3260".into()],
                port: String::new(),
                lun: 0,
                auth_type: Default::default(),
                node_name: "node-a".into(),
                discovery_secrets: Default::default(),
                session_secrets: Default::default(),
                interface: String::new(),
                multipath: false,
                retry_count: 0,
                check_interval: 0,
                replacement_timeout: String::new(),
                is_formatted: false,
            },
        );
        cr.metadata.namespace = Some("default".into());
        Arc::new(cr)
    }

    #[test]
    fn configuration_errors_wait_for_resource_change() {
        let action = handle_reconciliation_error(
            connection(),
            &ReconcilerError::MissingNodeName,
            context(),
        );
        assert_eq!(action, Action::await_change());
    }

    #[test]
    fn other_errors_requeue_with_growing_backoff() {
        let ctx = context();
        let error = ReconcilerError::EmptyDevicePath;

        let first = handle_reconciliation_error(connection(), &error, Arc::clone(&ctx));
        assert_eq!(first, Action::requeue(Duration::from_secs(60)));

        // Same key fails again: the sequence holds at 1m, then grows to 2m.
        let second = handle_reconciliation_error(connection(), &error, Arc::clone(&ctx));
        assert_eq!(second, Action::requeue(Duration::from_secs(60)));
        let third = handle_reconciliation_error(connection(), &error, ctx);
        assert_eq!(third, Action::requeue(Duration::from_secs(120)));
    }
}
