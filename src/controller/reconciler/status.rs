//! # Status Management
//!
//! Writes connect/disconnect outcomes back into ISCSIConnection status as a
//! phase transition, idempotently.

use crate::crd::{ISCSIConnection, ISCSIConnectionPhase};
use crate::store::{ConnectionStore, StoreError};
use tracing::debug;

/// Overwrite the phase on the caller-supplied in-memory resource and persist
/// it through the store.
///
/// The caller's object is used as-is (no fresh read) so fields set earlier in
/// the same reconcile pass are not lost, and its resource version drives the
/// store's optimistic-concurrency check. Store errors are surfaced to the
/// caller; they do not roll back the connector side effect that already
/// happened.
pub async fn set_phase(
    store: &dyn ConnectionStore,
    cr: &mut ISCSIConnection,
    phase: ISCSIConnectionPhase,
) -> Result<(), StoreError> {
    // Skip the write when the phase is already current. This keeps re-entry
    // after redelivery from generating watch churn.
    if cr.status.as_ref().map(|s| s.phase) == Some(phase) {
        debug!(%phase, "skipping status update - phase unchanged");
        return Ok(());
    }

    let status = cr.status.get_or_insert_with(Default::default);
    status.phase = phase;
    status.status = describe_phase(phase).to_string();
    store.update_status(cr).await
}

/// Human-readable message accompanying each phase.
fn describe_phase(phase: ISCSIConnectionPhase) -> &'static str {
    match phase {
        ISCSIConnectionPhase::Pending => "waiting for connection to be established",
        ISCSIConnectionPhase::LoginFailed => "failed to login with target",
        ISCSIConnectionPhase::LoginSuccessful => "connection established and login successful",
        ISCSIConnectionPhase::LogoutFailed => "failed to logout from target",
        ISCSIConnectionPhase::LogoutSuccessful => "logged out from target",
        ISCSIConnectionPhase::LogoutStart => "logout requested",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ISCSIConnectionSpec, ISCSIConnectionStatus};
    use crate::store::InMemoryStore;

    fn connection() -> ISCSIConnection {
        let mut cr = ISCSIConnection::new(
            "vol-1",
            ISCSIConnectionSpec {
                volume_name: "vol-1".into(),
                target_iqn: "iqn.2016-09.com.openebs.jiva:vol-1".into(),
                target_portals: vec!["10.4.0.11:3260".into()],
                port: String::new(),
                lun: 0,
                auth_type: Default::default(),
                node_name: "worker-1".into(),
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
        cr
    }

    #[tokio::test]
    async fn persists_phase_and_message() {
        let store = InMemoryStore::new();
        let mut cr = connection();
        store.insert(cr.clone());

        set_phase(&store, &mut cr, ISCSIConnectionPhase::LoginSuccessful)
            .await
            .unwrap();

        let stored = store.stored("default", "vol-1").unwrap();
        let status = stored.status.unwrap();
        assert_eq!(status.phase, ISCSIConnectionPhase::LoginSuccessful);
        assert_eq!(status.status, "connection established and login successful");
    }

    #[tokio::test]
    async fn unchanged_phase_skips_the_write() {
        let store = InMemoryStore::new();
        let mut cr = connection();
        cr.status = Some(ISCSIConnectionStatus {
            status: String::new(),
            phase: ISCSIConnectionPhase::LoginSuccessful,
        });
        // Writes are rejected, so only the skip path can return Ok.
        store.reject_status_writes();

        set_phase(&store, &mut cr, ISCSIConnectionPhase::LoginSuccessful)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn conflict_is_surfaced_to_the_caller() {
        let store = InMemoryStore::new();
        let mut cr = connection();
        store.insert(cr.clone());
        store.reject_status_writes();

        let err = set_phase(&store, &mut cr, ISCSIConnectionPhase::LoginFailed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }
}
