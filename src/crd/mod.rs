//! # Custom Resource Definitions
//!
//! CRD types for the ISCSIConnection controller.
//!
//! The wire shape (field names and phase literals) is fixed: external writers
//! create these resources and other consumers read them, so serde renames pin
//! every field to its published name.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// ISCSIConnection Custom Resource Definition
///
/// Declares the desired state of one host's connection to an iSCSI target.
/// The spec is written once by an external provisioner; this controller only
/// ever writes the status.
///
/// # Example
///
/// ```yaml
/// apiVersion: openebs.io/v1alpha1
/// kind: ISCSIConnection
/// metadata:
///   name: pvc-8e9c7a52
///   namespace: default
/// spec:
///   volume_name: pvc-8e9c7a52
///   target_iqn: iqn.2016-09.com.openebs.jiva:pvc-8e9c7a52
///   target_portals: ["10.4.0.11:3260"]
///   port: "3260"
///   lun: 0
///   auth_type: none
///   node_name: worker-1
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ISCSIConnection",
    group = "openebs.io",
    version = "v1alpha1",
    namespaced,
    status = "ISCSIConnectionStatus",
    shortname = "isc",
    printcolumn = r#"{"name":"Node", "type":"string", "jsonPath":".spec.node_name"}, {"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Status", "type":"string", "jsonPath":".status.status"}"#
)]
pub struct ISCSIConnectionSpec {
    /// Name of the volume this connection attaches
    pub volume_name: String,
    /// iSCSI qualified name of the target
    pub target_iqn: String,
    /// Ordered list of portal addresses the target is reachable at
    pub target_portals: Vec<String>,
    /// Target port, appended to portals that carry no port of their own
    #[serde(default)]
    pub port: String,
    /// Logical unit number of the volume on the target
    #[serde(default)]
    pub lun: i32,
    /// Authentication scheme for discovery and session phases
    #[serde(default)]
    pub auth_type: AuthType,
    /// Node that should hold the session; all other nodes ignore the resource
    pub node_name: String,
    /// CHAP credentials used during the discovery phase
    #[serde(default)]
    pub discovery_secrets: Secrets,
    /// CHAP credentials used during the session phase
    #[serde(default)]
    pub session_secrets: Secrets,
    /// open-iscsi interface name to bind the session to
    #[serde(default)]
    pub interface: String,
    /// Log in to every portal and rely on multipathing on top of the paths
    #[serde(default)]
    pub multipath: bool,
    /// Attempts the connector makes while waiting for the device to appear
    #[serde(default)]
    pub retry_count: i32,
    /// Seconds between device health/appearance checks
    #[serde(default)]
    pub check_interval: i32,
    /// Session replacement timeout forwarded to the connector
    #[serde(default)]
    pub replacement_timeout: String,
    /// The attached device already carries a filesystem
    // Original wire spelling, kept for compatibility.
    #[serde(rename = "isFormated", default)]
    pub is_formatted: bool,
}

/// Authentication scheme for an iSCSI connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// No authentication
    #[default]
    None,
    /// Challenge-handshake authentication
    Chap,
}

/// CHAP credentials for one phase of the connection.
///
/// `user_name`/`password` are mandatory whenever the auth type requires
/// authentication; the `*_in` pair is populated only for mutual/directional
/// CHAP and is otherwise empty. Password material is zeroized on drop.
#[derive(Clone, Default, Deserialize, Serialize, JsonSchema, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Secrets {
    /// Kind of secret ("chap" is the only implemented kind)
    #[serde(default)]
    pub secrets_type: String,
    /// Outgoing CHAP user name
    #[serde(default)]
    pub user_name: String,
    /// Outgoing CHAP password
    #[serde(default)]
    pub password: String,
    /// Incoming user name for mutual CHAP
    #[serde(default)]
    pub user_name_in: String,
    /// Incoming password for mutual CHAP
    #[serde(default)]
    pub password_in: String,
}

impl Secrets {
    /// True when no credential fields are populated at all.
    pub fn is_empty(&self) -> bool {
        self.user_name.is_empty()
            && self.password.is_empty()
            && self.user_name_in.is_empty()
            && self.password_in.is_empty()
    }
}

// Manual Debug so passwords never reach logs.
impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("secrets_type", &self.secrets_type)
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("user_name_in", &self.user_name_in)
            .field("password_in", &"<redacted>")
            .finish()
    }
}

/// Progress of the connect/disconnect lifecycle.
///
/// The variant names are the literal wire strings. A freshly created resource
/// has no status at all; absence of a phase must be read as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
pub enum ISCSIConnectionPhase {
    /// The connection is yet to be established
    #[default]
    Pending,
    /// Login with the target failed
    LoginFailed,
    /// The session is established and login succeeded
    LoginSuccessful,
    /// Logout from the target failed
    LogoutFailed,
    /// The session was torn down successfully
    LogoutSuccessful,
    /// Logout has been requested by an external writer
    LogoutStart,
}

impl fmt::Display for ISCSIConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let literal = match self {
            Self::Pending => "Pending",
            Self::LoginFailed => "LoginFailed",
            Self::LoginSuccessful => "LoginSuccessful",
            Self::LogoutFailed => "LogoutFailed",
            Self::LogoutSuccessful => "LogoutSuccessful",
            Self::LogoutStart => "LogoutStart",
        };
        f.write_str(literal)
    }
}

/// Observed state of an ISCSIConnection
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ISCSIConnectionStatus {
    /// Human-readable description of the current state
    #[serde(default)]
    pub status: String,
    /// Current phase of the connection lifecycle
    #[serde(default)]
    pub phase: ISCSIConnectionPhase,
}

impl ISCSIConnection {
    /// Effective phase of the resource; a missing status reads as `Pending`.
    pub fn phase(&self) -> ISCSIConnectionPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_to_wire_literals() {
        let literals = [
            (ISCSIConnectionPhase::Pending, "\"Pending\""),
            (ISCSIConnectionPhase::LoginFailed, "\"LoginFailed\""),
            (ISCSIConnectionPhase::LoginSuccessful, "\"LoginSuccessful\""),
            (ISCSIConnectionPhase::LogoutFailed, "\"LogoutFailed\""),
            (ISCSIConnectionPhase::LogoutSuccessful, "\"LogoutSuccessful\""),
            (ISCSIConnectionPhase::LogoutStart, "\"LogoutStart\""),
        ];
        for (phase, wire) in literals {
            assert_eq!(serde_json::to_string(&phase).unwrap(), wire);
            assert_eq!(
                serde_json::from_str::<ISCSIConnectionPhase>(wire).unwrap(),
                phase
            );
        }
    }

    #[test]
    fn missing_status_reads_as_pending() {
        let cr: ISCSIConnection = serde_json::from_value(serde_json::json!({
            "apiVersion": "openebs.io/v1alpha1",
            "kind": "ISCSIConnection",
            "metadata": { "name": "vol-1", "namespace": "default" },
            "spec": {
                "volume_name": "vol-1",
                "target_iqn": "iqn.2016-09.com.openebs.jiva:vol-1",
                "target_portals": ["10.4.0.11:3260"],
                "node_name": "worker-1"
            }
        }))
        .unwrap();
        assert!(cr.status.is_none());
        assert_eq!(cr.phase(), ISCSIConnectionPhase::Pending);
    }

    #[test]
    fn spec_keeps_original_wire_names() {
        let spec: ISCSIConnectionSpec = serde_json::from_value(serde_json::json!({
            "volume_name": "vol-1",
            "target_iqn": "iqn.2016-09.com.openebs.jiva:vol-1",
            "target_portals": ["10.4.0.11:3260", "10.4.0.12:3260"],
            "port": "3260",
            "lun": 1,
            "auth_type": "chap",
            "node_name": "worker-1",
            "session_secrets": {
                "secretsType": "chap",
                "userName": "admin",
                "password": "s3cret"
            },
            "isFormated": true
        }))
        .unwrap();
        assert_eq!(spec.auth_type, AuthType::Chap);
        assert_eq!(spec.session_secrets.user_name, "admin");
        assert!(spec.is_formatted);

        let round_trip = serde_json::to_value(&spec).unwrap();
        assert!(round_trip.get("isFormated").is_some());
        assert!(round_trip.get("is_formatted").is_none());
        assert_eq!(round_trip["session_secrets"]["userName"], "admin");
    }

    #[test]
    fn secrets_debug_redacts_passwords() {
        let secrets = Secrets {
            secrets_type: "chap".into(),
            user_name: "admin".into(),
            password: "s3cret".into(),
            user_name_in: String::new(),
            password_in: "reverse".into(),
        };
        let printed = format!("{secrets:?}");
        assert!(!printed.contains("s3cret"));
        assert!(!printed.contains("reverse"));
        assert!(printed.contains("admin"));
    }
}
