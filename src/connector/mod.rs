//! # Connector Adapter
//!
//! Translates an [`ISCSIConnectionSpec`] into a protocol-agnostic
//! [`ConnectRequest`] and defines the [`Connector`] trait the reconciler
//! drives. The mapping is a statically validated function: a spec that cannot
//! be expressed as a request fails loudly with a [`TranslationError`] instead
//! of silently dropping fields.
//!
//! The adapter is stateless; the external connector is the source of truth
//! for active sessions.

pub mod open_iscsi;

pub use open_iscsi::OpenIscsiConnector;

use crate::crd::{AuthType, ISCSIConnectionSpec, Secrets};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A spec that cannot be mapped to a connection request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("target_iqn is empty")]
    MissingTargetIqn,

    #[error("target_portals is empty")]
    NoPortals,

    #[error("invalid target portal {0:?}")]
    InvalidPortal(String),

    /// CHAP was requested but the credential block is unusable.
    #[error("auth_type is chap but {0} secrets are missing a user name or password")]
    IncompleteChapCredentials(&'static str),
}

/// CHAP credential pair handed to the connector. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ChapCredentials {
    pub user_name: String,
    pub password: String,
    /// Incoming pair, populated only for mutual CHAP.
    pub user_name_in: String,
    pub password_in: String,
}

impl ChapCredentials {
    pub fn is_mutual(&self) -> bool {
        !self.user_name_in.is_empty() || !self.password_in.is_empty()
    }
}

impl fmt::Debug for ChapCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChapCredentials")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("user_name_in", &self.user_name_in)
            .field("password_in", &"<redacted>")
            .finish()
    }
}

/// Protocol-agnostic connection request, the connector's whole input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub volume_name: String,
    pub target_iqn: String,
    /// Portal addresses, each guaranteed to carry a port.
    pub target_portals: Vec<String>,
    pub lun: i32,
    pub discovery_secrets: Option<ChapCredentials>,
    pub session_secrets: Option<ChapCredentials>,
    pub interface: String,
    pub multipath: bool,
    /// Forwarded for the connector's own retry behavior; the reconciler never
    /// retries connector calls itself.
    pub retry_count: u32,
    pub check_interval: u32,
}

impl ConnectRequest {
    /// Map a resource spec to a connection request.
    ///
    /// Every field the connector needs is carried over explicitly; anything
    /// structurally unusable is a [`TranslationError`].
    pub fn from_spec(spec: &ISCSIConnectionSpec) -> Result<Self, TranslationError> {
        if spec.target_iqn.is_empty() {
            return Err(TranslationError::MissingTargetIqn);
        }
        if spec.target_portals.is_empty() {
            return Err(TranslationError::NoPortals);
        }

        let target_portals = spec
            .target_portals
            .iter()
            .map(|portal| normalize_portal(portal, &spec.port))
            .collect::<Result<Vec<_>, _>>()?;

        let discovery_secrets = credentials_from(&spec.discovery_secrets, "discovery")?;
        let session_secrets = credentials_from(&spec.session_secrets, "session")?;
        if spec.auth_type == AuthType::Chap && session_secrets.is_none() {
            return Err(TranslationError::IncompleteChapCredentials("session"));
        }

        Ok(Self {
            volume_name: spec.volume_name.clone(),
            target_iqn: spec.target_iqn.clone(),
            target_portals,
            lun: spec.lun,
            discovery_secrets,
            session_secrets,
            interface: spec.interface.clone(),
            multipath: spec.multipath,
            retry_count: spec.retry_count.max(0) as u32,
            check_interval: spec.check_interval.max(0) as u32,
        })
    }
}

/// Append `spec.port` to portals that carry no port of their own, and reject
/// addresses that cannot name a target endpoint.
fn normalize_portal(portal: &str, port: &str) -> Result<String, TranslationError> {
    let trimmed = portal.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(TranslationError::InvalidPortal(portal.to_string()));
    }
    if trimmed.contains(':') || port.is_empty() {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}:{port}"))
    }
}

/// Map a `Secrets` block to an optional credential pair.
///
/// An entirely empty block means "no credentials"; a half-filled pair is a
/// translation error rather than something to guess at.
fn credentials_from(
    secrets: &Secrets,
    which: &'static str,
) -> Result<Option<ChapCredentials>, TranslationError> {
    if secrets.is_empty() {
        return Ok(None);
    }
    if secrets.user_name.is_empty() || secrets.password.is_empty() {
        return Err(TranslationError::IncompleteChapCredentials(which));
    }
    Ok(Some(ChapCredentials {
        user_name: secrets.user_name.clone(),
        password: secrets.password.clone(),
        user_name_in: secrets.user_name_in.clone(),
        password_in: secrets.password_in.clone(),
    }))
}

/// Failures reported by a connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("device for target {target_iqn} lun {lun} did not appear after {attempts} attempts")]
    DeviceNotFound {
        target_iqn: String,
        lun: i32,
        attempts: u32,
    },

    #[error("{0}")]
    Other(String),
}

/// External collaborator performing the actual target login/logout.
///
/// Treated as a black box by the reconciler: calls are blocking and
/// potentially slow, and are never retried by the caller.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Discover, authenticate, and log in to the target described by
    /// `request`. Returns the path of the attached device.
    async fn connect(&self, request: &ConnectRequest) -> Result<String, ConnectorError>;

    /// Tear down the session(s) with `target_iqn` on the given portals.
    /// LUN and credentials are not required for teardown.
    async fn disconnect(&self, target_iqn: &str, portals: &[String])
        -> Result<(), ConnectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::AuthType;

    fn base_spec() -> ISCSIConnectionSpec {
        ISCSIConnectionSpec {
            volume_name: "vol-1".into(),
            target_iqn: "iqn.2016-09.com.openebs.jiva:vol-1".into(),
            target_portals: vec!["10.4.0.11:3260".into()],
            port: "3260".into(),
            lun: 0,
            auth_type: AuthType::None,
            node_name: "worker-1".into(),
            discovery_secrets: Secrets::default(),
            session_secrets: Secrets::default(),
            interface: String::new(),
            multipath: false,
            retry_count: 3,
            check_interval: 1,
            replacement_timeout: String::new(),
            is_formatted: false,
        }
    }

    #[test]
    fn maps_plain_spec() {
        let request = ConnectRequest::from_spec(&base_spec()).unwrap();
        assert_eq!(request.target_iqn, "iqn.2016-09.com.openebs.jiva:vol-1");
        assert_eq!(request.target_portals, vec!["10.4.0.11:3260".to_string()]);
        assert_eq!(request.retry_count, 3);
        assert!(request.session_secrets.is_none());
    }

    #[test]
    fn appends_port_to_bare_portals() {
        let mut spec = base_spec();
        spec.target_portals = vec!["10.4.0.11".into(), "10.4.0.12:3261".into()];
        let request = ConnectRequest::from_spec(&spec).unwrap();
        assert_eq!(
            request.target_portals,
            vec!["10.4.0.11:3260".to_string(), "10.4.0.12:3261".to_string()]
        );
    }

    #[test]
    fn rejects_empty_target_iqn() {
        let mut spec = base_spec();
        spec.target_iqn = String::new();
        assert_eq!(
            ConnectRequest::from_spec(&spec),
            Err(TranslationError::MissingTargetIqn)
        );
    }

    #[test]
    fn rejects_missing_portals() {
        let mut spec = base_spec();
        spec.target_portals.clear();
        assert_eq!(
            ConnectRequest::from_spec(&spec),
            Err(TranslationError::NoPortals)
        );
    }

    #[test]
    fn rejects_malformed_portal() {
        let mut spec = base_spec();
        spec.target_portals = vec!["10.4.0.11 3260".into()];
        assert!(matches!(
            ConnectRequest::from_spec(&spec),
            Err(TranslationError::InvalidPortal(_))
        ));
    }

    #[test]
    fn chap_requires_session_credentials() {
        let mut spec = base_spec();
        spec.auth_type = AuthType::Chap;
        assert_eq!(
            ConnectRequest::from_spec(&spec),
            Err(TranslationError::IncompleteChapCredentials("session"))
        );
    }

    #[test]
    fn chap_with_credentials_maps_both_blocks() {
        let mut spec = base_spec();
        spec.auth_type = AuthType::Chap;
        spec.session_secrets = Secrets {
            secrets_type: "chap".into(),
            user_name: "admin".into(),
            password: "s3cret".into(),
            user_name_in: "peer".into(),
            password_in: "p4ss".into(),
        };
        spec.discovery_secrets = Secrets {
            secrets_type: "chap".into(),
            user_name: "disco".into(),
            password: "d1sc0".into(),
            user_name_in: String::new(),
            password_in: String::new(),
        };
        let request = ConnectRequest::from_spec(&spec).unwrap();
        let session = request.session_secrets.unwrap();
        assert!(session.is_mutual());
        assert_eq!(session.user_name, "admin");
        let discovery = request.discovery_secrets.unwrap();
        assert!(!discovery.is_mutual());
    }

    #[test]
    fn half_filled_credentials_are_an_error() {
        let mut spec = base_spec();
        spec.session_secrets.user_name = "admin".into();
        assert_eq!(
            ConnectRequest::from_spec(&spec),
            Err(TranslationError::IncompleteChapCredentials("session"))
        );
    }

    #[test]
    fn negative_retry_count_clamps_to_zero() {
        let mut spec = base_spec();
        spec.retry_count = -5;
        let request = ConnectRequest::from_spec(&spec).unwrap();
        assert_eq!(request.retry_count, 0);
    }
}
