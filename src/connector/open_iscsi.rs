//! # open-iscsi Connector
//!
//! [`Connector`] implementation that drives the host's `iscsiadm` utility:
//! sendtargets discovery, CHAP node parameters, login, a wait for the device
//! path, and logout plus node-record cleanup on teardown.

use crate::connector::{ChapCredentials, ConnectRequest, Connector, ConnectorError};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// iscsiadm exit code for "session already exists" on login.
const EXIT_SESSION_EXISTS: i32 = 15;
/// iscsiadm exit code for "no records/sessions found" on logout/delete.
const EXIT_NO_RECORDS: i32 = 21;

/// Connector backed by the host `iscsiadm` binary.
#[derive(Debug, Clone)]
pub struct OpenIscsiConnector {
    iscsiadm: String,
}

impl Default for OpenIscsiConnector {
    fn default() -> Self {
        Self {
            iscsiadm: "iscsiadm".to_string(),
        }
    }
}

impl OpenIscsiConnector {
    /// Use a specific iscsiadm binary (e.g. a chroot wrapper on a host mount).
    pub fn with_binary(iscsiadm: impl Into<String>) -> Self {
        Self {
            iscsiadm: iscsiadm.into(),
        }
    }

    /// Run iscsiadm with `args`, tolerating the exit codes in `ok_codes`.
    async fn run(&self, args: &[&str], ok_codes: &[i32]) -> Result<String, ConnectorError> {
        let rendered = format!("{} {}", self.iscsiadm, args.join(" "));
        debug!(command = %rendered, "running iscsiadm");

        let output = tokio::process::Command::new(&self.iscsiadm)
            .args(args)
            .output()
            .await
            .map_err(|source| ConnectorError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let code = output.status.code().unwrap_or(-1);
        if output.status.success() || ok_codes.contains(&code) {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(ConnectorError::CommandFailed {
                command: rendered,
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn discover(&self, portal: &str, request: &ConnectRequest) -> Result<(), ConnectorError> {
        match &request.discovery_secrets {
            None => {
                let mut args = vec!["-m", "discovery", "-t", "sendtargets", "-p", portal];
                if !request.interface.is_empty() {
                    args.extend(["-I", request.interface.as_str()]);
                }
                self.run(&args, &[]).await.map(|_| ())
            }
            Some(credentials) => {
                // Discovery CHAP goes through the discoverydb so the auth
                // parameters are recorded before the actual discovery runs.
                let base = ["-m", "discoverydb", "-t", "sendtargets", "-p", portal];
                let mut new_args = base.to_vec();
                new_args.extend(["-o", "new"]);
                if !request.interface.is_empty() {
                    new_args.extend(["-I", request.interface.as_str()]);
                }
                self.run(&new_args, &[]).await?;

                for (key, value) in [
                    ("discovery.sendtargets.auth.authmethod", "CHAP"),
                    (
                        "discovery.sendtargets.auth.username",
                        credentials.user_name.as_str(),
                    ),
                    (
                        "discovery.sendtargets.auth.password",
                        credentials.password.as_str(),
                    ),
                ] {
                    let mut update_args = base.to_vec();
                    update_args.extend(["-o", "update", "-n", key, "-v", value]);
                    self.run(&update_args, &[]).await?;
                }
                if credentials.is_mutual() {
                    for (key, value) in [
                        (
                            "discovery.sendtargets.auth.username_in",
                            credentials.user_name_in.as_str(),
                        ),
                        (
                            "discovery.sendtargets.auth.password_in",
                            credentials.password_in.as_str(),
                        ),
                    ] {
                        let mut update_args = base.to_vec();
                        update_args.extend(["-o", "update", "-n", key, "-v", value]);
                        self.run(&update_args, &[]).await?;
                    }
                }

                let mut discover_args = base.to_vec();
                discover_args.push("--discover");
                self.run(&discover_args, &[]).await.map(|_| ())
            }
        }
    }

    async fn apply_session_auth(
        &self,
        target_iqn: &str,
        portal: &str,
        credentials: &ChapCredentials,
    ) -> Result<(), ConnectorError> {
        self.update_node(target_iqn, portal, "node.session.auth.authmethod", "CHAP")
            .await?;
        self.update_node(
            target_iqn,
            portal,
            "node.session.auth.username",
            &credentials.user_name,
        )
        .await?;
        self.update_node(
            target_iqn,
            portal,
            "node.session.auth.password",
            &credentials.password,
        )
        .await?;
        if credentials.is_mutual() {
            self.update_node(
                target_iqn,
                portal,
                "node.session.auth.username_in",
                &credentials.user_name_in,
            )
            .await?;
            self.update_node(
                target_iqn,
                portal,
                "node.session.auth.password_in",
                &credentials.password_in,
            )
            .await?;
        }
        Ok(())
    }

    async fn update_node(
        &self,
        target_iqn: &str,
        portal: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ConnectorError> {
        self.run(
            &[
                "-m", "node", "-T", target_iqn, "-p", portal, "-o", "update", "-n", key, "-v",
                value,
            ],
            &[],
        )
        .await
        .map(|_| ())
    }

    async fn login(&self, target_iqn: &str, portal: &str) -> Result<(), ConnectorError> {
        // An already-established session is not a failure; re-entry after a
        // crashed status write must converge.
        self.run(
            &["-m", "node", "-T", target_iqn, "-p", portal, "--login"],
            &[EXIT_SESSION_EXISTS],
        )
        .await
        .map(|_| ())
    }

    /// Poll for the by-path device node, honoring the request's retry budget.
    async fn wait_for_device(
        &self,
        request: &ConnectRequest,
        portal: &str,
    ) -> Result<String, ConnectorError> {
        let path = device_path(portal, &request.target_iqn, request.lun);
        let attempts = request.retry_count.max(1);
        let interval = Duration::from_secs(u64::from(request.check_interval.max(1)));

        for attempt in 0..attempts {
            if Path::new(&path).exists() {
                return Ok(path);
            }
            debug!(%path, attempt, "device not present yet");
            // Sleep only between checks; the last failed check reports
            // straight away.
            if attempt + 1 < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        Err(ConnectorError::DeviceNotFound {
            target_iqn: request.target_iqn.clone(),
            lun: request.lun,
            attempts,
        })
    }
}

/// Device node udev publishes for a logged-in path.
fn device_path(portal: &str, target_iqn: &str, lun: i32) -> String {
    format!("/dev/disk/by-path/ip-{portal}-iscsi-{target_iqn}-lun-{lun}")
}

#[async_trait]
impl Connector for OpenIscsiConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<String, ConnectorError> {
        if request.target_portals.is_empty() {
            return Err(ConnectorError::Other(
                "connect request has no target portals".to_string(),
            ));
        }

        // With multipath every portal gets a session; otherwise only the
        // first portal is used and the rest stay as fallbacks for the writer.
        let portals: &[String] = if request.multipath {
            &request.target_portals
        } else {
            &request.target_portals[..1]
        };

        let mut first_device = None;
        for portal in portals {
            self.discover(portal, request).await?;
            if let Some(credentials) = &request.session_secrets {
                self.apply_session_auth(&request.target_iqn, portal, credentials)
                    .await?;
            }
            self.login(&request.target_iqn, portal).await?;
            let device = self.wait_for_device(request, portal).await?;
            info!(target_iqn = %request.target_iqn, %portal, %device, "iscsi login complete");
            first_device.get_or_insert(device);
        }

        Ok(first_device.unwrap_or_default())
    }

    async fn disconnect(
        &self,
        target_iqn: &str,
        portals: &[String],
    ) -> Result<(), ConnectorError> {
        for portal in portals {
            // Missing records mean the session is already gone; teardown is
            // idempotent.
            self.run(
                &["-m", "node", "-T", target_iqn, "-p", portal, "--logout"],
                &[EXIT_NO_RECORDS],
            )
            .await?;
            self.run(
                &["-m", "node", "-o", "delete", "-T", target_iqn, "-p", portal],
                &[EXIT_NO_RECORDS],
            )
            .await?;
            info!(%target_iqn, %portal, "iscsi logout complete");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ConnectRequest {
        ConnectRequest {
            volume_name: "vol-1".into(),
            target_iqn: "iqn.2016-09.com.openebs.jiva:vol-1".into(),
            target_portals: vec!["10.4.0.11:3260".into()],
            lun: 0,
            discovery_secrets: None,
            session_secrets: None,
            interface: String::new(),
            multipath: false,
            retry_count: 3,
            check_interval: 100,
        }
    }

    #[tokio::test]
    async fn connect_rejects_empty_portal_list() {
        let mut req = request();
        req.target_portals.clear();
        let err = OpenIscsiConnector::default()
            .connect(&req)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Other(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn device_wait_sleeps_only_between_checks() {
        let connector = OpenIscsiConnector::default();
        let req = request();
        let started = tokio::time::Instant::now();

        let err = connector
            .wait_for_device(&req, "10.4.0.11:3260")
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::DeviceNotFound { .. }));
        // 3 checks, 2 intervals of 100s in between; no trailing sleep.
        assert_eq!(started.elapsed(), Duration::from_secs(200));
    }

    #[test]
    fn device_path_matches_udev_layout() {
        assert_eq!(
            device_path("10.4.0.11:3260", "iqn.2016-09.com.openebs.jiva:vol-1", 0),
            "/dev/disk/by-path/ip-10.4.0.11:3260-iscsi-iqn.2016-09.com.openebs.jiva:vol-1-lun-0"
        );
    }

    #[test]
    fn connector_defaults_to_path_lookup() {
        assert_eq!(OpenIscsiConnector::default().iscsiadm, "iscsiadm");
        assert_eq!(
            OpenIscsiConnector::with_binary("/host/sbin/iscsiadm").iscsiadm,
            "/host/sbin/iscsiadm"
        );
    }
}
