//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, HTTP server
//! startup, Kubernetes client setup, host identity, and a first pass over
//! resources that already exist.

use crate::connector::OpenIscsiConnector;
use crate::constants;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::{start_server, ServerState};
use crate::crd::ISCSIConnection;
use crate::observability;
use crate::store::KubeStore;
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for the ISCSIConnection CRD
    pub connections: Api<ISCSIConnection>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult").finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Host identity (NODE_NAME)
/// - Kubernetes client creation
/// - Reconciler setup
/// - Reconcile existing resources
pub async fn initialize() -> Result<InitializationResult> {
    // Configure rustls crypto provider FIRST, before any other operations.
    // Required for rustls 0.23+ when no default provider is set via features.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iscsi_connection_controller=info".into()),
        )
        .init();

    info!("Starting ISCSIConnection Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    // Initialize metrics
    observability::metrics::register_metrics()?;

    // Host identity is read exactly once; the eligibility filter receives it
    // as an injected value, never from ad-hoc env lookups.
    let node_name = std::env::var(constants::NODE_NAME_ENV).with_context(|| {
        format!(
            "{} must be set to the name of the node this controller runs on",
            constants::NODE_NAME_ENV
        )
    })?;
    info!("Host identity: {node_name}");

    // Create server state
    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(std::sync::atomic::AtomicBool::new(false)),
    });

    // Start HTTP server for metrics and probes in a background task, then
    // wait for it to be ready so readiness probes pass immediately.
    let server_state_clone = Arc::clone(&server_state);
    let server_port = std::env::var("METRICS_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(constants::DEFAULT_METRICS_PORT);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {e}");
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    // Create Kubernetes client
    let client = Client::try_default().await?;

    // Watch all namespaces; eligibility filtering happens per resource.
    let connections: Api<ISCSIConnection> = Api::all(client.clone());

    // Create reconciler context
    let store = Arc::new(KubeStore::new(client.clone()));
    let connector = Arc::new(OpenIscsiConnector::default());
    let reconciler = Arc::new(Reconciler::new(store, connector, node_name));

    // Reconcile resources that existed before the controller started;
    // without this, resources created earlier would wait for their next
    // change to be converged.
    reconcile_existing_resources(&connections, &reconciler).await?;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        connections,
        reconciler,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout =
        std::time::Duration::from_secs(constants::DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval =
        std::time::Duration::from_millis(constants::DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = std::time::Instant::now();

    loop {
        // Check if server task crashed
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Reconcile existing ISCSIConnection resources before starting the watch.
async fn reconcile_existing_resources(
    connections: &Api<ISCSIConnection>,
    reconciler: &Arc<Reconciler>,
) -> Result<()> {
    match connections.list(&ListParams::default()).await {
        Ok(list) => {
            info!(
                "CRD is queryable, found {} existing ISCSIConnection resources",
                list.items.len()
            );

            for item in &list.items {
                let name = item.metadata.name.as_deref().unwrap_or("unknown");
                let namespace = item.metadata.namespace.as_deref().unwrap_or("default");
                info!("Reconciling existing resource: {namespace}/{name}");

                match reconcile(Arc::new(item.clone()), Arc::clone(reconciler)).await {
                    Ok(_action) => {
                        info!("Successfully reconciled existing resource: {namespace}/{name}");
                    }
                    Err(e) => {
                        // Continue with other resources even if one fails;
                        // the watch will requeue it.
                        error!("Failed to reconcile existing resource {namespace}/{name}: {e}");
                    }
                }
            }
        }
        Err(e) => {
            error!("CRD is not queryable; {e:?}. Is the CRD installed?");
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            // Don't exit - the controller will keep retrying via the watch.
            warn!("Continuing despite CRD queryability check failure - controller will retry");
        }
    }

    Ok(())
}
