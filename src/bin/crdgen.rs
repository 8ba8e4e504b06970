//! Prints the ISCSIConnection CRD manifest as YAML.
//!
//! Usage: `cargo run --bin crdgen | kubectl apply -f -`

use iscsi_connection_controller::crd::ISCSIConnection;
use kube::CustomResourceExt;

fn main() {
    let crd = ISCSIConnection::crd();
    print!(
        "{}",
        serde_yaml::to_string(&crd).expect("failed to serialize ISCSIConnection CRD")
    );
}
