//! # Node Eligibility Filter
//!
//! Every controller instance observes every ISCSIConnection resource; only
//! the instance running on the declared node acts on one.

/// Returns true iff the resource's declared node is this host.
///
/// Exact, case-sensitive string comparison with no normalization. A mismatch
/// is not an error condition - the resource simply belongs to another node's
/// reconciler instance.
pub fn is_eligible_node(declared_node: &str, host_node: &str) -> bool {
    declared_node == host_node
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_node_is_eligible() {
        assert!(is_eligible_node("worker-1", "worker-1"));
    }

    #[test]
    fn different_node_is_not_eligible() {
        assert!(!is_eligible_node("worker-1", "worker-2"));
    }

    #[test]
    fn comparison_is_case_sensitive() {
        assert!(!is_eligible_node("Worker-1", "worker-1"));
    }

    #[test]
    fn no_whitespace_normalization() {
        assert!(!is_eligible_node("worker-1 ", "worker-1"));
    }
}
