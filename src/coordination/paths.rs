//! Coordination node path layout
//!
//! ```text
//! /cdc-warden
//! ├── cluster/{address}                       process membership (ephemeral)
//! └── destinations/{destination}
//!     ├── running                             leadership marker (ephemeral)
//!     └── cluster/{address}                   destination membership (ephemeral)
//! ```

/// Root namespace
pub const ROOT: &str = "/cdc-warden";

/// Parent of every destination subtree
pub const DESTINATION_ROOT: &str = "/cdc-warden/destinations";

/// Parent of process membership markers
pub const CLUSTER_ROOT: &str = "/cdc-warden/cluster";

/// Subtree of one destination
pub fn destination_node(destination: &str) -> String {
    format!("{}/{}", DESTINATION_ROOT, destination)
}

/// Leadership marker of one destination
pub fn running_node(destination: &str) -> String {
    format!("{}/{}/running", DESTINATION_ROOT, destination)
}

/// Parent of the membership markers of one destination
pub fn destination_cluster_root(destination: &str) -> String {
    format!("{}/{}/cluster", DESTINATION_ROOT, destination)
}

/// Membership marker of one server for one destination
pub fn destination_cluster_node(destination: &str, address: &str) -> String {
    format!("{}/{}", destination_cluster_root(destination), address)
}

/// Process-level membership marker
pub fn process_cluster_node(address: &str) -> String {
    format!("{}/{}", CLUSTER_ROOT, address)
}

/// Parent path of a node; `/` for top-level nodes.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Last path segment
pub fn name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_paths() {
        assert_eq!(running_node("orders"), "/cdc-warden/destinations/orders/running");
        assert_eq!(
            destination_cluster_node("orders", "10.0.0.1:11111"),
            "/cdc-warden/destinations/orders/cluster/10.0.0.1:11111"
        );
        assert_eq!(process_cluster_node("10.0.0.1:11111"), "/cdc-warden/cluster/10.0.0.1:11111");
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent("/cdc-warden/destinations/orders/running"), "/cdc-warden/destinations/orders");
        assert_eq!(parent("/cdc-warden"), "/");
        assert_eq!(name("/cdc-warden/cluster/10.0.0.1:11111"), "10.0.0.1:11111");
    }
}
