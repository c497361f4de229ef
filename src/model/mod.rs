//! Persisted records for the fleet store.
//!
//! - `Cluster` and its spec/status/conditions: the lifecycle aggregate
//! - `ClusterNode`/`Host`/`Ip`: node membership and the machines behind it
//! - `Plan`/`Zone`/`Region`: IaaS provisioning inputs
//! - `ClusterManifest`/`ClusterTool`: versioned component bundles

mod cluster;
mod host;
mod manifest;
mod node;

pub use cluster::*;
pub use host::*;
pub use manifest::*;
pub use node::*;

/// Generate an opaque string identifier for a new record.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
