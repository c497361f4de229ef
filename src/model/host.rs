//! Host, IP, and resource bookkeeping records.

use serde::{Deserialize, Serialize};

use super::new_id;

/// A physical or virtual machine. Owned by at most one cluster at a time;
/// outlives node deletion unless the node was dirty.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Host {
    pub id: String,
    pub name: String,
    /// Owning cluster, if any. Cleared when a bare-metal host returns to
    /// the pool.
    pub cluster_id: Option<String>,
    pub zone_id: Option<String>,
    pub ip: String,
    pub port: u16,
    pub cpu_core: u32,
    /// Memory in MiB.
    pub memory: u32,
    pub status: String,
    /// Datastore the VM's disks were placed on (plan provider).
    pub datastore: Option<String>,
}

impl Host {
    /// A host shell pending plan-driven provisioning.
    pub fn pending(name: &str) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            cluster_id: None,
            zone_id: None,
            ip: String::new(),
            port: 22,
            cpu_core: 0,
            memory: 0,
            status: "Creating".to_string(),
            datastore: None,
        }
    }
}

/// Allocation state of a pool address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum IpStatus {
    #[default]
    Available,
    Used,
}

/// A pool address, allocated to a host during plan-driven provisioning.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Ip {
    pub id: String,
    pub address: String,
    pub ip_pool_id: String,
    pub cluster_id: Option<String>,
    pub status: IpStatus,
}

/// What a resource row points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum ResourceType {
    Host,
    Cluster,
}

/// Links a resource to the project that owns it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProjectResource {
    pub id: String,
    pub project_id: String,
    pub resource_id: String,
    pub resource_type: ResourceType,
}

impl ProjectResource {
    pub fn host(project_id: &str, host_id: &str) -> Self {
        Self {
            id: new_id(),
            project_id: project_id.to_string(),
            resource_id: host_id.to_string(),
            resource_type: ResourceType::Host,
        }
    }
}

/// Links a resource to the cluster consuming it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterResource {
    pub id: String,
    pub cluster_id: String,
    pub resource_id: String,
    pub resource_type: ResourceType,
}

impl ClusterResource {
    pub fn host(cluster_id: &str, host_id: &str) -> Self {
        Self {
            id: new_id(),
            cluster_id: cluster_id.to_string(),
            resource_id: host_id.to_string(),
            resource_type: ResourceType::Host,
        }
    }
}

/// VM sizing template referenced by plan variables.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VmConfig {
    pub id: String,
    pub name: String,
    pub cpu: u32,
    /// Memory in GiB; hosts store MiB.
    pub memory: u32,
}
