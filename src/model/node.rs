//! Cluster node membership records.

use serde::{Deserialize, Serialize};

use super::new_id;

/// Node status through the add/remove workflows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum NodeStatus {
    /// Batch create accepted, nothing started yet.
    #[default]
    Waiting,
    /// Underlying host is being provisioned (plan provider).
    Creating,
    /// Join playbook is running.
    Initializing,
    /// Member of the cluster.
    Running,
    /// A workflow step failed; `message` carries the error.
    Failed,
    /// Known to the store but no longer reported by the cluster.
    Lost,
    /// Delete workflow in progress.
    Terminating,
}

impl NodeStatus {
    /// Statuses that mean a workflow currently owns this node.
    pub fn is_mid_operation(&self) -> bool {
        matches!(
            self,
            NodeStatus::Waiting | NodeStatus::Creating | NodeStatus::Initializing
        )
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Waiting => write!(f, "Waiting"),
            NodeStatus::Creating => write!(f, "Creating"),
            NodeStatus::Initializing => write!(f, "Initializing"),
            NodeStatus::Running => write!(f, "Running"),
            NodeStatus::Failed => write!(f, "Failed"),
            NodeStatus::Lost => write!(f, "Lost"),
            NodeStatus::Terminating => write!(f, "Terminating"),
        }
    }
}

/// Role of a node inside the cluster.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum NodeRole {
    Master,
    #[default]
    Worker,
}

impl NodeRole {
    /// Name segment used when deriving node names (`<cluster>-worker-<n>`).
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Worker => "worker",
        }
    }
}

/// A host bound into a cluster as a member node.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterNode {
    pub id: String,
    /// Cluster-scoped unique name, e.g. `demo-worker-2`.
    pub name: String,
    pub cluster_id: String,
    pub host_id: String,
    pub role: NodeRole,
    pub status: NodeStatus,
    /// Status before the current one.
    pub pre_status: NodeStatus,
    /// Last failure detail.
    pub message: String,
    /// Host-level provisioning is known-broken; delete skips remote teardown
    /// and only removes records.
    pub dirty: bool,
}

impl ClusterNode {
    pub fn new(name: &str, cluster_id: &str, host_id: &str, role: NodeRole) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            cluster_id: cluster_id.to_string(),
            host_id: host_id.to_string(),
            role,
            status: NodeStatus::Waiting,
            pre_status: NodeStatus::Waiting,
            message: String::new(),
            dirty: false,
        }
    }
}
