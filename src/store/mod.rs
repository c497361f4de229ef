//! Storage port for the fleet store.
//!
//! Orchestrators receive an injected `Arc<dyn Store>`; nothing in the core
//! talks to a database directly. Multi-row operations that must be
//! all-or-nothing are single composite methods here, so a backend can wrap
//! them in one transaction and the in-memory store can apply them under one
//! write lock.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    Cluster, ClusterManifest, ClusterNode, ClusterResource, ClusterSpec, ClusterStatus,
    ClusterTool, Host, Ip, NodeStatus, Plan, ProjectResource, ResourceType, VmConfig,
};

/// Error type for storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// A referenced record does not exist
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    /// A uniqueness or ownership constraint was violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend failure (connection, serialization, ...)
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            key: key.into(),
        }
    }
}

/// Partial update applied to a set of nodes in one write.
#[derive(Clone, Debug, Default)]
pub struct NodeStatusUpdate {
    pub status: Option<NodeStatus>,
    pub pre_status: Option<NodeStatus>,
    /// `Some("")` clears the message.
    pub message: Option<String>,
    pub dirty: Option<bool>,
    /// Detach the node from its host (host provisioning rolled back).
    pub clear_host: bool,
}

impl NodeStatusUpdate {
    pub fn status(status: NodeStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_pre_status(mut self, pre: NodeStatus) -> Self {
        self.pre_status = Some(pre);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_dirty(mut self, dirty: bool) -> Self {
        self.dirty = Some(dirty);
        self
    }

    pub fn with_clear_host(mut self) -> Self {
        self.clear_host = true;
        self
    }
}

/// Transactional get/save/update/delete over the fleet records, keyed by
/// opaque string identifiers.
#[async_trait]
pub trait Store: Send + Sync {
    // ===== Clusters =====

    /// Load a cluster aggregate (spec, status, conditions, secret, nodes).
    async fn get_cluster(&self, name: &str) -> Result<Option<Cluster>, StoreError>;

    async fn list_clusters(&self) -> Result<Vec<Cluster>, StoreError>;

    async fn save_cluster(&self, cluster: &Cluster) -> Result<(), StoreError>;

    /// Persist status, phase, and the full condition set in one write.
    async fn save_status(&self, status: &ClusterStatus) -> Result<(), StoreError>;

    async fn save_spec(&self, spec: &ClusterSpec) -> Result<(), StoreError>;

    // ===== Nodes =====

    async fn list_nodes(&self, cluster_id: &str) -> Result<Vec<ClusterNode>, StoreError>;

    async fn get_node(
        &self,
        cluster_id: &str,
        name: &str,
    ) -> Result<Option<ClusterNode>, StoreError>;

    /// Apply one partial update to every node in `node_ids`.
    async fn update_nodes(
        &self,
        node_ids: &[String],
        update: NodeStatusUpdate,
    ) -> Result<(), StoreError>;

    /// Create node rows and bind their hosts to the cluster, all-or-nothing.
    async fn create_nodes_with_hosts(
        &self,
        nodes: &[ClusterNode],
        hosts: &[Host],
    ) -> Result<(), StoreError>;

    // ===== Hosts / IPs / resource rows =====

    async fn list_hosts(&self) -> Result<Vec<Host>, StoreError>;

    async fn get_hosts_by_names(&self, names: &[String]) -> Result<Vec<Host>, StoreError>;

    async fn get_hosts_by_ids(&self, ids: &[String]) -> Result<Vec<Host>, StoreError>;

    async fn save_host(&self, host: &Host) -> Result<(), StoreError>;

    /// Persist a batch of newly synthesized hosts plus their node and
    /// bookkeeping rows and IP claims, all-or-nothing: host rows, node
    /// rows, project/cluster resource rows, and each host's IP marked used
    /// by `cluster_id`. Either the whole batch lands or none of it does.
    async fn commit_new_hosts(
        &self,
        hosts: &[Host],
        nodes: &[ClusterNode],
        project_resources: &[ProjectResource],
        cluster_resources: &[ClusterResource],
        cluster_id: &str,
    ) -> Result<(), StoreError>;

    /// Tear down plan-provisioned nodes, all-or-nothing: delete node rows,
    /// host rows, their resource rows, and release their IPs.
    async fn remove_plan_nodes(
        &self,
        node_ids: &[String],
        host_ids: &[String],
        host_ips: &[String],
    ) -> Result<(), StoreError>;

    /// Return bare-metal hosts to the pool, all-or-nothing: delete node
    /// rows and clear host ownership.
    async fn release_bare_metal_nodes(
        &self,
        node_ids: &[String],
        host_ids: &[String],
    ) -> Result<(), StoreError>;

    /// Addresses of a pool not currently claimed.
    async fn available_ips(&self, ip_pool_id: &str) -> Result<Vec<Ip>, StoreError>;

    async fn save_ip(&self, ip: &Ip) -> Result<(), StoreError>;

    // ===== Plans / manifests / tools / settings =====

    async fn get_plan(&self, id: &str) -> Result<Option<Plan>, StoreError>;

    async fn save_plan(&self, plan: &Plan) -> Result<(), StoreError>;

    async fn get_vm_config(&self, name: &str) -> Result<Option<VmConfig>, StoreError>;

    async fn save_vm_config(&self, config: &VmConfig) -> Result<(), StoreError>;

    async fn get_manifest(&self, name: &str) -> Result<Option<ClusterManifest>, StoreError>;

    async fn save_manifest(&self, manifest: &ClusterManifest) -> Result<(), StoreError>;

    async fn list_tools(&self, cluster_id: &str) -> Result<Vec<ClusterTool>, StoreError>;

    async fn save_tool(&self, tool: &ClusterTool) -> Result<(), StoreError>;

    /// Resource row linking `resource_id` to its owning project.
    async fn project_resource_for(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
    ) -> Result<Option<ProjectResource>, StoreError>;

    async fn save_project_resource(&self, resource: &ProjectResource) -> Result<(), StoreError>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn save_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
