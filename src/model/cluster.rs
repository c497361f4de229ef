//! Cluster aggregate records: spec, status, conditions, plans.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{ClusterNode, new_id};

/// Coarse cluster lifecycle phase, derived from chain progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Phase {
    /// Created but no lifecycle chain has started.
    #[default]
    Pending,
    /// Hosts are being provisioned for the cluster.
    Creating,
    /// The create chain is executing.
    Initializing,
    /// The cluster is fully operational.
    Running,
    /// The upgrade chain is executing.
    Upgrading,
    /// The last chain step failed; retryable by re-invoking the chain.
    Failed,
    /// The cluster is being torn down.
    Terminating,
}

impl Phase {
    /// Terminal phases survive a process restart untouched; everything else
    /// is forced to `Failed` by the recovery hook.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Running | Phase::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Pending => write!(f, "Pending"),
            Phase::Creating => write!(f, "Creating"),
            Phase::Initializing => write!(f, "Initializing"),
            Phase::Running => write!(f, "Running"),
            Phase::Upgrading => write!(f, "Upgrading"),
            Phase::Failed => write!(f, "Failed"),
            Phase::Terminating => write!(f, "Terminating"),
        }
    }
}

/// Where a cluster came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Source {
    /// Provisioned and managed by this platform.
    #[default]
    Local,
    /// Imported from an externally managed control plane.
    External,
}

/// How a cluster's hosts are obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Provider {
    /// Pre-existing hosts selected by name from the pool.
    #[default]
    BareMetal,
    /// Hosts synthesized on demand from an IaaS plan.
    Plan,
}

/// Outcome record of a single lifecycle stage, keyed by stage name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum ConditionStatus {
    /// Stage is about to run or was interrupted.
    #[default]
    Unknown,
    /// Stage completed successfully.
    True,
    /// Stage failed; `message` carries the error.
    False,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::Unknown => write!(f, "Unknown"),
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
        }
    }
}

/// Durable progress record for one chain stage.
///
/// At most one condition per cluster is `Unknown` or `False` under normal
/// forward progress; that one is the chain's current stage.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Condition {
    /// Stage name, unique within a cluster's conditions (e.g. `EnsureInitEtcd`).
    pub name: String,
    /// Last known outcome.
    pub status: ConditionStatus,
    /// Failure detail when `status` is `False`.
    pub message: String,
    /// Last time the stage was attempted.
    pub last_probe_time: Timestamp,
}

/// Versioned cluster configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterSpec {
    pub id: String,
    pub cluster_id: String,
    /// Current Kubernetes version (manifest name, e.g. `v1.20.8-fo1`).
    pub version: String,
    /// Non-empty exactly while an upgrade is in flight; copied into
    /// `version` on successful completion.
    pub upgrade_version: Option<String>,
    /// Container runtime choice (`docker` | `containerd`).
    pub runtime_type: String,
    /// Network plugin choice (flannel, calico, ...).
    pub network_type: String,
    /// Target CPU architecture.
    pub architecture: String,
    /// Worker count requested at creation (plan provider).
    pub worker_amount: u32,
    /// Pass GPU support through to the worker join playbook.
    pub support_gpu: bool,
}

impl ClusterSpec {
    pub fn new(cluster_id: &str, version: &str) -> Self {
        Self {
            id: new_id(),
            cluster_id: cluster_id.to_string(),
            version: version.to_string(),
            upgrade_version: None,
            runtime_type: "docker".to_string(),
            network_type: "flannel".to_string(),
            architecture: "amd64".to_string(),
            worker_amount: 0,
            support_gpu: false,
        }
    }
}

/// Cluster-level status: phase, last failure, and the ordered condition set.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterStatus {
    pub id: String,
    pub cluster_id: String,
    pub phase: Phase,
    /// Phase before the current one; used to resume after `Failed`.
    pub pre_phase: Phase,
    /// Last failure detail.
    pub message: String,
    /// Ordered by stage declaration; see `adm::conditions`.
    pub conditions: Vec<Condition>,
}

impl ClusterStatus {
    pub fn new(cluster_id: &str) -> Self {
        Self {
            id: new_id(),
            cluster_id: cluster_id.to_string(),
            phase: Phase::Pending,
            pre_phase: Phase::Pending,
            message: String::new(),
            conditions: Vec::new(),
        }
    }
}

/// Join tokens and credentials owned by the cluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ClusterSecret {
    pub id: String,
    pub cluster_id: String,
    pub kubeadm_token: String,
    pub kubernetes_token: String,
}

/// Aggregate root. Owns spec/status/secret/nodes; references a plan when
/// provider is `Plan`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Cluster {
    pub id: String,
    /// Unique cluster name.
    pub name: String,
    pub source: Source,
    pub provider: Provider,
    pub plan_id: Option<String>,
    pub project_id: String,
    /// Identifier of the current automation log stream.
    pub log_id: Option<String>,
    pub spec: ClusterSpec,
    pub status: ClusterStatus,
    pub secret: ClusterSecret,
    #[serde(default)]
    pub nodes: Vec<ClusterNode>,
}

impl Cluster {
    /// Create a local cluster shell with fresh spec/status records.
    pub fn new(name: &str, provider: Provider, version: &str) -> Self {
        let id = new_id();
        Self {
            spec: ClusterSpec::new(&id, version),
            status: ClusterStatus::new(&id),
            secret: ClusterSecret {
                id: new_id(),
                cluster_id: id.clone(),
                ..Default::default()
            },
            id,
            name: name.to_string(),
            source: Source::Local,
            provider,
            plan_id: None,
            project_id: String::new(),
            log_id: None,
            nodes: Vec::new(),
        }
    }
}

/// IaaS provisioning plan: region, zones, VM sizing variables.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub region: Region,
    pub zones: Vec<Zone>,
    /// JSON document of provider-specific sizing variables
    /// (e.g. `worker_model` mapping to a VM config name).
    pub vars: String,
}

/// A provider region (datacenter scope).
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    /// Cloud vendor identifier (`vsphere`, `openstack`, ...).
    pub provider: String,
    pub datacenter: String,
    /// JSON document of provider connection variables.
    pub vars: String,
}

/// An availability zone inside a region.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub region_id: String,
    pub ip_pool_id: String,
    /// JSON document of zone placement variables.
    pub vars: String,
}
