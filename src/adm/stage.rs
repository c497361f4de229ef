//! Stage tables for the lifecycle chains.
//!
//! Stage identity is an explicit enum, not derived from function names:
//! condition records are keyed by these exact strings, so ordering and lookup
//! are first-class data. Appending a stage is safe; renaming one breaks
//! resume for clusters persisted mid-chain.

/// Condition name recorded when a chain has run past its last stage.
pub const DONE_CONDITION: &str = "EnsureDone";

/// Stages of the cluster create chain, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CreateStage {
    InitTaskStart,
    PrepareBaseSystemConfig,
    PrepareContainerRuntime,
    PrepareKubernetesComponent,
    PrepareLoadBalancer,
    PrepareCertificates,
    InitEtcd,
    InitMaster,
    InitWorker,
    InitNetwork,
    InitHelm,
    InitMetricsServer,
    InitIngressController,
    PostInit,
}

impl CreateStage {
    /// All stages in declared chain order.
    pub const ALL: [CreateStage; 14] = [
        CreateStage::InitTaskStart,
        CreateStage::PrepareBaseSystemConfig,
        CreateStage::PrepareContainerRuntime,
        CreateStage::PrepareKubernetesComponent,
        CreateStage::PrepareLoadBalancer,
        CreateStage::PrepareCertificates,
        CreateStage::InitEtcd,
        CreateStage::InitMaster,
        CreateStage::InitWorker,
        CreateStage::InitNetwork,
        CreateStage::InitHelm,
        CreateStage::InitMetricsServer,
        CreateStage::InitIngressController,
        CreateStage::PostInit,
    ];

    /// Stable condition name for this stage.
    pub fn name(&self) -> &'static str {
        match self {
            CreateStage::InitTaskStart => "EnsureInitTaskStart",
            CreateStage::PrepareBaseSystemConfig => "EnsurePrepareBaseSystemConfig",
            CreateStage::PrepareContainerRuntime => "EnsurePrepareContainerRuntime",
            CreateStage::PrepareKubernetesComponent => "EnsurePrepareKubernetesComponent",
            CreateStage::PrepareLoadBalancer => "EnsurePrepareLoadBalancer",
            CreateStage::PrepareCertificates => "EnsurePrepareCertificates",
            CreateStage::InitEtcd => "EnsureInitEtcd",
            CreateStage::InitMaster => "EnsureInitMaster",
            CreateStage::InitWorker => "EnsureInitWorker",
            CreateStage::InitNetwork => "EnsureInitNetwork",
            CreateStage::InitHelm => "EnsureInitHelm",
            CreateStage::InitMetricsServer => "EnsureInitMetricsServer",
            CreateStage::InitIngressController => "EnsureInitIngressController",
            CreateStage::PostInit => "EnsurePostInit",
        }
    }

    /// Playbook executed by this stage, if it runs one. The task-start
    /// stage only opens the log stream.
    pub fn playbook(&self) -> Option<&'static str> {
        match self {
            CreateStage::InitTaskStart => None,
            CreateStage::PrepareBaseSystemConfig => Some(playbook::PREPARE_BASE),
            CreateStage::PrepareContainerRuntime => Some(playbook::CONTAINER_RUNTIME),
            CreateStage::PrepareKubernetesComponent => Some(playbook::KUBERNETES_COMPONENT),
            CreateStage::PrepareLoadBalancer => Some(playbook::LOAD_BALANCER),
            CreateStage::PrepareCertificates => Some(playbook::CERTIFICATES),
            CreateStage::InitEtcd => Some(playbook::ETCD),
            CreateStage::InitMaster => Some(playbook::MASTER),
            CreateStage::InitWorker => Some(playbook::WORKER),
            CreateStage::InitNetwork => Some(playbook::NETWORK),
            CreateStage::InitHelm => Some(playbook::HELM),
            CreateStage::InitMetricsServer => Some(playbook::METRICS_SERVER),
            CreateStage::InitIngressController => Some(playbook::INGRESS_CONTROLLER),
            CreateStage::PostInit => Some(playbook::POST),
        }
    }

    /// First stage of the chain.
    pub fn first() -> CreateStage {
        Self::ALL[0]
    }

    /// Look up a stage by its condition name.
    pub fn from_name(name: &str) -> Option<CreateStage> {
        Self::ALL.iter().copied().find(|s| s.name() == name)
    }

    /// The stage immediately following this one, or `None` when this is the
    /// last stage (successor is the `EnsureDone` sentinel).
    pub fn next(&self) -> Option<CreateStage> {
        successor(&Self::ALL, *self)
    }
}

/// Stages of the cluster upgrade chain, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpgradeStage {
    UpgradeTaskStart,
    BackupEtcd,
    UpgradeRuntime,
    UpgradeEtcd,
    UpgradeKubernetes,
    UpdateCertificates,
}

impl UpgradeStage {
    /// All stages in declared chain order.
    pub const ALL: [UpgradeStage; 6] = [
        UpgradeStage::UpgradeTaskStart,
        UpgradeStage::BackupEtcd,
        UpgradeStage::UpgradeRuntime,
        UpgradeStage::UpgradeEtcd,
        UpgradeStage::UpgradeKubernetes,
        UpgradeStage::UpdateCertificates,
    ];

    /// Stable condition name for this stage.
    pub fn name(&self) -> &'static str {
        match self {
            UpgradeStage::UpgradeTaskStart => "EnsureUpgradeTaskStart",
            UpgradeStage::BackupEtcd => "EnsureBackupETCD",
            UpgradeStage::UpgradeRuntime => "EnsureUpgradeRuntime",
            UpgradeStage::UpgradeEtcd => "EnsureUpgradeETCD",
            UpgradeStage::UpgradeKubernetes => "EnsureUpgradeKubernetes",
            UpgradeStage::UpdateCertificates => "EnsureUpdateCertificates",
        }
    }

    /// Playbook executed by this stage, if it runs one.
    pub fn playbook(&self) -> Option<&'static str> {
        match self {
            UpgradeStage::UpgradeTaskStart => None,
            UpgradeStage::BackupEtcd => Some(playbook::BACKUP_CLUSTER),
            UpgradeStage::UpgradeRuntime => Some(playbook::CONTAINER_RUNTIME),
            UpgradeStage::UpgradeEtcd => Some(playbook::ETCD),
            UpgradeStage::UpgradeKubernetes => Some(playbook::UPGRADE_CLUSTER),
            UpgradeStage::UpdateCertificates => Some(playbook::CERTIFICATES),
        }
    }

    /// First stage of the chain.
    pub fn first() -> UpgradeStage {
        Self::ALL[0]
    }

    /// Look up a stage by its condition name.
    pub fn from_name(name: &str) -> Option<UpgradeStage> {
        Self::ALL.iter().copied().find(|s| s.name() == name)
    }

    /// The stage immediately following this one, or `None` when this is the
    /// last stage.
    pub fn next(&self) -> Option<UpgradeStage> {
        successor(&Self::ALL, *self)
    }
}

/// Playbook identifiers handed to the automation driver. Opaque names; they
/// must match the automation repository's playbook files.
pub mod playbook {
    pub const PREPARE_BASE: &str = "01-base.yml";
    pub const CONTAINER_RUNTIME: &str = "02-container-runtime.yml";
    pub const KUBERNETES_COMPONENT: &str = "03-kubernetes-component.yml";
    pub const LOAD_BALANCER: &str = "04-load-balancer.yml";
    pub const CERTIFICATES: &str = "05-certificates.yml";
    pub const ETCD: &str = "06-etcd.yml";
    pub const MASTER: &str = "07-kubernetes-master.yml";
    pub const WORKER: &str = "08-kubernetes-worker.yml";
    pub const NETWORK: &str = "09-plugin-network.yml";
    pub const HELM: &str = "11-helm-install.yml";
    pub const METRICS_SERVER: &str = "13-metrics-server.yml";
    pub const INGRESS_CONTROLLER: &str = "14-ingress-controller.yml";
    pub const POST: &str = "15-post.yml";
    pub const ADD_WORKER: &str = "91-add-worker.yml";
    pub const UPGRADE_CLUSTER: &str = "92-upgrade-cluster.yml";
    pub const BACKUP_CLUSTER: &str = "94-backup-cluster.yml";
    pub const REMOVE_WORKER: &str = "96-remove-worker.yml";
}

fn successor<S: PartialEq + Copy>(all: &[S], current: S) -> Option<S> {
    let idx = all.iter().position(|s| *s == current)?;
    all.get(idx + 1).copied()
}
