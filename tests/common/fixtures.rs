//! Test fixtures: builders for the fleet records and scripted fakes for
//! every injected port.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use fleet_operator::Orchestrator;
use fleet_operator::automation::{AutomationConnector, AutomationDriver, AutomationError, LogSink};
use fleet_operator::config::Settings;
use fleet_operator::inventory::Inventory;
use fleet_operator::model::{
    Cluster, ClusterManifest, ClusterNode, Host, Ip, IpStatus, NodeRole, NodeStatus, Phase, Plan,
    Provider, Region, Source, Zone, new_id,
};
use fleet_operator::notify::{Message, Notifier, NotifyError};
use fleet_operator::provider::{CloudProvider, HostProvisioner, ProviderError};
use fleet_operator::store::{MemoryStore, Store};

/// Builder for cluster fixtures.
///
/// # Example
/// ```ignore
/// let cluster = ClusterBuilder::new("demo")
///     .phase(Phase::Running)
///     .worker("demo-worker-1", NodeStatus::Running)
///     .seed(&store)
///     .await;
/// ```
#[derive(Clone, Debug)]
pub struct ClusterBuilder {
    cluster: Cluster,
    hosts: Vec<Host>,
}

impl ClusterBuilder {
    pub fn new(name: &str) -> Self {
        let mut cluster = Cluster::new(name, Provider::BareMetal, "v1.20.8-fo1");
        cluster.project_id = "project-1".to_string();
        Self {
            cluster,
            hosts: Vec::new(),
        }
    }

    pub fn source(mut self, source: Source) -> Self {
        self.cluster.source = source;
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.cluster.spec.version = version.to_string();
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.cluster.status.phase = phase;
        self
    }

    pub fn plan(mut self, plan_id: &str) -> Self {
        self.cluster.provider = Provider::Plan;
        self.cluster.plan_id = Some(plan_id.to_string());
        self
    }

    pub fn support_gpu(mut self) -> Self {
        self.cluster.spec.support_gpu = true;
        self
    }

    /// Add a node backed by a fresh host with a pool address.
    pub fn node(mut self, name: &str, role: NodeRole, status: NodeStatus) -> Self {
        let mut host = Host::pending(name);
        host.ip = format!("10.0.0.{}", self.hosts.len() + 10);
        host.status = "Running".to_string();
        host.cluster_id = Some(self.cluster.id.clone());
        let mut node = ClusterNode::new(name, &self.cluster.id, &host.id, role);
        node.status = status;
        node.pre_status = status;
        self.cluster.nodes.push(node);
        self.hosts.push(host);
        self
    }

    pub fn master(self, name: &str) -> Self {
        self.node(name, NodeRole::Master, NodeStatus::Running)
    }

    pub fn worker(self, name: &str, status: NodeStatus) -> Self {
        self.node(name, NodeRole::Worker, status)
    }

    /// Mark the most recently added node dirty.
    pub fn dirty(mut self) -> Self {
        if let Some(node) = self.cluster.nodes.last_mut() {
            node.dirty = true;
        }
        self
    }

    pub fn build(self) -> (Cluster, Vec<Host>) {
        (self.cluster, self.hosts)
    }

    /// Persist the cluster, its nodes, and their hosts.
    pub async fn seed(self, store: &MemoryStore) -> Cluster {
        let (cluster, hosts) = self.build();
        store.save_cluster(&cluster).await.unwrap();
        store
            .create_nodes_with_hosts(&cluster.nodes, &hosts)
            .await
            .unwrap();
        store.get_cluster(&cluster.name).await.unwrap().unwrap()
    }
}

/// Manifest fixture with controllable component versions.
pub fn manifest(name: &str, etcd: &str, docker: &str) -> ClusterManifest {
    ClusterManifest {
        id: new_id(),
        name: name.to_string(),
        version: name
            .split_once('-')
            .map(|(v, _)| v)
            .unwrap_or(name)
            .to_string(),
        is_active: true,
        core_vars: format!(
            r#"[{{"name":"etcd","version":"{etcd}"}},{{"name":"docker","version":"{docker}"}}]"#
        ),
        network_vars: r#"[{"name":"flannel","version":"0.13.0"}]"#.to_string(),
        other_vars: String::new(),
        tool_vars: String::new(),
    }
}

/// Plan fixture: one region, the given `(zone_id, ip_pool_id)` zones, worker
/// model `small`.
pub fn plan(id: &str, zones: &[(&str, &str)]) -> Plan {
    Plan {
        id: id.to_string(),
        name: format!("plan-{id}"),
        region: Region {
            id: "region-1".to_string(),
            name: "dc-east".to_string(),
            provider: "vsphere".to_string(),
            datacenter: "dc1".to_string(),
            vars: "{}".to_string(),
        },
        zones: zones
            .iter()
            .map(|(zone_id, pool_id)| Zone {
                id: zone_id.to_string(),
                name: format!("zone-{zone_id}"),
                region_id: "region-1".to_string(),
                ip_pool_id: pool_id.to_string(),
                vars: "{}".to_string(),
            })
            .collect(),
        vars: r#"{"worker_model":"small"}"#.to_string(),
    }
}

pub fn pool_ip(pool_id: &str, address: &str) -> Ip {
    Ip {
        id: new_id(),
        address: address.to_string(),
        ip_pool_id: pool_id.to_string(),
        cluster_id: None,
        status: IpStatus::Available,
    }
}

/// One recorded playbook run: what ran, with which inventory and variables.
#[derive(Clone, Debug)]
pub struct RecordedRun {
    pub playbook: String,
    pub tag: String,
    pub vars: BTreeMap<String, String>,
    pub inventory: Inventory,
}

#[derive(Default)]
pub struct ConnectorState {
    fail_on: Option<String>,
    delay: Option<Duration>,
    runs: Vec<RecordedRun>,
}

/// Automation fake: records every run, optionally failing or delaying one
/// playbook.
#[derive(Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl ScriptedConnector {
    pub fn fail_on(&self, playbook: &str) {
        self.state.lock().unwrap().fail_on = Some(playbook.to_string());
    }

    pub fn clear_failure(&self) {
        self.state.lock().unwrap().fail_on = None;
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.state.lock().unwrap().runs.clone()
    }

    pub fn playbooks(&self) -> Vec<String> {
        self.runs().into_iter().map(|r| r.playbook).collect()
    }
}

struct ScriptedDriver {
    state: Arc<Mutex<ConnectorState>>,
    inventory: Inventory,
    vars: BTreeMap<String, String>,
}

impl AutomationConnector for ScriptedConnector {
    fn connect(&self, inventory: Inventory, _log: LogSink) -> Box<dyn AutomationDriver> {
        Box::new(ScriptedDriver {
            state: Arc::clone(&self.state),
            inventory,
            vars: BTreeMap::new(),
        })
    }
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    fn set_var(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    async fn run(&mut self, playbook: &str, tag: &str) -> Result<(), AutomationError> {
        let (fail, delay) = {
            let mut state = self.state.lock().unwrap();
            state.runs.push(RecordedRun {
                playbook: playbook.to_string(),
                tag: tag.to_string(),
                vars: self.vars.clone(),
                inventory: self.inventory.clone(),
            });
            (state.fail_on.as_deref() == Some(playbook), state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(AutomationError::Playbook {
                playbook: playbook.to_string(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct ProvisionerState {
    fail_apply: bool,
    fail_destroy: bool,
    fail_sync: bool,
    applied: Vec<String>,
    destroyed: Vec<String>,
}

/// IaaS fake: records applied/destroyed host names; sync marks hosts
/// `Running`.
#[derive(Default)]
pub struct FakeProvisioner {
    state: Mutex<ProvisionerState>,
}

impl FakeProvisioner {
    pub fn fail_apply(&self) {
        self.state.lock().unwrap().fail_apply = true;
    }

    pub fn fail_destroy(&self) {
        self.state.lock().unwrap().fail_destroy = true;
    }

    pub fn fail_sync(&self) {
        self.state.lock().unwrap().fail_sync = true;
    }

    pub fn applied(&self) -> Vec<String> {
        self.state.lock().unwrap().applied.clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.state.lock().unwrap().destroyed.clone()
    }
}

#[async_trait]
impl HostProvisioner for FakeProvisioner {
    async fn apply(&self, hosts: &[Host], _plan: &Plan) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_apply {
            return Err(ProviderError::Apply("scripted apply failure".to_string()));
        }
        state.applied.extend(hosts.iter().map(|h| h.name.clone()));
        Ok(())
    }

    async fn destroy(&self, hosts: &[Host], _plan: &Plan) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_destroy {
            return Err(ProviderError::Destroy(
                "scripted destroy failure".to_string(),
            ));
        }
        state.destroyed.extend(hosts.iter().map(|h| h.name.clone()));
        Ok(())
    }

    async fn sync(&self, mut host: Host) -> Result<Host, ProviderError> {
        if self.state.lock().unwrap().fail_sync {
            return Err(ProviderError::Query("scripted sync failure".to_string()));
        }
        host.status = "Running".to_string();
        Ok(host)
    }
}

/// Cloud query fake with a fixed datastore list and configurable in-use
/// addresses.
pub struct FakeCloud {
    used: Mutex<Vec<String>>,
    pub datastores: Vec<String>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self {
            used: Mutex::new(Vec::new()),
            datastores: vec!["datastore-1".to_string()],
        }
    }
}

impl FakeCloud {
    pub fn mark_used(&self, address: &str) {
        self.used.lock().unwrap().push(address.to_string());
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    async fn datastores(&self, _zone: &Zone) -> Result<Vec<String>, ProviderError> {
        Ok(self.datastores.clone())
    }

    async fn used_ips(&self, _zone: &Zone) -> Result<Vec<String>, ProviderError> {
        Ok(self.used.lock().unwrap().clone())
    }
}

/// Notifier fake recording every message.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<Message>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn push(&self, message: Message) -> Result<(), NotifyError> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

/// Fully wired orchestrator over in-memory fakes.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub connector: Arc<ScriptedConnector>,
    pub cloud: Arc<FakeCloud>,
    pub provisioner: Arc<FakeProvisioner>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: Orchestrator,
    _log_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let connector = Arc::new(ScriptedConnector::default());
        let cloud = Arc::new(FakeCloud::default());
        let provisioner = Arc::new(FakeProvisioner::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let log_dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            provision_poll_interval: Duration::ZERO,
            host_sync_workers: 2,
            log_dir: log_dir.path().to_path_buf(),
            ntp_server: None,
        };
        let orchestrator = Orchestrator::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&connector) as _,
            Arc::clone(&cloud) as _,
            Arc::clone(&provisioner) as _,
            Arc::clone(&notifier) as _,
            settings,
        );
        Self {
            store,
            connector,
            cloud,
            provisioner,
            notifier,
            orchestrator,
            _log_dir: log_dir,
        }
    }

    /// Seed the default manifests the fixtures reference.
    pub async fn seed_manifests(&self) {
        self.store
            .save_manifest(&manifest("v1.20.8-fo1", "3.4.13", "20.10.7"))
            .await
            .unwrap();
        self.store
            .save_manifest(&manifest("v1.21.0-fo1", "3.4.13", "20.10.8"))
            .await
            .unwrap();
    }

    /// Poll the store until the cluster reaches `phase`.
    pub async fn wait_for_phase(&self, name: &str, phase: Phase) -> Cluster {
        for _ in 0..500 {
            let cluster = self.store.get_cluster(name).await.unwrap().unwrap();
            if cluster.status.phase == phase {
                return cluster;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cluster {name} never reached phase {phase}");
    }

    /// Poll the store until every node of the cluster has `status`.
    pub async fn wait_for_nodes(&self, cluster_id: &str, status: NodeStatus) -> Vec<ClusterNode> {
        for _ in 0..500 {
            let nodes = self.store.list_nodes(cluster_id).await.unwrap();
            if !nodes.is_empty() && nodes.iter().all(|n| n.status == status) {
                return nodes;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("nodes of {cluster_id} never all reached {status}");
    }

    /// Poll the store until one named node has `status`.
    pub async fn wait_for_node(
        &self,
        cluster_id: &str,
        name: &str,
        status: NodeStatus,
    ) -> ClusterNode {
        for _ in 0..500 {
            let nodes = self.store.list_nodes(cluster_id).await.unwrap();
            if let Some(node) = nodes.iter().find(|n| n.name == name && n.status == status) {
                return node.clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("node {name} of {cluster_id} never reached {status}");
    }

    /// Poll until the named nodes are gone from the store.
    pub async fn wait_for_nodes_gone(&self, cluster_id: &str, names: &[&str]) {
        for _ in 0..500 {
            let nodes = self.store.list_nodes(cluster_id).await.unwrap();
            if names
                .iter()
                .all(|name| !nodes.iter().any(|n| n.name == *name))
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("nodes {names:?} of {cluster_id} were never removed");
    }

    /// Poll until `count` notifications have been recorded.
    pub async fn wait_for_messages(&self, count: usize) -> Vec<Message> {
        for _ in 0..500 {
            let messages = self.notifier.messages();
            if messages.len() >= count {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {count} notifications, got {:?}",
            self.notifier.messages()
        );
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
