//! Node membership orchestrator.
//!
//! Batch create binds existing bare-metal hosts or synthesizes plan-backed
//! hosts (zone spread, IP and datastore allocation) before the join
//! workflow runs; batch delete splits dirty nodes out of the remote
//! teardown. All remote work happens in a spawned task holding the
//! cluster's advisory lock; callers observe progress through node status.

use std::collections::BTreeSet;

use futures::StreamExt;
use futures::stream;
use tracing::{error, info};

use crate::adm::AdmCluster;
use crate::adm::stage::playbook;
use crate::error::{Error, Result};
use crate::inventory::{GROUP_DEL_WORKER, GROUP_NEW_WORKER};
use crate::model::{
    Cluster, ClusterNode, ClusterResource, Host, NodeRole, NodeStatus, Plan, ProjectResource,
    Provider,
};
use crate::notify::{Message, MessageKind, push_quietly};
use crate::store::NodeStatusUpdate;

use super::Orchestrator;

/// A node membership request against one cluster.
#[derive(Clone, Debug)]
pub enum BatchOperation {
    /// Add workers: `hosts` selects pool hosts by name (bare-metal
    /// provider), `increase` synthesizes that many hosts (plan provider).
    Create { increase: u32, hosts: Vec<String> },
    /// Remove the named worker nodes.
    Delete { nodes: Vec<String> },
}

impl Orchestrator {
    /// Run a node membership batch. Returns the accepted node records with
    /// their initial workflow status; the rest happens in the background.
    pub async fn batch(&self, name: &str, operation: BatchOperation) -> Result<Vec<ClusterNode>> {
        let cluster = self.load_cluster(name).await?;
        let guard = self.locks.try_acquire(name, "node-batch")?;
        ensure_no_node_task(&cluster)?;

        match operation {
            BatchOperation::Create { increase, hosts } => match cluster.provider {
                Provider::BareMetal => self.add_bare_metal(cluster, hosts, guard).await,
                Provider::Plan => self.add_from_plan(cluster, increase, guard).await,
            },
            BatchOperation::Delete { nodes } => self.remove_workers(cluster, nodes, guard).await,
        }
    }

    /// Re-run provisioning and the join workflow for one existing node.
    pub async fn recreate(&self, name: &str, node_name: &str) -> Result<()> {
        let cluster = self.load_cluster(name).await?;
        let guard = self.locks.try_acquire(name, "node-recreate")?;
        ensure_no_node_task(&cluster)?;
        let mut node = cluster
            .nodes
            .iter()
            .find(|n| n.name == node_name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "node",
                name: node_name.to_string(),
            })?;
        info!(cluster = %name, node = node_name, "recreating node");

        let this = self.clone();
        match cluster.provider {
            Provider::Plan => {
                let plan = self.plan_of(&cluster).await?;
                let hosts = self.store.get_hosts_by_ids(&[node.host_id.clone()]).await?;
                self.store
                    .update_nodes(
                        &[node.id.clone()],
                        NodeStatusUpdate::status(NodeStatus::Creating)
                            .with_pre_status(node.status)
                            .with_message("")
                            .with_dirty(false),
                    )
                    .await?;
                node.pre_status = node.status;
                node.status = NodeStatus::Creating;
                node.dirty = false;
                tokio::spawn(async move {
                    let _guard = guard;
                    let nodes = vec![node];
                    if this.run_provision(&cluster, &plan, &nodes, &hosts, false).await {
                        this.run_join(cluster, nodes, false).await;
                    }
                });
            }
            Provider::BareMetal => {
                self.store
                    .update_nodes(
                        &[node.id.clone()],
                        NodeStatusUpdate::default().with_message("").with_dirty(false),
                    )
                    .await?;
                node.dirty = false;
                tokio::spawn(async move {
                    let _guard = guard;
                    this.run_join(cluster, vec![node], false).await;
                });
            }
        }
        Ok(())
    }

    async fn add_bare_metal(
        &self,
        mut cluster: Cluster,
        host_names: Vec<String>,
        guard: super::lock::LockGuard,
    ) -> Result<Vec<ClusterNode>> {
        if host_names.is_empty() {
            return Err(Error::Validation("no hosts selected".to_string()));
        }
        let mut hosts = self.store.get_hosts_by_names(&host_names).await?;
        for host in &hosts {
            if host.cluster_id.is_some() {
                return Err(Error::Validation(format!(
                    "host {} is already bound to a cluster",
                    host.name
                )));
            }
        }
        let names = self.next_worker_names(&cluster, hosts.len()).await?;
        let mut nodes = Vec::with_capacity(hosts.len());
        for (host, name) in hosts.iter_mut().zip(&names) {
            host.cluster_id = Some(cluster.id.clone());
            nodes.push(ClusterNode::new(name, &cluster.id, &host.id, NodeRole::Worker));
        }
        self.store.create_nodes_with_hosts(&nodes, &hosts).await?;
        info!(cluster = %cluster.name, count = nodes.len(), "bare-metal workers accepted");

        let gpu = cluster.spec.support_gpu;
        cluster.nodes.extend(nodes.clone());
        let this = self.clone();
        let spawned = nodes.clone();
        tokio::spawn(async move {
            let _guard = guard;
            this.run_join(cluster, spawned, gpu).await;
        });
        Ok(nodes)
    }

    async fn add_from_plan(
        &self,
        mut cluster: Cluster,
        increase: u32,
        guard: super::lock::LockGuard,
    ) -> Result<Vec<ClusterNode>> {
        if increase == 0 {
            return Err(Error::Validation("increase must be positive".to_string()));
        }
        let plan = self.plan_of(&cluster).await?;
        if plan.zones.is_empty() {
            return Err(Error::Validation(format!("plan {} has no zones", plan.name)));
        }
        let model = worker_model(&plan)?;
        let vm = self
            .store
            .get_vm_config(&model)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "vm config",
                name: model,
            })?;
        let names = self.next_worker_names(&cluster, increase as usize).await?;

        // spread across the currently least-loaded zones
        let all_hosts = self.store.list_hosts().await?;
        let mut counts: Vec<usize> = plan
            .zones
            .iter()
            .map(|z| {
                all_hosts
                    .iter()
                    .filter(|h| h.zone_id.as_deref() == Some(z.id.as_str()))
                    .count()
            })
            .collect();
        let mut zone_of = Vec::with_capacity(names.len());
        for _ in &names {
            let mut best = 0;
            for (i, count) in counts.iter().enumerate() {
                if *count < counts[best] {
                    best = i;
                }
            }
            counts[best] += 1;
            zone_of.push(best);
        }

        let mut hosts: Vec<Host> = names
            .iter()
            .zip(&zone_of)
            .map(|(name, &zi)| {
                let mut host = Host::pending(name);
                host.cluster_id = Some(cluster.id.clone());
                host.zone_id = Some(plan.zones[zi].id.clone());
                host.cpu_core = vm.cpu;
                host.memory = vm.memory * 1024;
                host
            })
            .collect();

        for (zi, zone) in plan.zones.iter().enumerate() {
            if !zone_of.contains(&zi) {
                continue;
            }
            let used = self.cloud.used_ips(zone).await?;
            let mut pool = self.store.available_ips(&zone.ip_pool_id).await?;
            pool.sort_by(|a, b| a.address.cmp(&b.address));
            let mut free = pool.into_iter().filter(|ip| !used.contains(&ip.address));
            let datastore = self
                .cloud
                .datastores(zone)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    Error::Validation(format!("no datastore available in zone {}", zone.name))
                })?;
            for (host, &hz) in hosts.iter_mut().zip(&zone_of) {
                if hz != zi {
                    continue;
                }
                let ip = free.next().ok_or_else(|| {
                    Error::Validation(format!("ip pool of zone {} is exhausted", zone.name))
                })?;
                host.ip = ip.address;
                host.datastore = Some(datastore.clone());
            }
        }

        let project_resources: Vec<ProjectResource> = hosts
            .iter()
            .map(|h| ProjectResource::host(&cluster.project_id, &h.id))
            .collect();
        let cluster_resources: Vec<ClusterResource> = hosts
            .iter()
            .map(|h| ClusterResource::host(&cluster.id, &h.id))
            .collect();
        let nodes: Vec<ClusterNode> = names
            .iter()
            .zip(&hosts)
            .map(|(name, host)| {
                let mut node = ClusterNode::new(name, &cluster.id, &host.id, NodeRole::Worker);
                node.status = NodeStatus::Creating;
                node.pre_status = NodeStatus::Creating;
                node
            })
            .collect();
        self.store
            .commit_new_hosts(&hosts, &nodes, &project_resources, &cluster_resources, &cluster.id)
            .await?;
        info!(cluster = %cluster.name, count = nodes.len(), "plan workers accepted");

        let gpu = cluster.spec.support_gpu;
        cluster.nodes.extend(nodes.clone());
        let this = self.clone();
        let spawned = nodes.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if this.run_provision(&cluster, &plan, &spawned, &hosts, true).await {
                this.run_join(cluster, spawned, gpu).await;
            }
        });
        Ok(nodes)
    }

    async fn remove_workers(
        &self,
        cluster: Cluster,
        names: Vec<String>,
        guard: super::lock::LockGuard,
    ) -> Result<Vec<ClusterNode>> {
        if names.is_empty() {
            return Err(Error::Validation("no nodes selected".to_string()));
        }
        let mut targets = Vec::with_capacity(names.len());
        for name in &names {
            let node = cluster
                .nodes
                .iter()
                .find(|n| n.name == *name)
                .ok_or_else(|| Error::NotFound {
                    kind: "node",
                    name: name.clone(),
                })?;
            if node.role == NodeRole::Master {
                return Err(Error::Validation(format!(
                    "can not remove master node {name}"
                )));
            }
            targets.push(node.clone());
        }
        for node in &targets {
            self.store
                .update_nodes(
                    &[node.id.clone()],
                    NodeStatusUpdate::status(NodeStatus::Terminating).with_pre_status(node.status),
                )
                .await?;
        }
        info!(cluster = %cluster.name, count = targets.len(), "worker removal accepted");

        let this = self.clone();
        let mut spawned = targets.clone();
        for node in &mut spawned {
            node.pre_status = node.status;
            node.status = NodeStatus::Terminating;
        }
        let result = spawned.clone();
        tokio::spawn(async move {
            let _guard = guard;
            this.run_remove(cluster, spawned).await;
        });
        Ok(result)
    }

    /// Background half of plan-backed creation: bring up the machines and
    /// refresh their host records through bounded sync probes. Returns
    /// whether the join workflow should proceed. When `fresh` is set the
    /// host rows were synthesized for this batch, so an apply failure rolls
    /// them back instead of leaving orphaned rows and claimed IPs.
    async fn run_provision(
        &self,
        cluster: &Cluster,
        plan: &Plan,
        nodes: &[ClusterNode],
        hosts: &[Host],
        fresh: bool,
    ) -> bool {
        let node_ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        if let Err(e) = self.provisioner.apply(hosts, plan).await {
            error!(cluster = %cluster.name, error = %e, "host provisioning failed");
            if fresh {
                let host_ids: Vec<String> = hosts.iter().map(|h| h.id.clone()).collect();
                let ips: Vec<String> = hosts.iter().map(|h| h.ip.clone()).collect();
                if let Err(e) = self.store.remove_plan_nodes(&[], &host_ids, &ips).await {
                    error!(cluster = %cluster.name, error = %e, "failed to roll back provisioned hosts");
                }
                let update = NodeStatusUpdate::status(NodeStatus::Failed)
                    .with_message(e.to_string())
                    .with_dirty(true)
                    .with_clear_host();
                if let Err(e) = self.store.update_nodes(&node_ids, update).await {
                    error!(error = %e, "failed to record node failure");
                }
            } else {
                self.fail_nodes(&node_ids, &e.to_string(), true).await;
            }
            self.notify(&cluster.name, MessageKind::ClusterAddWorker, false, &e.to_string())
                .await;
            return false;
        }
        tokio::time::sleep(self.settings.provision_poll_interval).await;

        let mut probes = stream::iter(hosts.to_vec())
            .map(|host| self.provisioner.sync(host))
            .buffer_unordered(self.settings.host_sync_workers);
        while let Some(result) = probes.next().await {
            let synced = match result {
                Ok(host) => host,
                Err(e) => {
                    error!(cluster = %cluster.name, error = %e, "host sync failed");
                    drop(probes);
                    self.fail_nodes(&node_ids, &e.to_string(), true).await;
                    self.notify(&cluster.name, MessageKind::ClusterAddWorker, false, &e.to_string())
                        .await;
                    return false;
                }
            };
            if let Err(e) = self.store.save_host(&synced).await {
                error!(cluster = %cluster.name, host = %synced.name, error = %e, "failed to save synced host");
                drop(probes);
                self.fail_nodes(&node_ids, &e.to_string(), false).await;
                self.notify(&cluster.name, MessageKind::ClusterAddWorker, false, &e.to_string())
                    .await;
                return false;
            }
        }
        true
    }

    /// Background join workflow: mark the nodes `Initializing`, run the
    /// worker join playbook against the `new-worker` group, then record the
    /// terminal status.
    async fn run_join(&self, mut cluster: Cluster, new_nodes: Vec<ClusterNode>, support_gpu: bool) {
        let node_ids: Vec<String> = new_nodes.iter().map(|n| n.id.clone()).collect();
        let node_names: Vec<String> = new_nodes.iter().map(|n| n.name.clone()).collect();
        for node in &new_nodes {
            if let Err(e) = self
                .store
                .update_nodes(
                    &[node.id.clone()],
                    NodeStatusUpdate::status(NodeStatus::Initializing)
                        .with_pre_status(node.status)
                        .with_message(""),
                )
                .await
            {
                error!(cluster = %cluster.name, error = %e, "failed to mark nodes initializing");
                return;
            }
        }
        for node in &new_nodes {
            if !cluster.nodes.iter().any(|n| n.id == node.id) {
                cluster.nodes.push(node.clone());
            }
        }

        let adm = match self.stage_playbook_run(&mut cluster).await {
            Ok(mut adm) => {
                adm.set_var("support_gpu", if support_gpu { "true" } else { "false" });
                adm
            }
            Err(e) => {
                self.fail_nodes(&node_ids, &e.to_string(), false).await;
                self.notify(&cluster.name, MessageKind::ClusterAddWorker, false, &e.to_string())
                    .await;
                return;
            }
        };
        let mut inventory = adm.inventory();
        inventory.add_to_group(GROUP_NEW_WORKER, node_names);

        match adm
            .run_playbook_with_inventory(
                self.connector.as_ref(),
                inventory,
                playbook::ADD_WORKER,
                "",
            )
            .await
        {
            Ok(()) => {
                if let Err(e) = self
                    .store
                    .update_nodes(
                        &node_ids,
                        NodeStatusUpdate::status(NodeStatus::Running)
                            .with_pre_status(NodeStatus::Initializing)
                            .with_message(""),
                    )
                    .await
                {
                    error!(cluster = %adm.cluster.name, error = %e, "failed to mark nodes running");
                    return;
                }
                info!(cluster = %adm.cluster.name, count = node_ids.len(), "workers joined");
                self.notify(&adm.cluster.name, MessageKind::ClusterAddWorker, true, "")
                    .await;
            }
            Err(e) => {
                self.fail_nodes(&node_ids, &e.to_string(), false).await;
                self.notify(&adm.cluster.name, MessageKind::ClusterAddWorker, false, &e.to_string())
                    .await;
            }
        }
    }

    /// Background removal workflow: remote teardown for healthy nodes only,
    /// then bookkeeping for the whole batch.
    async fn run_remove(&self, mut cluster: Cluster, targets: Vec<ClusterNode>) {
        let node_ids: Vec<String> = targets.iter().map(|n| n.id.clone()).collect();
        let healthy: Vec<&ClusterNode> = targets.iter().filter(|n| !n.dirty).collect();

        if !healthy.is_empty() {
            let healthy_ids: Vec<String> = healthy.iter().map(|n| n.id.clone()).collect();
            let healthy_names: Vec<String> = healthy.iter().map(|n| n.name.clone()).collect();
            let adm = match self.stage_playbook_run(&mut cluster).await {
                Ok(adm) => adm,
                Err(e) => {
                    self.fail_nodes(&healthy_ids, &e.to_string(), false).await;
                    self.notify(&cluster.name, MessageKind::ClusterRemoveWorker, false, &e.to_string())
                        .await;
                    return;
                }
            };
            let mut inventory = adm.inventory();
            inventory.add_to_group(GROUP_DEL_WORKER, healthy_names);
            if let Err(e) = adm
                .run_playbook_with_inventory(
                    self.connector.as_ref(),
                    inventory,
                    playbook::REMOVE_WORKER,
                    "",
                )
                .await
            {
                error!(cluster = %adm.cluster.name, error = %e, "worker removal playbook failed");
                self.fail_nodes(&healthy_ids, &e.to_string(), true).await;
                self.notify(&adm.cluster.name, MessageKind::ClusterRemoveWorker, false, &e.to_string())
                    .await;
                return;
            }
            cluster = adm.cluster;
        }

        let host_ids: Vec<String> = targets
            .iter()
            .filter(|n| !n.host_id.is_empty())
            .map(|n| n.host_id.clone())
            .collect();
        let bookkeeping = match cluster.provider {
            Provider::Plan => self.teardown_plan_hosts(&cluster, &node_ids, &host_ids).await,
            Provider::BareMetal => self
                .store
                .release_bare_metal_nodes(&node_ids, &host_ids)
                .await
                .map_err(Error::from),
        };
        if let Err(e) = bookkeeping {
            error!(cluster = %cluster.name, error = %e, "node removal bookkeeping failed");
            self.fail_nodes(&node_ids, &e.to_string(), true).await;
            self.notify(&cluster.name, MessageKind::ClusterRemoveWorker, false, &e.to_string())
                .await;
            return;
        }
        info!(cluster = %cluster.name, count = node_ids.len(), "workers removed");
        self.notify(&cluster.name, MessageKind::ClusterRemoveWorker, true, "")
            .await;
    }

    async fn teardown_plan_hosts(
        &self,
        cluster: &Cluster,
        node_ids: &[String],
        host_ids: &[String],
    ) -> Result<()> {
        let plan = self.plan_of(cluster).await?;
        let hosts = self.store.get_hosts_by_ids(host_ids).await?;
        self.provisioner
            .destroy(&hosts, &plan)
            .await
            .map_err(Error::from)?;
        let ips: Vec<String> = hosts.iter().map(|h| h.ip.clone()).collect();
        self.store
            .remove_plan_nodes(node_ids, host_ids, &ips)
            .await?;
        Ok(())
    }

    /// Load everything a membership playbook run needs and assemble the
    /// working aggregate: hosts, variable bag, fresh log stream.
    async fn stage_playbook_run(&self, cluster: &mut Cluster) -> Result<AdmCluster> {
        let manifest = self.manifest(&cluster.spec.version).await?;
        let vars = self.playbook_vars(cluster, &manifest).await?;
        let hosts = self.hosts_for(cluster).await?;
        let log = self.open_log(cluster).await?;
        let mut adm = AdmCluster::new(cluster.clone(), hosts, log);
        adm.vars = vars;
        adm.current_manifest = Some(manifest);
        Ok(adm)
    }

    async fn plan_of(&self, cluster: &Cluster) -> Result<Plan> {
        let plan_id = cluster
            .plan_id
            .clone()
            .ok_or_else(|| Error::Validation(format!("cluster {} has no plan", cluster.name)))?;
        self.store
            .get_plan(&plan_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "plan",
                name: plan_id,
            })
    }

    /// Smallest free `<cluster>-worker-<n>` names, checked against both
    /// node and host names.
    async fn next_worker_names(&self, cluster: &Cluster, count: usize) -> Result<Vec<String>> {
        let mut taken: BTreeSet<String> = cluster.nodes.iter().map(|n| n.name.clone()).collect();
        for host in self.store.list_hosts().await? {
            taken.insert(host.name);
        }
        let mut names = Vec::with_capacity(count);
        let mut index = 1;
        while names.len() < count {
            let candidate = format!("{}-{}-{}", cluster.name, NodeRole::Worker.as_str(), index);
            if taken.insert(candidate.clone()) {
                names.push(candidate);
            }
            index += 1;
        }
        Ok(names)
    }

    async fn fail_nodes(&self, node_ids: &[String], message: &str, dirty: bool) {
        let mut update = NodeStatusUpdate::status(NodeStatus::Failed).with_message(message);
        if dirty {
            update = update.with_dirty(true);
        }
        if let Err(e) = self.store.update_nodes(node_ids, update).await {
            error!(error = %e, "failed to record node failure");
        }
    }

    async fn notify(&self, cluster: &str, kind: MessageKind, success: bool, detail: &str) {
        push_quietly(
            self.notifier.as_ref(),
            Message {
                cluster: cluster.to_string(),
                kind,
                success,
                detail: detail.to_string(),
            },
        )
        .await;
    }
}

fn ensure_no_node_task(cluster: &Cluster) -> Result<()> {
    let busy = cluster
        .nodes
        .iter()
        .any(|n| !n.dirty && (n.status.is_mid_operation() || n.status == NodeStatus::Terminating));
    if busy {
        return Err(Error::NodeTaskInProgress);
    }
    Ok(())
}

fn worker_model(plan: &Plan) -> Result<String> {
    let vars: serde_json::Value = serde_json::from_str(&plan.vars)?;
    vars.get("worker_model")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Validation(format!("plan {} has no worker_model", plan.name)))
}
