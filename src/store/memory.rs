//! In-memory [`Store`] backed by a single `RwLock`.
//!
//! Reference implementation used by the functional tests and as the model
//! for what a database-backed store must guarantee: every composite method
//! mutates under one write guard, so partial application is impossible.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{
    Cluster, ClusterManifest, ClusterNode, ClusterResource, ClusterSpec, ClusterStatus,
    ClusterTool, Host, Ip, IpStatus, Plan, ProjectResource, ResourceType, VmConfig,
};

use super::{NodeStatusUpdate, Store, StoreError};

#[derive(Default)]
struct Inner {
    /// Clusters keyed by id; the `nodes` field is assembled on read.
    clusters: BTreeMap<String, Cluster>,
    nodes: BTreeMap<String, ClusterNode>,
    hosts: BTreeMap<String, Host>,
    ips: BTreeMap<String, Ip>,
    plans: BTreeMap<String, Plan>,
    vm_configs: BTreeMap<String, VmConfig>,
    manifests: BTreeMap<String, ClusterManifest>,
    tools: BTreeMap<String, ClusterTool>,
    project_resources: BTreeMap<String, ProjectResource>,
    cluster_resources: BTreeMap<String, ClusterResource>,
    settings: BTreeMap<String, String>,
}

impl Inner {
    fn assemble(&self, cluster: &Cluster) -> Cluster {
        let mut cluster = cluster.clone();
        cluster.nodes = self
            .nodes
            .values()
            .filter(|n| n.cluster_id == cluster.id)
            .cloned()
            .collect();
        cluster
    }
}

/// Lock-guarded in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_cluster(&self, name: &str) -> Result<Option<Cluster>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .clusters
            .values()
            .find(|c| c.name == name)
            .map(|c| inner.assemble(c)))
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .clusters
            .values()
            .map(|c| inner.assemble(c))
            .collect())
    }

    async fn save_cluster(&self, cluster: &Cluster) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let mut cluster = cluster.clone();
        cluster.nodes = Vec::new();
        inner.clusters.insert(cluster.id.clone(), cluster);
        Ok(())
    }

    async fn save_status(&self, status: &ClusterStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let cluster = inner
            .clusters
            .get_mut(&status.cluster_id)
            .ok_or_else(|| StoreError::not_found("cluster", &status.cluster_id))?;
        cluster.status = status.clone();
        Ok(())
    }

    async fn save_spec(&self, spec: &ClusterSpec) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let cluster = inner
            .clusters
            .get_mut(&spec.cluster_id)
            .ok_or_else(|| StoreError::not_found("cluster", &spec.cluster_id))?;
        cluster.spec = spec.clone();
        Ok(())
    }

    async fn list_nodes(&self, cluster_id: &str) -> Result<Vec<ClusterNode>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .nodes
            .values()
            .filter(|n| n.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    async fn get_node(
        &self,
        cluster_id: &str,
        name: &str,
    ) -> Result<Option<ClusterNode>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .nodes
            .values()
            .find(|n| n.cluster_id == cluster_id && n.name == name)
            .cloned())
    }

    async fn update_nodes(
        &self,
        node_ids: &[String],
        update: NodeStatusUpdate,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for id in node_ids {
            let node = inner
                .nodes
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("node", id))?;
            if let Some(status) = update.status {
                node.status = status;
            }
            if let Some(pre) = update.pre_status {
                node.pre_status = pre;
            }
            if let Some(message) = &update.message {
                node.message = message.clone();
            }
            if let Some(dirty) = update.dirty {
                node.dirty = dirty;
            }
            if update.clear_host {
                node.host_id.clear();
            }
        }
        Ok(())
    }

    async fn create_nodes_with_hosts(
        &self,
        nodes: &[ClusterNode],
        hosts: &[Host],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for node in nodes {
            if inner
                .nodes
                .values()
                .any(|n| n.cluster_id == node.cluster_id && n.name == node.name)
            {
                return Err(StoreError::Conflict(format!(
                    "node {} already exists",
                    node.name
                )));
            }
        }
        for node in nodes {
            inner.nodes.insert(node.id.clone(), node.clone());
        }
        for host in hosts {
            inner.hosts.insert(host.id.clone(), host.clone());
        }
        Ok(())
    }

    async fn list_hosts(&self) -> Result<Vec<Host>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.hosts.values().cloned().collect())
    }

    async fn get_hosts_by_names(&self, names: &[String]) -> Result<Vec<Host>, StoreError> {
        let inner = self.inner.read().await;
        let mut hosts = Vec::with_capacity(names.len());
        for name in names {
            let host = inner
                .hosts
                .values()
                .find(|h| &h.name == name)
                .ok_or_else(|| StoreError::not_found("host", name))?;
            hosts.push(host.clone());
        }
        Ok(hosts)
    }

    async fn get_hosts_by_ids(&self, ids: &[String]) -> Result<Vec<Host>, StoreError> {
        let inner = self.inner.read().await;
        let mut hosts = Vec::with_capacity(ids.len());
        for id in ids {
            let host = inner
                .hosts
                .get(id)
                .ok_or_else(|| StoreError::not_found("host", id))?;
            hosts.push(host.clone());
        }
        Ok(hosts)
    }

    async fn save_host(&self, host: &Host) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.hosts.insert(host.id.clone(), host.clone());
        Ok(())
    }

    async fn commit_new_hosts(
        &self,
        hosts: &[Host],
        nodes: &[ClusterNode],
        project_resources: &[ProjectResource],
        cluster_resources: &[ClusterResource],
        cluster_id: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for host in hosts {
            if inner.hosts.values().any(|h| h.name == host.name) {
                return Err(StoreError::Conflict(format!(
                    "host {} already exists",
                    host.name
                )));
            }
        }
        for node in nodes {
            if inner
                .nodes
                .values()
                .any(|n| n.cluster_id == node.cluster_id && n.name == node.name)
            {
                return Err(StoreError::Conflict(format!(
                    "node {} already exists",
                    node.name
                )));
            }
        }
        for host in hosts {
            inner.hosts.insert(host.id.clone(), host.clone());
            let claimed = inner.ips.values_mut().find(|ip| ip.address == host.ip);
            if let Some(ip) = claimed {
                ip.status = IpStatus::Used;
                ip.cluster_id = Some(cluster_id.to_string());
            }
        }
        for node in nodes {
            inner.nodes.insert(node.id.clone(), node.clone());
        }
        for resource in project_resources {
            inner
                .project_resources
                .insert(resource.id.clone(), resource.clone());
        }
        for resource in cluster_resources {
            inner
                .cluster_resources
                .insert(resource.id.clone(), resource.clone());
        }
        Ok(())
    }

    async fn remove_plan_nodes(
        &self,
        node_ids: &[String],
        host_ids: &[String],
        host_ips: &[String],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for id in node_ids {
            inner.nodes.remove(id);
        }
        for id in host_ids {
            inner.hosts.remove(id);
        }
        inner
            .project_resources
            .retain(|_, r| !(r.resource_type == ResourceType::Host && host_ids.contains(&r.resource_id)));
        inner
            .cluster_resources
            .retain(|_, r| !(r.resource_type == ResourceType::Host && host_ids.contains(&r.resource_id)));
        for ip in inner.ips.values_mut() {
            if host_ips.contains(&ip.address) {
                ip.status = IpStatus::Available;
                ip.cluster_id = None;
            }
        }
        Ok(())
    }

    async fn release_bare_metal_nodes(
        &self,
        node_ids: &[String],
        host_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for id in node_ids {
            inner.nodes.remove(id);
        }
        for id in host_ids {
            if let Some(host) = inner.hosts.get_mut(id) {
                host.cluster_id = None;
            }
        }
        Ok(())
    }

    async fn available_ips(&self, ip_pool_id: &str) -> Result<Vec<Ip>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .ips
            .values()
            .filter(|ip| ip.ip_pool_id == ip_pool_id && ip.status == IpStatus::Available)
            .cloned()
            .collect())
    }

    async fn save_ip(&self, ip: &Ip) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.ips.insert(ip.id.clone(), ip.clone());
        Ok(())
    }

    async fn get_plan(&self, id: &str) -> Result<Option<Plan>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.plans.get(id).cloned())
    }

    async fn save_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn get_vm_config(&self, name: &str) -> Result<Option<VmConfig>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.vm_configs.get(name).cloned())
    }

    async fn save_vm_config(&self, config: &VmConfig) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.vm_configs.insert(config.name.clone(), config.clone());
        Ok(())
    }

    async fn get_manifest(&self, name: &str) -> Result<Option<ClusterManifest>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.manifests.get(name).cloned())
    }

    async fn save_manifest(&self, manifest: &ClusterManifest) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .manifests
            .insert(manifest.name.clone(), manifest.clone());
        Ok(())
    }

    async fn list_tools(&self, cluster_id: &str) -> Result<Vec<ClusterTool>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tools
            .values()
            .filter(|t| t.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    async fn save_tool(&self, tool: &ClusterTool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.tools.insert(tool.id.clone(), tool.clone());
        Ok(())
    }

    async fn project_resource_for(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
    ) -> Result<Option<ProjectResource>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .project_resources
            .values()
            .find(|r| r.resource_id == resource_id && r.resource_type == resource_type)
            .cloned())
    }

    async fn save_project_resource(&self, resource: &ProjectResource) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .project_resources
            .insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.settings.get(key).cloned())
    }

    async fn save_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
