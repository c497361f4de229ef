//! Workflow orchestrators.
//!
//! One [`Orchestrator`] value owns the injected ports and drives every
//! long-running workflow: the create and upgrade chains, node membership
//! batches, and startup recovery. Each workflow validates synchronously
//! under the cluster's advisory lock, then moves the guard into a spawned
//! task whose progress is observable only through the store and the
//! notifier.

pub mod lock;

mod create;
mod node;
mod recovery;
mod upgrade;

pub use node::BatchOperation;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adm::version;
use crate::automation::{AutomationConnector, LogSink, create_log_sink};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::model::{Cluster, ClusterManifest, Host};
use crate::notify::Notifier;
use crate::provider::{CloudProvider, HostProvisioner};
use crate::store::Store;

use lock::ClusterLocks;

/// Setting key for the fleet-wide NTP server override.
const SETTING_NTP_SERVER: &str = "ntp_server";

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn Store>,
    connector: Arc<dyn AutomationConnector>,
    cloud: Arc<dyn CloudProvider>,
    provisioner: Arc<dyn HostProvisioner>,
    notifier: Arc<dyn Notifier>,
    settings: Settings,
    locks: ClusterLocks,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        connector: Arc<dyn AutomationConnector>,
        cloud: Arc<dyn CloudProvider>,
        provisioner: Arc<dyn HostProvisioner>,
        notifier: Arc<dyn Notifier>,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            connector,
            cloud,
            provisioner,
            notifier,
            settings,
            locks: ClusterLocks::new(),
        }
    }

    async fn load_cluster(&self, name: &str) -> Result<Cluster> {
        self.store
            .get_cluster(name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "cluster",
                name: name.to_string(),
            })
    }

    /// Hosts backing the cluster's current node set.
    async fn hosts_for(&self, cluster: &Cluster) -> Result<Vec<Host>> {
        let ids: Vec<String> = cluster
            .nodes
            .iter()
            .filter(|n| !n.host_id.is_empty())
            .map(|n| n.host_id.clone())
            .collect();
        Ok(self.store.get_hosts_by_ids(&ids).await?)
    }

    /// Variable bag for a playbook run: the manifest's component versions
    /// plus the cluster-identity variables every playbook expects.
    async fn playbook_vars(
        &self,
        cluster: &Cluster,
        manifest: &ClusterManifest,
    ) -> Result<BTreeMap<String, String>> {
        let mut vars = manifest.vars()?;
        vars.insert("cluster_name".to_string(), cluster.name.clone());
        vars.insert(
            "kube_version".to_string(),
            version::kubernetes_version(&cluster.spec.version).to_string(),
        );
        vars.insert(
            "container_runtime".to_string(),
            cluster.spec.runtime_type.clone(),
        );
        vars.insert(
            "network_plugin".to_string(),
            cluster.spec.network_type.clone(),
        );
        vars.insert("architecture".to_string(), cluster.spec.architecture.clone());
        let ntp = match self.store.get_setting(SETTING_NTP_SERVER).await? {
            Some(server) => Some(server),
            None => self.settings.ntp_server.clone(),
        };
        if let Some(server) = ntp {
            vars.insert("ntp_server".to_string(), server);
        }
        Ok(vars)
    }

    async fn manifest(&self, version: &str) -> Result<ClusterManifest> {
        self.store
            .get_manifest(version)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "manifest",
                name: version.to_string(),
            })
    }

    /// Open a fresh automation log stream and record its id on the cluster.
    async fn open_log(&self, cluster: &mut Cluster) -> Result<LogSink> {
        let (log_id, sink) = create_log_sink(&self.settings.log_dir, &cluster.name)?;
        cluster.log_id = Some(log_id);
        self.store.save_cluster(cluster).await?;
        Ok(sink)
    }
}
