//! Inventory builder: named host groups handed to the automation driver.
//!
//! Group names are part of the contract with the playbook repository:
//! `new-worker` and `del-worker` select the nodes a membership operation
//! targets, the rest describe standing topology.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Cluster, Host, NodeRole};

/// Group of worker nodes being joined by the current operation.
pub const GROUP_NEW_WORKER: &str = "new-worker";
/// Group of worker nodes being removed by the current operation.
pub const GROUP_DEL_WORKER: &str = "del-worker";

const GROUP_MASTER: &str = "kube-master";
const GROUP_WORKER: &str = "kube-worker";
const GROUP_ETCD: &str = "etcd";
const GROUP_CLUSTER: &str = "kube-cluster";
const GROUP_LB: &str = "lb";
const GROUP_CHRONY: &str = "chrony";

/// Connection variables for one inventory host.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HostVars {
    pub ip: String,
    pub port: u16,
}

/// A named group of host names. `children` nests other groups.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Group {
    pub name: String,
    pub hosts: Vec<String>,
    pub children: Vec<String>,
}

/// Named host groups plus per-host connection variables.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Inventory {
    pub groups: Vec<Group>,
    pub hosts: BTreeMap<String, HostVars>,
}

impl Inventory {
    /// Build the standing inventory for a cluster from its node records and
    /// the hosts backing them. Nodes in `Terminating` still appear: the
    /// remove playbook needs to reach them.
    pub fn for_cluster(cluster: &Cluster, hosts: &[Host]) -> Self {
        let host_by_id: BTreeMap<&str, &Host> =
            hosts.iter().map(|h| (h.id.as_str(), h)).collect();

        let mut masters = Vec::new();
        let mut workers = Vec::new();
        let mut host_vars = BTreeMap::new();
        for node in &cluster.nodes {
            match node.role {
                NodeRole::Master => masters.push(node.name.clone()),
                NodeRole::Worker => workers.push(node.name.clone()),
            }
            if let Some(host) = host_by_id.get(node.host_id.as_str()) {
                host_vars.insert(
                    node.name.clone(),
                    HostVars {
                        ip: host.ip.clone(),
                        port: host.port,
                    },
                );
            }
        }

        Inventory {
            groups: vec![
                Group {
                    name: GROUP_MASTER.to_string(),
                    hosts: masters.clone(),
                    children: Vec::new(),
                },
                Group {
                    name: GROUP_WORKER.to_string(),
                    hosts: workers,
                    children: Vec::new(),
                },
                Group {
                    name: GROUP_ETCD.to_string(),
                    hosts: masters,
                    children: Vec::new(),
                },
                Group {
                    name: GROUP_CLUSTER.to_string(),
                    hosts: Vec::new(),
                    children: vec![GROUP_MASTER.to_string(), GROUP_WORKER.to_string()],
                },
                Group {
                    name: GROUP_LB.to_string(),
                    hosts: Vec::new(),
                    children: Vec::new(),
                },
                Group {
                    name: GROUP_CHRONY.to_string(),
                    hosts: Vec::new(),
                    children: vec![GROUP_CLUSTER.to_string()],
                },
                Group {
                    name: GROUP_NEW_WORKER.to_string(),
                    hosts: Vec::new(),
                    children: Vec::new(),
                },
                Group {
                    name: GROUP_DEL_WORKER.to_string(),
                    hosts: Vec::new(),
                    children: Vec::new(),
                },
            ],
            hosts: host_vars,
        }
    }

    /// Append host names to a group, creating the group if needed.
    pub fn add_to_group(&mut self, group_name: &str, names: impl IntoIterator<Item = String>) {
        if let Some(group) = self.groups.iter_mut().find(|g| g.name == group_name) {
            group.hosts.extend(names);
            return;
        }
        self.groups.push(Group {
            name: group_name.to_string(),
            hosts: names.into_iter().collect(),
            children: Vec::new(),
        });
    }

    /// Host names in a group, empty when the group is missing.
    pub fn group(&self, group_name: &str) -> &[String] {
        self.groups
            .iter()
            .find(|g| g.name == group_name)
            .map(|g| g.hosts.as_slice())
            .unwrap_or(&[])
    }
}
