//! Versioned component manifests and per-cluster tool records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One `name -> version` pair inside a manifest variable group.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NameVersion {
    pub name: String,
    pub version: String,
}

/// A released component bundle, keyed by its Kubernetes version name.
///
/// The `*_vars` fields hold JSON `NameVersion` lists the way the store
/// persists them; [`ClusterManifest::vars`] flattens them into the variable
/// bag handed to the automation driver (`etcd_version`, `docker_version`, ...).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterManifest {
    pub id: String,
    /// Manifest name doubles as the cluster version string (e.g. `v1.20.8-fo1`).
    pub name: String,
    pub version: String,
    pub is_active: bool,
    pub core_vars: String,
    pub network_vars: String,
    pub other_vars: String,
    pub tool_vars: String,
}

impl ClusterManifest {
    /// Flatten the core/network/other groups into `<name>_version` variables.
    pub fn vars(&self) -> Result<BTreeMap<String, String>, serde_json::Error> {
        let mut out = BTreeMap::new();
        for group in [&self.core_vars, &self.network_vars, &self.other_vars] {
            if group.is_empty() {
                continue;
            }
            let items: Vec<NameVersion> = serde_json::from_str(group)?;
            for item in items {
                out.insert(format!("{}_version", item.name), item.version);
            }
        }
        Ok(out)
    }

    /// Parse the tool variable group.
    pub fn tool_vars(&self) -> Result<Vec<NameVersion>, serde_json::Error> {
        if self.tool_vars.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&self.tool_vars)
    }
}

/// Deployment state of one cluster tool (chart-installed component).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterTool {
    pub id: String,
    pub cluster_id: String,
    pub name: String,
    pub version: String,
    /// Version staged by an upgrade while the tool is still running.
    pub higher_version: Option<String>,
    /// `Waiting` tools take the new version directly; anything else gets
    /// the upgrade staged into `higher_version`.
    pub status: String,
}
