//! Upgrade chain stage execution.
//!
//! Component stages are version-gated: the runtime and etcd playbooks only
//! run when the target manifest carries a strictly newer version than the
//! deployed one, and a skipped stage still counts as success so its
//! condition flips to `True`.

use crate::automation::{AutomationConnector, AutomationError, write_log};
use crate::model::ClusterManifest;

use super::stage::{UpgradeStage, playbook};
use super::{AdmCluster, version};

pub(super) async fn run(
    adm: &mut AdmCluster,
    connector: &dyn AutomationConnector,
    stage: UpgradeStage,
) -> Result<(), AutomationError> {
    match stage {
        UpgradeStage::UpgradeTaskStart => {
            write_log(
                &adm.log,
                &format!("----upgrade cluster task {} start----", adm.cluster.name),
            );
            Ok(())
        }
        UpgradeStage::BackupEtcd => adm.run_playbook(connector, playbook::BACKUP_CLUSTER, "").await,
        UpgradeStage::UpgradeRuntime => {
            let key = format!("{}_version", adm.cluster.spec.runtime_type);
            if component_changed(adm, &key) {
                adm.run_playbook(connector, playbook::CONTAINER_RUNTIME, "upgrade")
                    .await
            } else {
                write_log(&adm.log, &format!("{key} unchanged, skipping"));
                Ok(())
            }
        }
        UpgradeStage::UpgradeEtcd => {
            if component_changed(adm, "etcd_version") {
                adm.run_playbook(connector, playbook::ETCD, "upgrade").await
            } else {
                write_log(&adm.log, "etcd_version unchanged, skipping");
                Ok(())
            }
        }
        UpgradeStage::UpgradeKubernetes => {
            if let Some(target) = &adm.target_manifest {
                let kube_version = version::kubernetes_version(&target.name).to_string();
                adm.set_var("kube_upgrade_version", &kube_version);
            }
            adm.run_playbook(connector, playbook::UPGRADE_CLUSTER, "").await
        }
        UpgradeStage::UpdateCertificates => {
            adm.run_playbook(connector, playbook::CERTIFICATES, "").await
        }
    }
}

/// True when the target manifest carries a strictly newer version for `key`.
/// An unknown version on either side runs the stage rather than skipping it.
fn component_changed(adm: &AdmCluster, key: &str) -> bool {
    let (Some(current), Some(target)) = (
        component_version(&adm.current_manifest, key),
        component_version(&adm.target_manifest, key),
    ) else {
        return true;
    };
    version::is_newer_than(&target, &current)
}

fn component_version(manifest: &Option<ClusterManifest>, key: &str) -> Option<String> {
    manifest.as_ref()?.vars().ok()?.get(key).cloned()
}
