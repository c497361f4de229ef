//! Upgrade orchestrator.
//!
//! Validates the target version, stages tool upgrades, and drives the
//! upgrade chain in the background. Re-submitting the same target version
//! after a failure resumes at the failed stage; a different target restarts
//! the chain from scratch.

use std::sync::Arc;

use tracing::{error, info};

use crate::adm::stage::UpgradeStage;
use crate::adm::{AdmCluster, ChainProgress, ClusterAdm, conditions, version};
use crate::error::{Error, Result};
use crate::model::{Cluster, ClusterManifest, Phase, Source};
use crate::notify::{Message, MessageKind, push_quietly};

use super::Orchestrator;

/// Tool status whose rows take a staged version immediately.
const TOOL_STATUS_WAITING: &str = "Waiting";

impl Orchestrator {
    /// Launch (or resume) an upgrade of the cluster to `target_version`.
    pub async fn start_upgrade(&self, name: &str, target_version: &str) -> Result<()> {
        let mut cluster = self.load_cluster(name).await?;
        let guard = self.locks.try_acquire(name, "upgrade")?;
        if cluster.source != Source::Local {
            return Err(Error::ClusterNotLocal);
        }
        if !cluster.status.phase.is_terminal() {
            return Err(Error::InvalidPhase {
                cluster: name.to_string(),
                phase: cluster.status.phase.to_string(),
            });
        }
        if !version::is_newer_than(target_version, &cluster.spec.version) {
            return Err(Error::Validation(format!(
                "target version {target_version} is not newer than {}",
                cluster.spec.version
            )));
        }
        let target = self.manifest(target_version).await?;

        let resuming = cluster.status.phase == Phase::Failed
            && cluster.spec.upgrade_version.as_deref() == Some(target_version)
            && cluster
                .status
                .conditions
                .iter()
                .any(|c| UpgradeStage::from_name(&c.name).is_some());
        if resuming {
            conditions::reset_failed(&mut cluster.status.conditions);
        } else {
            conditions::reset_all(&mut cluster.status.conditions);
        }

        cluster.spec.upgrade_version = Some(target_version.to_string());
        self.store.save_spec(&cluster.spec).await?;
        self.stage_tool_versions(&cluster, &target).await?;

        let vars = self.playbook_vars(&cluster, &target).await?;
        let hosts = self.hosts_for(&cluster).await?;
        let current = self.store.get_manifest(&cluster.spec.version).await?;
        let log = self.open_log(&mut cluster).await?;

        cluster.status.pre_phase = cluster.status.phase;
        cluster.status.phase = Phase::Upgrading;
        cluster.status.message.clear();
        self.store.save_status(&cluster.status).await?;
        info!(cluster = %name, target = target_version, resuming, "upgrade chain started");

        let mut adm = AdmCluster::new(cluster, hosts, log);
        adm.vars = vars;
        adm.current_manifest = current;
        adm.target_manifest = Some(target);

        let engine = ClusterAdm::new(Arc::clone(&self.connector));
        let this = self.clone();
        let cluster_name = name.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            loop {
                let progress = engine.step_upgrade(&mut adm).await;
                if let Err(e) = this.store.save_status(&adm.cluster.status).await {
                    error!(cluster = %cluster_name, error = %e, "failed to persist chain progress");
                    return;
                }
                match progress {
                    ChainProgress::Advanced { .. } => {}
                    ChainProgress::StageFailed { message, .. } => {
                        push_quietly(
                            this.notifier.as_ref(),
                            Message {
                                cluster: cluster_name,
                                kind: MessageKind::ClusterUpgrade,
                                success: false,
                                detail: message,
                            },
                        )
                        .await;
                        return;
                    }
                    ChainProgress::Complete => {
                        // the engine promoted the staged version into the spec
                        if let Err(e) = this.store.save_spec(&adm.cluster.spec).await {
                            error!(cluster = %cluster_name, error = %e, "failed to persist upgraded version");
                            return;
                        }
                        info!(
                            cluster = %cluster_name,
                            version = %adm.cluster.spec.version,
                            "upgrade chain complete"
                        );
                        push_quietly(
                            this.notifier.as_ref(),
                            Message {
                                cluster: cluster_name,
                                kind: MessageKind::ClusterUpgrade,
                                success: true,
                                detail: String::new(),
                            },
                        )
                        .await;
                        return;
                    }
                }
            }
        });
        Ok(())
    }

    /// Stage tool upgrades declared by the target manifest: waiting tools
    /// take the new version directly, anything running gets it parked in
    /// `higher_version` for a later tool upgrade.
    async fn stage_tool_versions(
        &self,
        cluster: &Cluster,
        target: &ClusterManifest,
    ) -> Result<()> {
        let tools = self.store.list_tools(&cluster.id).await?;
        for staged in target.tool_vars()? {
            let Some(mut tool) = tools.iter().find(|t| t.name == staged.name).cloned() else {
                continue;
            };
            if !version::is_newer_than(&staged.version, &tool.version) {
                continue;
            }
            if tool.status == TOOL_STATUS_WAITING {
                tool.version = staged.version;
                tool.higher_version = None;
            } else {
                tool.higher_version = Some(staged.version);
            }
            self.store.save_tool(&tool).await?;
        }
        Ok(())
    }
}
