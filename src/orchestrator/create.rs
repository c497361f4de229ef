//! Create-chain runner.
//!
//! Validates and stages the chain synchronously, then drives it to a
//! terminal phase in the background, persisting status after every step. A
//! `Failed` cluster can be re-submitted: only the failed stage reruns.

use std::sync::Arc;

use tracing::{error, info};

use crate::adm::{AdmCluster, ChainProgress, ClusterAdm, conditions};
use crate::error::{Error, Result};
use crate::model::Phase;
use crate::notify::{Message, MessageKind, push_quietly};

use super::Orchestrator;

impl Orchestrator {
    /// Launch (or resume) the create chain for a cluster.
    ///
    /// Returns once the background chain is running; progress is observable
    /// through the cluster's status record.
    pub async fn start_create(&self, name: &str) -> Result<()> {
        let mut cluster = self.load_cluster(name).await?;
        let guard = self.locks.try_acquire(name, "create")?;
        if !matches!(cluster.status.phase, Phase::Pending | Phase::Failed) {
            return Err(Error::InvalidPhase {
                cluster: name.to_string(),
                phase: cluster.status.phase.to_string(),
            });
        }

        let manifest = self.manifest(&cluster.spec.version).await?;
        let vars = self.playbook_vars(&cluster, &manifest).await?;
        let hosts = self.hosts_for(&cluster).await?;
        let log = self.open_log(&mut cluster).await?;

        cluster.status.pre_phase = cluster.status.phase;
        cluster.status.phase = Phase::Initializing;
        cluster.status.message.clear();
        conditions::reset_failed(&mut cluster.status.conditions);
        self.store.save_status(&cluster.status).await?;
        info!(cluster = %name, "create chain started");

        let mut adm = AdmCluster::new(cluster, hosts, log);
        adm.vars = vars;
        adm.current_manifest = Some(manifest);

        let engine = ClusterAdm::new(Arc::clone(&self.connector));
        let this = self.clone();
        let cluster_name = name.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            loop {
                let progress = engine.step_create(&mut adm).await;
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
                                kind: MessageKind::ClusterInstall,
                                success: false,
                                detail: message,
                            },
                        )
                        .await;
                        return;
                    }
                    ChainProgress::Complete => {
                        info!(cluster = %cluster_name, "create chain complete");
                        push_quietly(
                            this.notifier.as_ref(),
                            Message {
                                cluster: cluster_name,
                                kind: MessageKind::ClusterInstall,
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
}
