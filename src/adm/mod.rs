//! Lifecycle chain engine.
//!
//! A chain is an ordered list of named stages whose progress is recorded as
//! conditions on the cluster status. [`ClusterAdm::step_create`] and
//! [`ClusterAdm::step_upgrade`] each execute exactly one stage: the first
//! whose condition is not `True`, or the first stage of the chain when no
//! conditions exist yet. Failures are recorded as state, not returned as
//! errors, so a crashed or failed chain resumes from the same stage on the
//! next step.

pub mod conditions;
mod create;
pub mod stage;
mod upgrade;
pub mod version;

use std::collections::BTreeMap;
use std::sync::Arc;

use jiff::Timestamp;
use tracing::{error, info};

use crate::automation::{AutomationConnector, AutomationError, LogSink};
use crate::inventory::Inventory;
use crate::model::{Cluster, ClusterManifest, ConditionStatus, Host, Phase};

pub use stage::{CreateStage, DONE_CONDITION, UpgradeStage};

/// Working state for one chain execution: the cluster aggregate, its hosts,
/// and the variable bag handed to every playbook run.
pub struct AdmCluster {
    pub cluster: Cluster,
    pub hosts: Vec<Host>,
    pub vars: BTreeMap<String, String>,
    /// Manifest of the version currently deployed.
    pub current_manifest: Option<ClusterManifest>,
    /// Manifest of the version being upgraded to.
    pub target_manifest: Option<ClusterManifest>,
    pub log: LogSink,
}

impl AdmCluster {
    pub fn new(cluster: Cluster, hosts: Vec<Host>, log: LogSink) -> Self {
        Self {
            cluster,
            hosts,
            vars: BTreeMap::new(),
            current_manifest: None,
            target_manifest: None,
            log,
        }
    }

    pub fn set_var(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    pub fn inventory(&self) -> Inventory {
        Inventory::for_cluster(&self.cluster, &self.hosts)
    }

    /// Connect a fresh driver session and run one playbook with the staged
    /// variable bag.
    pub async fn run_playbook(
        &self,
        connector: &dyn AutomationConnector,
        playbook: &str,
        tag: &str,
    ) -> Result<(), AutomationError> {
        self.run_playbook_with_inventory(connector, self.inventory(), playbook, tag)
            .await
    }

    /// Like [`run_playbook`](Self::run_playbook), but with a caller-built
    /// inventory. Membership workflows use this to populate the
    /// `new-worker`/`del-worker` groups.
    pub async fn run_playbook_with_inventory(
        &self,
        connector: &dyn AutomationConnector,
        inventory: Inventory,
        playbook: &str,
        tag: &str,
    ) -> Result<(), AutomationError> {
        let mut driver = connector.connect(inventory, Arc::clone(&self.log));
        for (key, value) in &self.vars {
            driver.set_var(key, value);
        }
        driver.run(playbook, tag).await
    }
}

/// Outcome of one chain step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainProgress {
    /// The stage succeeded and the chain moved on.
    Advanced { completed: String, next: String },
    /// The stage failed; the cluster is now `Failed` and resumable.
    StageFailed { stage: String, message: String },
    /// Every stage is `True`; the cluster is `Running`.
    Complete,
}

/// Chain engine. Stateless apart from the injected automation connector;
/// all progress lives on the cluster passed in.
pub struct ClusterAdm {
    connector: Arc<dyn AutomationConnector>,
}

impl ClusterAdm {
    pub fn new(connector: Arc<dyn AutomationConnector>) -> Self {
        Self { connector }
    }

    /// Execute the next pending stage of the create chain.
    pub async fn step_create(&self, adm: &mut AdmCluster) -> ChainProgress {
        let name = match self.resume_point(adm, CreateStage::first().name()) {
            Some(name) => name,
            None => return ChainProgress::Complete,
        };
        let Some(stage) = CreateStage::from_name(&name) else {
            return self.fail_stage(adm, &name, &format!("unknown stage {name}"));
        };

        info!(cluster = %adm.cluster.name, stage = name, "running create stage");
        match create::run(adm, self.connector.as_ref(), stage).await {
            Ok(()) => self.advance(adm, &name, stage.next().map(|s| s.name())),
            Err(e) => self.fail_stage(adm, &name, &e.to_string()),
        }
    }

    /// Execute the next pending stage of the upgrade chain. On terminal
    /// success the staged upgrade version is promoted into the spec.
    pub async fn step_upgrade(&self, adm: &mut AdmCluster) -> ChainProgress {
        let name = match self.resume_point(adm, UpgradeStage::first().name()) {
            Some(name) => name,
            None => return ChainProgress::Complete,
        };
        let Some(stage) = UpgradeStage::from_name(&name) else {
            return self.fail_stage(adm, &name, &format!("unknown stage {name}"));
        };

        info!(cluster = %adm.cluster.name, stage = name, "running upgrade stage");
        match upgrade::run(adm, self.connector.as_ref(), stage).await {
            Ok(()) => {
                let progress = self.advance(adm, &name, stage.next().map(|s| s.name()));
                if matches!(progress, ChainProgress::Complete)
                    && let Some(version) = adm.cluster.spec.upgrade_version.take()
                {
                    adm.cluster.spec.version = version;
                }
                progress
            }
            Err(e) => self.fail_stage(adm, &name, &e.to_string()),
        }
    }

    /// Name of the stage to run next: the first incomplete condition, the
    /// chain's first stage when nothing is recorded yet, or `None` when the
    /// chain already ran to completion.
    fn resume_point(&self, adm: &AdmCluster, first: &str) -> Option<String> {
        let status = &adm.cluster.status;
        match conditions::current_condition(&status.conditions) {
            Some(condition) => Some(condition.name.clone()),
            None if status.conditions.is_empty() => Some(first.to_string()),
            None => None,
        }
    }

    fn advance(&self, adm: &mut AdmCluster, completed: &str, next: Option<&str>) -> ChainProgress {
        let status = &mut adm.cluster.status;
        conditions::set_condition(
            &mut status.conditions,
            conditions::condition(completed, ConditionStatus::True, "", Timestamp::now()),
        );
        match next {
            Some(next) => {
                conditions::set_condition(
                    &mut status.conditions,
                    conditions::condition(next, ConditionStatus::Unknown, "", Timestamp::now()),
                );
                ChainProgress::Advanced {
                    completed: completed.to_string(),
                    next: next.to_string(),
                }
            }
            None => {
                conditions::set_condition(
                    &mut status.conditions,
                    conditions::condition(DONE_CONDITION, ConditionStatus::True, "", Timestamp::now()),
                );
                status.pre_phase = status.phase;
                status.phase = Phase::Running;
                status.message.clear();
                ChainProgress::Complete
            }
        }
    }

    fn fail_stage(&self, adm: &mut AdmCluster, name: &str, message: &str) -> ChainProgress {
        error!(cluster = %adm.cluster.name, stage = name, message, "stage failed");
        let status = &mut adm.cluster.status;
        conditions::set_condition(
            &mut status.conditions,
            conditions::condition(name, ConditionStatus::False, message, Timestamp::now()),
        );
        status.pre_phase = status.phase;
        status.phase = Phase::Failed;
        status.message = message.to_string();
        ChainProgress::StageFailed {
            stage: name.to_string(),
            message: message.to_string(),
        }
    }
}
