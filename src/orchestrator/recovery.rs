//! Process-start recovery.
//!
//! Background workflows do not survive a restart; their in-flight state
//! does. Recovery walks the store once and forces every cluster that is not
//! in a terminal phase to `Failed` so it can be retried, preserving where
//! each cluster was in `pre_phase`.

use tracing::info;

use crate::error::Result;
use crate::model::{ConditionStatus, NodeStatus, Phase};
use crate::store::NodeStatusUpdate;

use super::Orchestrator;

const CANCELLED_MESSAGE: &str = "task cancelled by service restart";

impl Orchestrator {
    /// Cancel every operation interrupted by the previous shutdown. Run
    /// once before accepting new work.
    pub async fn recover(&self) -> Result<()> {
        for mut cluster in self.store.list_clusters().await? {
            let phase = cluster.status.phase;
            if !phase.is_terminal() {
                info!(cluster = %cluster.name, phase = %phase, "cancelling interrupted operation");
                cluster.status.pre_phase = phase;
                cluster.status.phase = Phase::Failed;
                cluster.status.message = CANCELLED_MESSAGE.to_string();
                for condition in &mut cluster.status.conditions {
                    if condition.status == ConditionStatus::Unknown {
                        condition.status = ConditionStatus::False;
                        condition.message = CANCELLED_MESSAGE.to_string();
                    }
                }
                self.store.save_status(&cluster.status).await?;
            }

            let stuck: Vec<String> = cluster
                .nodes
                .iter()
                .filter(|n| n.status.is_mid_operation() || n.status == NodeStatus::Terminating)
                .map(|n| n.id.clone())
                .collect();
            if !stuck.is_empty() {
                info!(cluster = %cluster.name, count = stuck.len(), "cancelling interrupted node workflows");
                self.store
                    .update_nodes(
                        &stuck,
                        NodeStatusUpdate::status(NodeStatus::Failed)
                            .with_message(CANCELLED_MESSAGE),
                    )
                    .await?;
            }
        }
        Ok(())
    }
}
