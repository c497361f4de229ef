//! Create chain stage execution.
//!
//! Every stage except the opening one maps directly to a playbook; the
//! variable bag is staged once by the orchestrator before the chain starts.

use crate::automation::{AutomationConnector, AutomationError, write_log};

use super::AdmCluster;
use super::stage::CreateStage;

pub(super) async fn run(
    adm: &mut AdmCluster,
    connector: &dyn AutomationConnector,
    stage: CreateStage,
) -> Result<(), AutomationError> {
    match stage.playbook() {
        None => {
            write_log(
                &adm.log,
                &format!("----init cluster task {} start----", adm.cluster.name),
            );
            Ok(())
        }
        Some(playbook) => adm.run_playbook(connector, playbook, "").await,
    }
}
