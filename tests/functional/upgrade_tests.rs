//! Upgrade workflow tests.

use fleet_operator::Error;
use fleet_operator::model::{ClusterTool, ConditionStatus, Phase, Source, new_id};
use fleet_operator::notify::MessageKind;
use fleet_operator::store::Store;

use crate::fixtures::{ClusterBuilder, Harness, manifest};

#[tokio::test]
async fn test_upgrade_reaches_running_and_promotes_version() {
    let h = Harness::new();
    h.seed_manifests().await;
    ClusterBuilder::new("demo")
        .phase(Phase::Running)
        .master("demo-master-1")
        .seed(&h.store)
        .await;

    h.orchestrator
        .start_upgrade("demo", "v1.21.0-fo1")
        .await
        .unwrap();
    let cluster = h.wait_for_phase("demo", Phase::Running).await;

    assert_eq!(cluster.spec.version, "v1.21.0-fo1");
    assert!(cluster.spec.upgrade_version.is_none());
    assert!(
        cluster
            .status
            .conditions
            .iter()
            .any(|c| c.name == "EnsureDone" && c.status == ConditionStatus::True)
    );

    // etcd is unchanged between the manifests, so its stage skips the
    // playbook; docker moved, so the runtime stage runs with the upgrade tag
    let runs = h.connector.runs();
    let playbooks: Vec<(&str, &str)> = runs
        .iter()
        .map(|r| (r.playbook.as_str(), r.tag.as_str()))
        .collect();
    assert_eq!(
        playbooks,
        [
            ("94-backup-cluster.yml", ""),
            ("02-container-runtime.yml", "upgrade"),
            ("92-upgrade-cluster.yml", ""),
            ("05-certificates.yml", ""),
        ]
    );
    let kube_run = runs
        .iter()
        .find(|r| r.playbook == "92-upgrade-cluster.yml")
        .unwrap();
    assert_eq!(kube_run.vars["kube_upgrade_version"], "v1.21.0");

    let messages = h.wait_for_messages(1).await;
    assert_eq!(messages[0].kind, MessageKind::ClusterUpgrade);
    assert!(messages[0].success);
}

#[tokio::test]
async fn test_imported_clusters_can_not_upgrade() {
    let h = Harness::new();
    h.seed_manifests().await;
    ClusterBuilder::new("demo")
        .phase(Phase::Running)
        .source(Source::External)
        .master("demo-master-1")
        .seed(&h.store)
        .await;

    let err = h
        .orchestrator
        .start_upgrade("demo", "v1.21.0-fo1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ClusterNotLocal));
}

#[tokio::test]
async fn test_downgrade_is_rejected() {
    let h = Harness::new();
    h.seed_manifests().await;
    ClusterBuilder::new("demo")
        .phase(Phase::Running)
        .version("v1.21.0-fo1")
        .master("demo-master-1")
        .seed(&h.store)
        .await;

    let err = h
        .orchestrator
        .start_upgrade("demo", "v1.20.8-fo1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_upgrade_rejected_mid_operation() {
    let h = Harness::new();
    h.seed_manifests().await;
    ClusterBuilder::new("demo")
        .phase(Phase::Initializing)
        .master("demo-master-1")
        .seed(&h.store)
        .await;

    let err = h
        .orchestrator
        .start_upgrade("demo", "v1.21.0-fo1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPhase { .. }));
}

#[tokio::test]
async fn test_failed_upgrade_resumes_in_place_for_same_target() {
    let h = Harness::new();
    h.seed_manifests().await;
    ClusterBuilder::new("demo")
        .phase(Phase::Running)
        .master("demo-master-1")
        .seed(&h.store)
        .await;
    h.connector.fail_on("92-upgrade-cluster.yml");

    h.orchestrator
        .start_upgrade("demo", "v1.21.0-fo1")
        .await
        .unwrap();
    let failed = h.wait_for_phase("demo", Phase::Failed).await;
    assert_eq!(failed.spec.upgrade_version.as_deref(), Some("v1.21.0-fo1"));
    assert_eq!(failed.status.pre_phase, Phase::Upgrading);

    h.connector.clear_failure();
    h.orchestrator
        .start_upgrade("demo", "v1.21.0-fo1")
        .await
        .unwrap();
    h.wait_for_phase("demo", Phase::Running).await;

    // completed stages are not rerun: one backup, two kubernetes attempts
    let playbooks = h.connector.playbooks();
    assert_eq!(
        playbooks
            .iter()
            .filter(|p| *p == "94-backup-cluster.yml")
            .count(),
        1
    );
    assert_eq!(
        playbooks
            .iter()
            .filter(|p| *p == "92-upgrade-cluster.yml")
            .count(),
        2
    );
}

#[tokio::test]
async fn test_new_target_after_failure_restarts_the_chain() {
    let h = Harness::new();
    h.seed_manifests().await;
    h.store
        .save_manifest(&manifest("v1.22.0-fo1", "3.5.0", "20.10.9"))
        .await
        .unwrap();
    ClusterBuilder::new("demo")
        .phase(Phase::Running)
        .master("demo-master-1")
        .seed(&h.store)
        .await;
    h.connector.fail_on("92-upgrade-cluster.yml");

    h.orchestrator
        .start_upgrade("demo", "v1.21.0-fo1")
        .await
        .unwrap();
    h.wait_for_phase("demo", Phase::Failed).await;

    h.connector.clear_failure();
    h.orchestrator
        .start_upgrade("demo", "v1.22.0-fo1")
        .await
        .unwrap();
    let cluster = h.wait_for_phase("demo", Phase::Running).await;
    assert_eq!(cluster.spec.version, "v1.22.0-fo1");

    // the chain restarted from scratch, so backup ran twice
    let playbooks = h.connector.playbooks();
    assert_eq!(
        playbooks
            .iter()
            .filter(|p| *p == "94-backup-cluster.yml")
            .count(),
        2
    );
}

#[tokio::test]
async fn test_tool_versions_are_staged() {
    let h = Harness::new();
    h.seed_manifests().await;
    let mut target = manifest("v1.21.0-fo1", "3.4.13", "20.10.8");
    target.tool_vars = r#"[{"name":"prometheus","version":"2.30.0"},{"name":"grafana","version":"8.1.0"}]"#.to_string();
    h.store.save_manifest(&target).await.unwrap();

    let cluster = ClusterBuilder::new("demo")
        .phase(Phase::Running)
        .master("demo-master-1")
        .seed(&h.store)
        .await;
    h.store
        .save_tool(&ClusterTool {
            id: new_id(),
            cluster_id: cluster.id.clone(),
            name: "prometheus".to_string(),
            version: "2.27.0".to_string(),
            higher_version: None,
            status: "Waiting".to_string(),
        })
        .await
        .unwrap();
    h.store
        .save_tool(&ClusterTool {
            id: new_id(),
            cluster_id: cluster.id.clone(),
            name: "grafana".to_string(),
            version: "7.5.0".to_string(),
            higher_version: None,
            status: "Running".to_string(),
        })
        .await
        .unwrap();

    h.orchestrator
        .start_upgrade("demo", "v1.21.0-fo1")
        .await
        .unwrap();
    h.wait_for_phase("demo", Phase::Running).await;

    let tools = h.store.list_tools(&cluster.id).await.unwrap();
    let prometheus = tools.iter().find(|t| t.name == "prometheus").unwrap();
    assert_eq!(prometheus.version, "2.30.0");
    assert!(prometheus.higher_version.is_none());
    let grafana = tools.iter().find(|t| t.name == "grafana").unwrap();
    assert_eq!(grafana.version, "7.5.0");
    assert_eq!(grafana.higher_version.as_deref(), Some("8.1.0"));
}
