//! Create-chain workflow tests.

use std::time::Duration;

use fleet_operator::Error;
use fleet_operator::model::{ConditionStatus, Phase};
use fleet_operator::notify::MessageKind;
use fleet_operator::store::Store;

use crate::fixtures::{ClusterBuilder, Harness};

const CREATE_PLAYBOOKS: [&str; 13] = [
    "01-base.yml",
    "02-container-runtime.yml",
    "03-kubernetes-component.yml",
    "04-load-balancer.yml",
    "05-certificates.yml",
    "06-etcd.yml",
    "07-kubernetes-master.yml",
    "08-kubernetes-worker.yml",
    "09-plugin-network.yml",
    "11-helm-install.yml",
    "13-metrics-server.yml",
    "14-ingress-controller.yml",
    "15-post.yml",
];

#[tokio::test]
async fn test_create_chain_reaches_running() {
    let h = Harness::new();
    h.seed_manifests().await;
    ClusterBuilder::new("demo")
        .master("demo-master-1")
        .seed(&h.store)
        .await;

    h.orchestrator.start_create("demo").await.unwrap();
    let cluster = h.wait_for_phase("demo", Phase::Running).await;

    assert!(cluster.log_id.is_some());
    assert_eq!(h.connector.playbooks(), CREATE_PLAYBOOKS);
    // 14 stages plus the done sentinel, all true
    assert_eq!(cluster.status.conditions.len(), 15);
    assert!(
        cluster
            .status
            .conditions
            .iter()
            .all(|c| c.status == ConditionStatus::True)
    );
    assert_eq!(cluster.status.conditions[0].name, "EnsureInitTaskStart");
    assert_eq!(cluster.status.conditions[14].name, "EnsureDone");

    let messages = h.wait_for_messages(1).await;
    assert_eq!(messages[0].kind, MessageKind::ClusterInstall);
    assert!(messages[0].success);
}

#[tokio::test]
async fn test_create_failure_records_state_and_resumes() {
    let h = Harness::new();
    h.seed_manifests().await;
    ClusterBuilder::new("demo")
        .master("demo-master-1")
        .seed(&h.store)
        .await;
    h.connector.fail_on("06-etcd.yml");

    h.orchestrator.start_create("demo").await.unwrap();
    let failed = h.wait_for_phase("demo", Phase::Failed).await;

    assert_eq!(failed.status.pre_phase, Phase::Initializing);
    assert!(failed.status.message.contains("06-etcd.yml"));
    let etcd = failed
        .status
        .conditions
        .iter()
        .find(|c| c.name == "EnsureInitEtcd")
        .unwrap();
    assert_eq!(etcd.status, ConditionStatus::False);
    let messages = h.wait_for_messages(1).await;
    assert!(!messages[0].success);

    // resubmitting reruns only the failed stage onward
    h.connector.clear_failure();
    h.orchestrator.start_create("demo").await.unwrap();
    h.wait_for_phase("demo", Phase::Running).await;

    let playbooks = h.connector.playbooks();
    assert_eq!(playbooks.len(), 14);
    assert_eq!(playbooks[5], "06-etcd.yml");
    assert_eq!(playbooks[6], "06-etcd.yml");
    assert_eq!(playbooks[13], "15-post.yml");
}

#[tokio::test]
async fn test_create_rejected_on_running_cluster() {
    let h = Harness::new();
    h.seed_manifests().await;
    ClusterBuilder::new("demo")
        .phase(Phase::Running)
        .master("demo-master-1")
        .seed(&h.store)
        .await;

    let err = h.orchestrator.start_create("demo").await.unwrap_err();
    assert!(matches!(err, Error::InvalidPhase { .. }));
}

#[tokio::test]
async fn test_create_unknown_cluster() {
    let h = Harness::new();
    let err = h.orchestrator.start_create("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_concurrent_operations_are_locked_out() {
    let h = Harness::new();
    h.seed_manifests().await;
    ClusterBuilder::new("demo")
        .master("demo-master-1")
        .seed(&h.store)
        .await;
    h.connector.delay(Duration::from_millis(50));

    h.orchestrator.start_create("demo").await.unwrap();
    let err = h.orchestrator.start_create("demo").await.unwrap_err();
    match err {
        Error::OperationInProgress { cluster, holder } => {
            assert_eq!(cluster, "demo");
            assert_eq!(holder, "create");
        }
        other => panic!("unexpected error: {other}"),
    }

    // the lock is released once the background chain terminates
    h.wait_for_phase("demo", Phase::Running).await;
}

#[tokio::test]
async fn test_playbooks_receive_manifest_and_setting_vars() {
    let h = Harness::new();
    h.seed_manifests().await;
    h.store
        .save_setting("ntp_server", "ntp.internal")
        .await
        .unwrap();
    ClusterBuilder::new("demo")
        .master("demo-master-1")
        .seed(&h.store)
        .await;

    h.orchestrator.start_create("demo").await.unwrap();
    h.wait_for_phase("demo", Phase::Running).await;

    let first = &h.connector.runs()[0];
    assert_eq!(first.vars["etcd_version"], "3.4.13");
    assert_eq!(first.vars["docker_version"], "20.10.7");
    assert_eq!(first.vars["kube_version"], "v1.20.8");
    assert_eq!(first.vars["container_runtime"], "docker");
    assert_eq!(first.vars["cluster_name"], "demo");
    assert_eq!(first.vars["ntp_server"], "ntp.internal");
}

#[tokio::test]
async fn test_inventory_reflects_cluster_topology() {
    let h = Harness::new();
    h.seed_manifests().await;
    ClusterBuilder::new("demo")
        .master("demo-master-1")
        .worker("demo-worker-1", fleet_operator::model::NodeStatus::Running)
        .seed(&h.store)
        .await;

    h.orchestrator.start_create("demo").await.unwrap();
    h.wait_for_phase("demo", Phase::Running).await;

    let inventory = &h.connector.runs()[0].inventory;
    assert_eq!(inventory.group("kube-master"), ["demo-master-1"]);
    assert_eq!(inventory.group("kube-worker"), ["demo-worker-1"]);
    assert_eq!(inventory.group("etcd"), ["demo-master-1"]);
    assert_eq!(inventory.hosts["demo-master-1"].ip, "10.0.0.10");
}
