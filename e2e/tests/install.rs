/*!

Drives the `Installer` and the uninstaller with mocked cluster collaborators. The mocks record the
stages they were asked to run and can be told to fail at any one of them.

!*/

use async_trait::async_trait;
use kube::api::DynamicObject;
use serde_json::json;
use std::io::Write;
use std::sync::Mutex;
use velero_e2e::install::{Cluster, ResourceSource, Teardown};
use velero_e2e::{
    install_velero, uninstall_velero, CollaboratorError, ConfigBuilder, E2eSettings, Error,
    InstallConfig, Installer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ClusterCheck,
    Apply,
    Deployment,
    DaemonSet,
    Uninstall,
}

#[derive(Default)]
struct MockCluster {
    fail_at: Option<Stage>,
    calls: Mutex<Vec<(Stage, String)>>,
}

impl MockCluster {
    fn failing_at(stage: Stage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Default::default()
        }
    }

    fn record(&self, stage: Stage, detail: &str) -> Result<(), CollaboratorError> {
        self.calls.lock().unwrap().push((stage, detail.to_string()));
        if self.fail_at == Some(stage) {
            return Err(format!("{:?} failed", stage).into());
        }
        Ok(())
    }

    fn stages(&self) -> Vec<Stage> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(stage, _)| *stage)
            .collect()
    }

    fn details(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, detail)| detail.clone())
            .collect()
    }
}

#[async_trait]
impl Cluster for MockCluster {
    async fn ensure_cluster_exists(&self) -> Result<(), CollaboratorError> {
        self.record(Stage::ClusterCheck, "")
    }

    async fn apply(
        &self,
        resources: &[DynamicObject],
        out: &mut (dyn Write + Send),
    ) -> Result<(), CollaboratorError> {
        for resource in resources {
            writeln!(out, "{}: applied", resource.metadata.name.as_deref().unwrap_or(""))?;
        }
        self.record(Stage::Apply, &resources.len().to_string())
    }

    async fn wait_for_deployment_ready(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), CollaboratorError> {
        self.record(Stage::Deployment, &format!("{}/{}", namespace, name))
    }

    async fn wait_for_daemon_set_ready(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), CollaboratorError> {
        self.record(Stage::DaemonSet, &format!("{}/{}", namespace, name))
    }
}

#[async_trait]
impl Teardown for MockCluster {
    async fn uninstall(&self, namespace: &str) -> Result<(), CollaboratorError> {
        self.record(Stage::Uninstall, namespace)
    }
}

fn velero_resources(config: &InstallConfig) -> Result<Vec<DynamicObject>, CollaboratorError> {
    let namespace: DynamicObject = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": config.namespace },
    }))?;
    let deployment: DynamicObject = serde_json::from_value(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": "velero", "namespace": config.namespace },
        "spec": {
            "template": {
                "spec": { "containers": [{ "name": "velero", "image": config.image }] }
            }
        },
    }))?;
    Ok(vec![namespace, deployment])
}

fn no_resources(_: &InstallConfig) -> Result<Vec<DynamicObject>, CollaboratorError> {
    Err("unknown provider".into())
}

fn install_config(use_node_agent: bool) -> InstallConfig {
    let mut config = ConfigBuilder::new("aws")
        .credentials_file("/creds/aws")
        .bucket("bucket")
        .build()
        .unwrap();
    config.use_node_agent = use_node_agent;
    config.namespace = "velero-e2e".to_string();
    config
}

#[tokio::test]
async fn install_runs_every_stage_in_order() {
    let cluster = MockCluster::default();
    let mut out: Vec<u8> = Vec::new();
    Installer::new(&cluster, &velero_resources)
        .install_to(&install_config(true), &mut out)
        .await
        .unwrap();
    assert_eq!(
        cluster.stages(),
        vec![
            Stage::ClusterCheck,
            Stage::Apply,
            Stage::Deployment,
            Stage::DaemonSet
        ]
    );
    assert_eq!(
        cluster.details(),
        vec!["", "2", "velero-e2e/velero", "velero-e2e/restic"]
    );
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "velero-e2e: applied\nvelero: applied\n"
    );
}

#[tokio::test]
async fn daemon_set_is_skipped_without_node_agent() {
    let cluster = MockCluster::default();
    Installer::new(&cluster, &velero_resources)
        .install_to(&install_config(false), &mut std::io::sink())
        .await
        .unwrap();
    assert_eq!(
        cluster.stages(),
        vec![Stage::ClusterCheck, Stage::Apply, Stage::Deployment]
    );
}

#[tokio::test]
async fn unreachable_cluster_stops_installation() {
    let cluster = MockCluster::failing_at(Stage::ClusterCheck);
    let err = Installer::new(&cluster, &velero_resources)
        .install_to(&install_config(true), &mut std::io::sink())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ClusterCheck { .. }));
    assert_eq!(cluster.stages(), vec![Stage::ClusterCheck]);
}

#[tokio::test]
async fn resource_translation_failure_is_distinct() {
    let cluster = MockCluster::default();
    let err = Installer::new(&cluster, &no_resources)
        .install_to(&install_config(true), &mut std::io::sink())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ResourceBuild { .. }));
    assert_eq!(cluster.stages(), vec![Stage::ClusterCheck]);
}

#[tokio::test]
async fn apply_failure_points_at_deploy_logs() {
    let cluster = MockCluster::failing_at(Stage::Apply);
    let err = Installer::new(&cluster, &velero_resources)
        .install_to(&install_config(true), &mut std::io::sink())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ResourceApply { .. }));
    assert!(err
        .to_string()
        .contains("kubectl logs deploy/velero -n velero-e2e"));
    assert_eq!(cluster.stages(), vec![Stage::ClusterCheck, Stage::Apply]);
}

#[tokio::test]
async fn readiness_failures_point_at_deploy_logs() {
    let cluster = MockCluster::failing_at(Stage::Deployment);
    let err = Installer::new(&cluster, &velero_resources)
        .install_to(&install_config(true), &mut std::io::sink())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeploymentReady { .. }));
    assert!(err.to_string().contains("kubectl logs deploy/velero"));
    assert_eq!(
        cluster.stages(),
        vec![Stage::ClusterCheck, Stage::Apply, Stage::Deployment]
    );

    let cluster = MockCluster::failing_at(Stage::DaemonSet);
    let err = Installer::new(&cluster, &velero_resources)
        .install_to(&install_config(true), &mut std::io::sink())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DaemonSetReady { .. }));
    assert!(err.to_string().contains("kubectl logs deploy/velero"));
}

#[tokio::test]
async fn install_from_settings() {
    let settings = E2eSettings::from_vars(vec![
        ("VELERO_E2E_CLOUD_PROVIDER".to_string(), "kind".to_string()),
        ("VELERO_E2E_OBJECT_STORE_PROVIDER".to_string(), "aws".to_string()),
        ("VELERO_E2E_CREDS_FILE".to_string(), "/creds/minio".to_string()),
        ("VELERO_E2E_VELERO_NAMESPACE".to_string(), "backups".to_string()),
        ("VELERO_E2E_USE_VOLUME_SNAPSHOTS".to_string(), "true".to_string()),
    ])
    .unwrap();
    let cluster = MockCluster::default();
    install_velero(&cluster, &velero_resources, &settings)
        .await
        .unwrap();
    assert_eq!(
        cluster.stages(),
        vec![Stage::ClusterCheck, Stage::Apply, Stage::Deployment]
    );
    assert_eq!(cluster.details()[2], "backups/velero");
}

#[tokio::test]
async fn invalid_settings_never_reach_the_cluster() {
    let settings = E2eSettings::from_vars(vec![
        ("VELERO_E2E_CLOUD_PROVIDER".to_string(), "aws".to_string()),
        ("VELERO_E2E_OBJECT_STORE_PROVIDER".to_string(), "azure".to_string()),
        ("VELERO_E2E_CREDS_FILE".to_string(), "/creds/aws".to_string()),
    ])
    .unwrap();
    let cluster = MockCluster::default();
    let err = install_velero(&cluster, &velero_resources, &settings)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(cluster.stages().is_empty());
}

#[tokio::test]
async fn uninstall_delegates_to_teardown() {
    let cluster = MockCluster::default();
    uninstall_velero(&cluster, "velero-e2e").await.unwrap();
    assert_eq!(cluster.details(), vec!["velero-e2e"]);

    let cluster = MockCluster::failing_at(Stage::Uninstall);
    let err = uninstall_velero(&cluster, "velero-e2e").await.unwrap_err();
    assert!(matches!(err, Error::Uninstall { .. }));
}

#[test]
fn functions_are_resource_sources() {
    let resources = velero_resources.all_resources(&install_config(false)).unwrap();
    assert_eq!(resources.len(), 2);
}
