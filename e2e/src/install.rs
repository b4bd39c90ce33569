/*!

Installing Velero into, and removing it from, a cluster.

The [`Installer`] only sequences the installation. Talking to the cluster is left to a [`Cluster`]
and turning an [`InstallConfig`] into Kubernetes objects is left to a [`ResourceSource`].

!*/

use crate::config::InstallConfig;
use crate::constants::{NODE_AGENT_DAEMON_SET, VELERO_DEPLOYMENT};
use crate::error::{self, CollaboratorError, Result};
use crate::settings::E2eSettings;
use async_trait::async_trait;
use kube::api::DynamicObject;
use log::info;
use snafu::ResultExt;
use std::io::Write;

/// The cluster operations an installation needs. Polling intervals and timeouts are up to the
/// implementation.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Fails if the cluster does not exist or cannot be reached.
    async fn ensure_cluster_exists(&self) -> std::result::Result<(), CollaboratorError>;

    /// Creates or updates `resources`, reporting progress to `out`.
    async fn apply(
        &self,
        resources: &[DynamicObject],
        out: &mut (dyn Write + Send),
    ) -> std::result::Result<(), CollaboratorError>;

    /// Returns once the deployment is ready, or fails when it did not get ready in time.
    async fn wait_for_deployment_ready(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<(), CollaboratorError>;

    /// Returns once the daemon set is ready, or fails when it did not get ready in time.
    async fn wait_for_daemon_set_ready(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<(), CollaboratorError>;
}

/// Derives the Kubernetes objects that make up a Velero installation.
pub trait ResourceSource: Send + Sync {
    fn all_resources(
        &self,
        config: &InstallConfig,
    ) -> std::result::Result<Vec<DynamicObject>, CollaboratorError>;
}

impl<F> ResourceSource for F
where
    F: Fn(&InstallConfig) -> std::result::Result<Vec<DynamicObject>, CollaboratorError>
        + Send
        + Sync,
{
    fn all_resources(
        &self,
        config: &InstallConfig,
    ) -> std::result::Result<Vec<DynamicObject>, CollaboratorError> {
        self(config)
    }
}

/// Removes everything an installation created. Returns once the namespace is fully deleted, so a
/// reinstall can follow right away.
#[async_trait]
pub trait Teardown: Send + Sync {
    async fn uninstall(&self, namespace: &str) -> std::result::Result<(), CollaboratorError>;
}

pub struct Installer<'a, C: ?Sized, R: ?Sized> {
    cluster: &'a C,
    resources: &'a R,
}

impl<'a, C, R> Installer<'a, C, R>
where
    C: Cluster + ?Sized,
    R: ResourceSource + ?Sized,
{
    pub fn new(cluster: &'a C, resources: &'a R) -> Self {
        Self { cluster, resources }
    }

    /// Installs Velero and waits for it to be ready, printing apply progress to stdout.
    pub async fn install(&self, config: &InstallConfig) -> Result<()> {
        self.install_to(config, &mut std::io::stdout()).await
    }

    /// Installs Velero and waits for it to be ready. Stages run in order and the first failure
    /// ends the installation.
    pub async fn install_to(
        &self,
        config: &InstallConfig,
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        let namespace = config.namespace.as_str();

        self.cluster
            .ensure_cluster_exists()
            .await
            .context(error::ClusterCheckSnafu)?;

        let resources = self
            .resources
            .all_resources(config)
            .context(error::ResourceBuildSnafu)?;

        info!(
            "Applying {} Velero resources to namespace '{}'",
            resources.len(),
            namespace
        );
        self.cluster
            .apply(&resources, out)
            .await
            .context(error::ResourceApplySnafu { namespace })?;

        info!("Waiting for Velero deployment to be ready.");
        self.cluster
            .wait_for_deployment_ready(namespace, VELERO_DEPLOYMENT)
            .await
            .context(error::DeploymentReadySnafu { namespace })?;

        if config.use_node_agent {
            info!("Waiting for Velero node agent daemonset to be ready.");
            self.cluster
                .wait_for_daemon_set_ready(namespace, NODE_AGENT_DAEMON_SET)
                .await
                .context(error::DaemonSetReadySnafu { namespace })?;
        }

        Ok(())
    }
}

/// Builds the install configuration from `settings` and installs Velero with it.
pub async fn install_velero<C, R>(cluster: &C, resources: &R, settings: &E2eSettings) -> Result<()>
where
    C: Cluster + ?Sized,
    R: ResourceSource + ?Sized,
{
    let config = InstallConfig::from_settings(settings)?;
    Installer::new(cluster, resources).install(&config).await
}

/// Removes Velero from `namespace` using `teardown`.
pub async fn uninstall_velero<T>(teardown: &T, namespace: &str) -> Result<()>
where
    T: Teardown + ?Sized,
{
    info!("Uninstalling Velero from namespace '{}'", namespace);
    teardown
        .uninstall(namespace)
        .await
        .context(error::UninstallSnafu { namespace })
}
