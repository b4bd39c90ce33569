use crate::constants::{FIELD_MANAGER, VELERO_CLUSTER_ROLE_BINDING, VELERO_COMPONENT_SELECTOR};
use crate::error::CollaboratorError;
use crate::install::{Cluster, Teardown};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::core::{GroupVersionKind, TypeMeta};
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::{Client, ResourceExt};
use log::{debug, info, trace};
use snafu::{OptionExt, ResultExt, Snafu};
use std::future::Future;
use std::io::Write;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to create kubernetes client: {}", source))]
    ClientCreate { source: kube::Error },

    #[snafu(display("Unable to {}: {}", action, source))]
    Kube { action: String, source: kube::Error },

    #[snafu(display("Resource '{}' has no apiVersion or kind", name))]
    MissingTypeInfo { name: String },

    #[snafu(display("Timed out waiting for {}", what))]
    Timeout { what: String },

    #[snafu(display("The cluster does not serve '{}' in '{}'", kind, api_version))]
    UnknownKind { api_version: String, kind: String },

    #[snafu(display("Unable to write apply progress: {}", source))]
    Progress { source: std::io::Error },
}

type Result<T> = std::result::Result<T, Error>;

/// A [`Cluster`] and [`Teardown`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Uses the kubeconfig from the environment, or the in-cluster config.
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(
            Client::try_default().await.context(ClientCreateSnafu)?,
        ))
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn discover(&self) -> Result<Discovery> {
        Discovery::new(self.client.clone())
            .run()
            .await
            .context(KubeSnafu {
                action: "discover api resources",
            })
    }

    /// Resolves `gvk`, running discovery again until it shows up. Freshly created CRDs take a
    /// moment to be served.
    async fn resolve(
        &self,
        discovery: &mut Discovery,
        gvk: &GroupVersionKind,
    ) -> Result<(ApiResource, ApiCapabilities)> {
        if let Some(found) = discovery.resolve_gvk(gvk) {
            return Ok(found);
        }
        let rediscover = async {
            loop {
                tokio::time::sleep(self.poll_interval).await;
                match self.discover().await {
                    Ok(fresh) => {
                        if let Some(found) = fresh.resolve_gvk(gvk) {
                            return (fresh, found);
                        }
                        trace!("'{}' is not served yet", gvk.kind);
                    }
                    Err(e) => debug!("Unable to run discovery: {}", e),
                }
            }
        };
        let (fresh, found) = tokio::time::timeout(self.poll_timeout, rediscover)
            .await
            .ok()
            .context(UnknownKindSnafu {
                api_version: gvk.api_version(),
                kind: &gvk.kind,
            })?;
        *discovery = fresh;
        Ok(found)
    }

    async fn deployment_is_ready(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = api.get_opt(name).await.context(KubeSnafu {
            action: format!("get deployment '{}'", name),
        })?;
        Ok(deployment.as_ref().map(deployment_ready).unwrap_or(false))
    }

    async fn daemon_set_is_ready(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        let daemon_set = api.get_opt(name).await.context(KubeSnafu {
            action: format!("get daemonset '{}'", name),
        })?;
        Ok(daemon_set.as_ref().map(daemon_set_ready).unwrap_or(false))
    }

    async fn namespace_is_gone(&self, namespace: &str) -> Result<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let found = api.get_opt(namespace).await.context(KubeSnafu {
            action: format!("get namespace '{}'", namespace),
        })?;
        Ok(found.is_none())
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn ensure_cluster_exists(&self) -> std::result::Result<(), CollaboratorError> {
        let version = self.client.apiserver_version().await.context(KubeSnafu {
            action: "reach the kubernetes API server",
        })?;
        info!(
            "Found kubernetes cluster version {}.{}",
            version.major, version.minor
        );
        Ok(())
    }

    async fn apply(
        &self,
        resources: &[DynamicObject],
        out: &mut (dyn Write + Send),
    ) -> std::result::Result<(), CollaboratorError> {
        let mut discovery = self.discover().await?;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        for resource in resources {
            let name = resource.name_any();
            let types = resource
                .types
                .as_ref()
                .context(MissingTypeInfoSnafu { name: &name })?;
            let (api_resource, capabilities) =
                self.resolve(&mut discovery, &gvk_of(types)).await?;
            let api: Api<DynamicObject> = match (capabilities.scope, resource.namespace()) {
                (Scope::Cluster, _) => Api::all_with(self.client.clone(), &api_resource),
                (Scope::Namespaced, Some(namespace)) => {
                    Api::namespaced_with(self.client.clone(), &namespace, &api_resource)
                }
                (Scope::Namespaced, None) => {
                    Api::default_namespaced_with(self.client.clone(), &api_resource)
                }
            };
            api.patch(&name, &params, &Patch::Apply(resource))
                .await
                .context(KubeSnafu {
                    action: format!("apply {} '{}'", types.kind, name),
                })?;
            writeln!(out, "{}/{}: applied", types.kind, name).context(ProgressSnafu)?;
        }
        Ok(())
    }

    async fn wait_for_deployment_ready(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<(), CollaboratorError> {
        Ok(wait_until(
            self.poll_interval,
            self.poll_timeout,
            &format!("deployment '{}'", name),
            move || self.deployment_is_ready(namespace, name),
        )
        .await?)
    }

    async fn wait_for_daemon_set_ready(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<(), CollaboratorError> {
        Ok(wait_until(
            self.poll_interval,
            self.poll_timeout,
            &format!("daemonset '{}'", name),
            move || self.daemon_set_is_ready(namespace, name),
        )
        .await?)
    }
}

#[async_trait]
impl Teardown for KubeCluster {
    async fn uninstall(&self, namespace: &str) -> std::result::Result<(), CollaboratorError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        ignore_not_found(namespaces.delete(namespace, &DeleteParams::default()).await).context(
            KubeSnafu {
                action: format!("delete namespace '{}'", namespace),
            },
        )?;
        // Nothing can be created in a `Terminating` namespace.
        wait_until(
            self.poll_interval,
            self.poll_timeout,
            &format!("namespace '{}' to be deleted", namespace),
            move || self.namespace_is_gone(namespace),
        )
        .await?;

        let bindings: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        ignore_not_found(
            bindings
                .delete(VELERO_CLUSTER_ROLE_BINDING, &DeleteParams::default())
                .await,
        )
        .context(KubeSnafu {
            action: "delete velero cluster role binding",
        })?;

        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        crds.delete_collection(
            &DeleteParams::default(),
            &ListParams::default().labels(VELERO_COMPONENT_SELECTOR),
        )
        .await
        .context(KubeSnafu {
            action: "delete velero custom resource definitions",
        })?;

        info!("Velero uninstalled from namespace '{}'", namespace);
        Ok(())
    }
}

/// Polls `check` every `interval` until it returns `true`. Errors from `check` are logged and
/// polled through; only running out of `timeout` fails.
async fn wait_until<F, Fut>(
    interval: Duration,
    timeout: Duration,
    what: &str,
    mut check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let poll = async {
        loop {
            match check().await {
                Ok(true) => return,
                Ok(false) => trace!("Still waiting for {}", what),
                Err(e) => debug!("Unable to check {}: {}", what, e),
            }
            tokio::time::sleep(interval).await;
        }
    };
    tokio::time::timeout(timeout, poll)
        .await
        .ok()
        .context(TimeoutSnafu { what })
}

/// A deployment is ready once its `Available` condition is `True`.
fn deployment_ready(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == "Available" && condition.status == "True")
        })
        .unwrap_or(false)
}

/// A daemon set is ready once the controller has observed its latest generation and every
/// scheduled pod is available. The counters are all zero until the first reconcile.
fn daemon_set_ready(daemon_set: &DaemonSet) -> bool {
    let status = match &daemon_set.status {
        Some(status) => status,
        None => return false,
    };
    let observed = match (daemon_set.metadata.generation, status.observed_generation) {
        (Some(generation), Some(observed)) => observed >= generation,
        _ => false,
    };
    observed && status.number_available.unwrap_or(0) == status.desired_number_scheduled
}

fn gvk_of(types: &TypeMeta) -> GroupVersionKind {
    let (group, version) = types
        .api_version
        .split_once('/')
        .unwrap_or(("", types.api_version.as_str()));
    GroupVersionKind::gvk(group, version, &types.kind)
}

fn ignore_not_found<T>(
    result: std::result::Result<T, kube::Error>,
) -> std::result::Result<Option<T>, kube::Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(None),
        Err(e) => Err(e),
    }
}
