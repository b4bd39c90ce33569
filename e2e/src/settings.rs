use crate::config::{resolve_object_store_provider, ConfigBuilder, InstallConfig};
use crate::constants::{
    DEFAULT_VELERO_CLI, DEFAULT_VELERO_IMAGE, DEFAULT_VELERO_NAMESPACE, ENV_PREFIX,
};
use crate::error::{self, Result};
use crate::velero::VeleroCli;
use serde::Deserialize;
use snafu::ResultExt;
use std::path::PathBuf;

/// Settings for an end-to-end run, read from environment variables prefixed with `VELERO_E2E_`.
///
/// # Example
///
/// ```text
/// VELERO_E2E_CLOUD_PROVIDER=kind
/// VELERO_E2E_OBJECT_STORE_PROVIDER=aws
/// VELERO_E2E_CREDS_FILE=/home/me/.aws/minio-credentials
/// VELERO_E2E_BSL_BUCKET=velero-e2e
/// VELERO_E2E_BSL_CONFIG=region=minio,s3ForcePathStyle=true,s3Url=http://minio:9000
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct E2eSettings {
    /// Path or name of the velero binary.
    #[serde(default = "velero_cli")]
    pub velero_cli: PathBuf,
    #[serde(default = "velero_namespace")]
    pub velero_namespace: String,
    #[serde(default = "velero_image")]
    pub velero_image: String,
    /// The platform the cluster runs on, e.g. `aws` or `kind`.
    pub cloud_provider: String,
    /// Only allowed, and then required, when `cloud_provider` is `kind`.
    #[serde(default)]
    pub object_store_provider: Option<String>,
    /// Use provider volume snapshots instead of the node agent.
    #[serde(default)]
    pub use_volume_snapshots: bool,
    #[serde(default)]
    pub creds_file: PathBuf,
    #[serde(default)]
    pub bsl_bucket: String,
    #[serde(default)]
    pub bsl_prefix: String,
    #[serde(default)]
    pub bsl_config: String,
    #[serde(default)]
    pub vsl_config: String,
    #[serde(default)]
    pub features: String,
    #[serde(default)]
    pub additional_bsl_object_store_provider: Option<String>,
    #[serde(default)]
    pub additional_bsl_bucket: Option<String>,
    #[serde(default)]
    pub additional_bsl_prefix: Option<String>,
    #[serde(default)]
    pub additional_bsl_config: Option<String>,
}

impl E2eSettings {
    /// Reads the settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Reads the settings from the given variables, which must carry the `VELERO_E2E_` prefix.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .context(error::SettingsSnafu)
    }

    /// A [`VeleroCli`] for the configured binary and namespace.
    pub fn velero_cli(&self) -> VeleroCli {
        VeleroCli::new(&self.velero_cli, &self.velero_namespace)
    }

    /// Whether a second backup storage location should be exercised.
    pub fn has_additional_bsl(&self) -> bool {
        self.additional_bsl_bucket
            .as_deref()
            .map(|bucket| !bucket.is_empty())
            .unwrap_or(false)
    }
}

impl InstallConfig {
    /// Builds the install configuration for an end-to-end run: resolves the object store
    /// provider, looks up its plugins and applies the node agent, image and namespace settings.
    pub fn from_settings(settings: &E2eSettings) -> Result<Self> {
        let object_store_provider = resolve_object_store_provider(
            &settings.cloud_provider,
            settings.object_store_provider.as_deref(),
        )?;
        let mut config = ConfigBuilder::new(&object_store_provider)
            .credentials_file(&settings.creds_file)
            .bucket(&settings.bsl_bucket)
            .prefix(&settings.bsl_prefix)
            .bsl_config(&settings.bsl_config)
            .vsl_config(&settings.vsl_config)
            .features(&settings.features)
            .build()?;
        config.use_node_agent = !settings.use_volume_snapshots;
        config.image = settings.velero_image.clone();
        config.namespace = settings.velero_namespace.clone();
        Ok(config)
    }
}

fn velero_cli() -> PathBuf {
    PathBuf::from(DEFAULT_VELERO_CLI)
}

fn velero_namespace() -> String {
    String::from(DEFAULT_VELERO_NAMESPACE)
}

fn velero_image() -> String {
    String::from(DEFAULT_VELERO_IMAGE)
}
