/*!

Translation of a provider name, credentials and storage parameters into the [`InstallConfig`] used
to install Velero.

!*/

use crate::constants::{DEFAULT_VELERO_IMAGE, DEFAULT_VELERO_NAMESPACE, KIND_PROVIDER};
use crate::error::{self, Result};
use snafu::{ensure, ResultExt};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The plugin images installed for each known object store provider.
const PROVIDER_PLUGINS: &[(&str, &[&str])] = &[
    ("aws", &["velero/velero-plugin-for-aws:v1.1.0"]),
    ("azure", &["velero/velero-plugin-for-microsoft-azure:v1.1.1"]),
    (
        "vsphere",
        &[
            "velero/velero-plugin-for-aws:v1.1.0",
            "velero/velero-plugin-for-vsphere:v1.0.2",
        ],
    ),
];

/// Returns the plugin images for `provider`. An unknown provider yields a single empty string,
/// meaning no usable plugin is configured for it.
pub fn provider_plugins(provider: &str) -> Vec<String> {
    PROVIDER_PLUGINS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, plugins)| plugins.iter().map(|p| p.to_string()).collect())
        .unwrap_or_else(|| vec![String::new()])
}

/// Decides which object store provider to install plugins for. Cloud platforms always use their
/// own object store, while a `kind` cluster needs one to be named explicitly.
pub fn resolve_object_store_provider(
    cloud_provider: &str,
    object_store_provider: Option<&str>,
) -> Result<String> {
    let object_store_provider = object_store_provider.filter(|p| !p.is_empty());
    if cloud_provider != KIND_PROVIDER {
        ensure!(
            object_store_provider.is_none(),
            error::ConfigurationSnafu {
                reason: "For cloud platforms, object store plugin cannot be overridden",
            }
        );
        return Ok(cloud_provider.to_string());
    }
    object_store_provider.map(str::to_string).ok_or_else(|| {
        error::Error::Configuration {
            reason: "No object store provider specified - must be specified when using kind as \
                     the cloud provider"
                .to_string(),
        }
    })
}

/// An ordered `key=value[,key=value...]` mapping, as accepted by `--config` style flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    entries: Vec<(String, String)>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`. A key that is already present keeps its position.
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromStr for ConfigMap {
    type Err = error::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut map = ConfigMap::new();
        if s.is_empty() {
            return Ok(map);
        }
        for entry in s.split(',') {
            let (key, value) = entry
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| error::Error::Configuration {
                    reason: format!("unable to parse '{}' in '{}' as key=value", entry, s),
                })?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl Display for ConfigMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let rendered = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        Display::fmt(&rendered, f)
    }
}

/// Everything needed to derive the Velero resources for one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    pub provider: String,
    /// Always absolute.
    pub credentials_file: PathBuf,
    pub bucket: String,
    pub prefix: String,
    pub backup_storage_config: ConfigMap,
    pub volume_snapshot_config: ConfigMap,
    pub plugins: Vec<String>,
    pub features: String,
    pub use_node_agent: bool,
    pub image: String,
    pub namespace: String,
}

/// The inputs of an [`InstallConfig`]. `build` validates them; fields that the builder does not
/// cover (node agent, image, namespace) get defaults and may be changed on the result.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    pub provider: String,
    pub credentials_file: PathBuf,
    pub bucket: String,
    pub prefix: String,
    pub bsl_config: String,
    pub vsl_config: String,
    pub plugins: Vec<String>,
    pub features: String,
}

impl ConfigBuilder {
    /// Creates a builder for `provider` using the plugin images from [`provider_plugins`].
    pub fn new<S: Into<String>>(provider: S) -> Self {
        let provider = provider.into();
        Self {
            plugins: provider_plugins(&provider),
            provider,
            ..Default::default()
        }
    }

    pub fn credentials_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.credentials_file = path.into();
        self
    }

    pub fn bucket<S: Into<String>>(mut self, bucket: S) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn bsl_config<S: Into<String>>(mut self, config: S) -> Self {
        self.bsl_config = config.into();
        self
    }

    pub fn vsl_config<S: Into<String>>(mut self, config: S) -> Self {
        self.vsl_config = config.into();
        self
    }

    pub fn plugins(mut self, plugins: Vec<String>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn features<S: Into<String>>(mut self, features: S) -> Self {
        self.features = features.into();
        self
    }

    pub fn build(self) -> Result<InstallConfig> {
        ensure!(
            !self.credentials_file.as_os_str().is_empty(),
            error::ConfigurationSnafu {
                reason: "No credentials were supplied to use for E2E tests",
            }
        );
        let credentials_file = absolute_path(&self.credentials_file)?;
        let backup_storage_config = self.bsl_config.parse()?;
        let volume_snapshot_config = self.vsl_config.parse()?;

        Ok(InstallConfig {
            provider: self.provider,
            credentials_file,
            bucket: self.bucket,
            prefix: self.prefix,
            backup_storage_config,
            volume_snapshot_config,
            plugins: self.plugins,
            features: self.features,
            use_node_agent: false,
            image: DEFAULT_VELERO_IMAGE.to_string(),
            namespace: DEFAULT_VELERO_NAMESPACE.to_string(),
        })
    }
}

/// Resolves `path` against the current working directory without touching the file itself.
fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context(error::CredentialsPathSnafu { path })?;
    Ok(cwd.join(path))
}
