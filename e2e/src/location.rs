use crate::command::CommandLine;
use crate::config::ConfigMap;
use crate::error::Result;
use crate::velero::VeleroCli;
use log::info;
use tokio_util::sync::CancellationToken;

/// A key in a secret, used as the credential of a backup storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// A backup storage location to register with Velero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLocationRequest {
    pub name: String,
    pub provider: String,
    pub bucket: String,
    pub prefix: String,
    pub config: ConfigMap,
    pub credential: Option<SecretKeyRef>,
}

impl BackupLocationRequest {
    pub fn new<N, P, B>(name: N, provider: P, bucket: B) -> Self
    where
        N: Into<String>,
        P: Into<String>,
        B: Into<String>,
    {
        Self {
            name: name.into(),
            provider: provider.into(),
            bucket: bucket.into(),
            prefix: String::new(),
            config: ConfigMap::new(),
            credential: None,
        }
    }

    pub fn prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn config(mut self, config: ConfigMap) -> Self {
        self.config = config;
        self
    }

    pub fn credential<N, K>(mut self, secret_name: N, secret_key: K) -> Self
    where
        N: Into<String>,
        K: Into<String>,
    {
        self.credential = Some(SecretKeyRef {
            name: secret_name.into(),
            key: secret_key.into(),
        });
        self
    }
}

impl VeleroCli {
    pub fn create_backup_location_command(&self, request: &BackupLocationRequest) -> CommandLine {
        let mut command = self.command().args([
            "create",
            "backup-location",
            request.name.as_str(),
            "--provider",
            request.provider.as_str(),
            "--bucket",
            request.bucket.as_str(),
        ]);
        if !request.prefix.is_empty() {
            command = command.args(["--prefix", request.prefix.as_str()]);
        }
        if !request.config.is_empty() {
            command = command.arg("--config").arg(request.config.to_string());
        }
        match &request.credential {
            Some(secret) if !secret.name.is_empty() && !secret.key.is_empty() => command
                .arg("--credential")
                .arg(format!("{}={}", secret.name, secret.key)),
            _ => command,
        }
    }

    /// Registers a backup storage location. Nothing checks that the location becomes available;
    /// callers that need it right away have to verify it themselves.
    pub async fn create_backup_location(
        &self,
        cancel: &CancellationToken,
        request: &BackupLocationRequest,
    ) -> Result<()> {
        let command = self.create_backup_location_command(request);
        info!("backup-location cmd = {}", command);
        self.runner().run_streamed(cancel, &command).await
    }
}
