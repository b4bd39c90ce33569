use crate::command::CommandLine;
use crate::error::Result;
use crate::status::Phase;
use crate::velero::{Operation, VeleroCli};
use log::info;
use tokio_util::sync::CancellationToken;

/// A backup of a single namespace, with volume data captured by the node agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub name: String,
    pub include_namespace: String,
    /// Use this backup storage location instead of the default one.
    pub storage_location: Option<String>,
}

impl BackupRequest {
    pub fn new<N, S>(name: N, include_namespace: S) -> Self
    where
        N: Into<String>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            include_namespace: include_namespace.into(),
            storage_location: None,
        }
    }

    pub fn storage_location<S: Into<String>>(mut self, location: S) -> Self {
        self.storage_location = Some(location.into()).filter(|l: &String| !l.is_empty());
        self
    }
}

impl VeleroCli {
    pub fn create_backup_command(&self, request: &BackupRequest) -> CommandLine {
        let command = self.command().args([
            "create",
            "backup",
            request.name.as_str(),
            "--include-namespaces",
            request.include_namespace.as_str(),
            "--default-volumes-to-restic",
            "--wait",
        ]);
        match &request.storage_location {
            Some(location) => command.args(["--storage-location", location.as_str()]),
            None => command,
        }
    }

    /// Creates the backup, waits for it and then requires its recorded phase to be `Completed`.
    /// `--wait` only tells us the command returned, a backup can still end up `PartiallyFailed`.
    pub async fn backup_namespace(
        &self,
        cancel: &CancellationToken,
        request: &BackupRequest,
    ) -> Result<()> {
        let command = self.create_backup_command(request);
        info!("backup cmd = {}", command);
        self.runner().run_streamed(cancel, &command).await?;
        self.check_backup_phase(cancel, &request.name, &Phase::completed())
            .await
    }

    pub async fn check_backup_phase(
        &self,
        cancel: &CancellationToken,
        backup_name: &str,
        expected: &Phase,
    ) -> Result<()> {
        self.check_phase(cancel, Operation::Backup, backup_name, expected)
            .await
    }

    /// Prints `velero backup describe` and `velero backup logs` for the backup.
    pub async fn backup_logs(&self, cancel: &CancellationToken, backup_name: &str) -> Result<()> {
        self.operation_logs(cancel, Operation::Backup, backup_name)
            .await
    }

    /// Best-effort [`VeleroCli::backup_logs`].
    pub async fn collect_backup_logs(&self, cancel: &CancellationToken, backup_name: &str) {
        self.collect_logs(cancel, Operation::Backup, backup_name)
            .await
    }
}
