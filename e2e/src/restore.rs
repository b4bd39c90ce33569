use crate::command::CommandLine;
use crate::error::Result;
use crate::status::Phase;
use crate::velero::{Operation, VeleroCli};
use log::info;
use tokio_util::sync::CancellationToken;

/// A restore of everything in an existing backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub name: String,
    pub from_backup: String,
}

impl RestoreRequest {
    pub fn new<N, B>(name: N, from_backup: B) -> Self
    where
        N: Into<String>,
        B: Into<String>,
    {
        Self {
            name: name.into(),
            from_backup: from_backup.into(),
        }
    }
}

impl VeleroCli {
    pub fn create_restore_command(&self, request: &RestoreRequest) -> CommandLine {
        self.command().args([
            "create",
            "restore",
            request.name.as_str(),
            "--from-backup",
            request.from_backup.as_str(),
            "--wait",
        ])
    }

    /// Creates the restore, waits for it and then requires its recorded phase to be `Completed`.
    pub async fn restore(
        &self,
        cancel: &CancellationToken,
        request: &RestoreRequest,
    ) -> Result<()> {
        let command = self.create_restore_command(request);
        info!("restore cmd = {}", command);
        self.runner().run_streamed(cancel, &command).await?;
        self.check_restore_phase(cancel, &request.name, &Phase::completed())
            .await
    }

    pub async fn check_restore_phase(
        &self,
        cancel: &CancellationToken,
        restore_name: &str,
        expected: &Phase,
    ) -> Result<()> {
        self.check_phase(cancel, Operation::Restore, restore_name, expected)
            .await
    }

    /// Prints `velero restore describe` and `velero restore logs` for the restore.
    pub async fn restore_logs(&self, cancel: &CancellationToken, restore_name: &str) -> Result<()> {
        self.operation_logs(cancel, Operation::Restore, restore_name)
            .await
    }

    /// Best-effort [`VeleroCli::restore_logs`].
    pub async fn collect_restore_logs(&self, cancel: &CancellationToken, restore_name: &str) {
        self.collect_logs(cancel, Operation::Restore, restore_name)
            .await
    }
}
