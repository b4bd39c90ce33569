use crate::command::{CapturedOutput, CommandLine, OperationRunner};
use crate::error::Result;
use crate::status::{check_phase, Phase};
use log::{info, warn};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// The kinds of Velero operation that have a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Backup,
    Restore,
}

impl Operation {
    /// The CLI noun for this operation, e.g. `velero backup get`.
    pub fn noun(&self) -> &'static str {
        match self {
            Operation::Backup => "backup",
            Operation::Restore => "restore",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.noun(), f)
    }
}

/// The velero CLI, scoped to the namespace Velero is installed in.
#[derive(Debug, Clone)]
pub struct VeleroCli {
    cli: PathBuf,
    namespace: String,
    runner: OperationRunner,
}

impl VeleroCli {
    pub fn new<P, S>(cli: P, namespace: S) -> Self
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        Self {
            cli: cli.into(),
            namespace: namespace.into(),
            runner: OperationRunner::default(),
        }
    }

    /// Use `runner` for all commands, e.g. to change the capture window.
    pub fn with_runner(mut self, runner: OperationRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn cli(&self) -> &Path {
        &self.cli
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn runner(&self) -> &OperationRunner {
        &self.runner
    }

    /// `velero --namespace <namespace>`, ready for more arguments.
    pub fn command(&self) -> CommandLine {
        CommandLine::new(&self.cli).args(["--namespace", self.namespace.as_str()])
    }

    pub fn get_command(&self, operation: Operation, name: &str) -> CommandLine {
        self.command().args([operation.noun(), "get", "-o", "json", name])
    }

    pub fn describe_command(&self, operation: Operation, name: &str) -> CommandLine {
        self.command().args([operation.noun(), "describe", name])
    }

    pub fn logs_command(&self, operation: Operation, name: &str) -> CommandLine {
        self.command().args([operation.noun(), "logs", name])
    }

    /// Fetches the `name` backup or restore as json.
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        operation: Operation,
        name: &str,
    ) -> Result<CapturedOutput> {
        let command = self.get_command(operation, name);
        info!("get {} cmd = {}", operation, command);
        self.runner.run_captured(cancel, &command).await
    }

    /// Requires the phase of the `name` backup or restore to be `expected`.
    pub async fn check_phase(
        &self,
        cancel: &CancellationToken,
        operation: Operation,
        name: &str,
        expected: &Phase,
    ) -> Result<()> {
        let output = self.get(cancel, operation, name).await?;
        check_phase(&output, operation.noun(), name, expected)
    }

    /// Prints `describe` and then `logs` for the `name` backup or restore. The first failing
    /// command ends the retrieval.
    pub async fn operation_logs(
        &self,
        cancel: &CancellationToken,
        operation: Operation,
        name: &str,
    ) -> Result<()> {
        let describe = self.describe_command(operation, name);
        info!("describe cmd = {}", describe);
        self.runner.run_streamed(cancel, &describe).await?;
        let logs = self.logs_command(operation, name);
        info!("logs cmd = {}", logs);
        self.runner.run_streamed(cancel, &logs).await
    }

    /// Like [`VeleroCli::operation_logs`], but a failure is only logged. Use this for diagnostics
    /// after an operation's outcome is already known.
    pub async fn collect_logs(
        &self,
        cancel: &CancellationToken,
        operation: Operation,
        name: &str,
    ) {
        if let Err(e) = self.operation_logs(cancel, operation, name).await {
            warn!("Unable to retrieve logs for {} '{}': {}", operation, name, e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_command_is_namespaced() {
        let velero = VeleroCli::new("velero", "backup-ns");
        assert_eq!(
            velero.get_command(Operation::Backup, "b1").args_lossy(),
            vec!["--namespace", "backup-ns", "backup", "get", "-o", "json", "b1"]
        );
        assert_eq!(
            velero.get_command(Operation::Restore, "r1").args_lossy(),
            vec!["--namespace", "backup-ns", "restore", "get", "-o", "json", "r1"]
        );
        assert_eq!(
            velero.describe_command(Operation::Restore, "r1").args_lossy(),
            vec!["--namespace", "backup-ns", "restore", "describe", "r1"]
        );
        assert_eq!(
            velero.logs_command(Operation::Backup, "b1").args_lossy(),
            vec!["--namespace", "backup-ns", "backup", "logs", "b1"]
        );
    }

    #[test]
    fn runner_is_replaceable() {
        let velero = VeleroCli::new("velero", "velero").with_runner(OperationRunner::new(64));
        assert_eq!(velero.runner().capacity(), 64);
        assert_eq!(
            VeleroCli::new("velero", "velero").runner().capacity(),
            crate::constants::DEFAULT_CAPTURE_CAPACITY
        );
    }
}
