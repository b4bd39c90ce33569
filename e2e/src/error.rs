use crate::status::Phase;
use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by collaborators that install into, poll, or tear down a cluster.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync + 'static>;

const DEPLOY_LOGS_HINT: &str = "Error installing Velero. Use `kubectl logs deploy/velero -n";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Invalid install configuration: {}", reason))]
    Configuration { reason: String },

    #[snafu(display("Unable to resolve credentials path '{}': {}", path.display(), source))]
    CredentialsPath {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to create '{}' process: {}", command, source))]
    ProcessSpawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display(
        "Command '{}' failed with exit code {}",
        command,
        code.map(|c| c.to_string()).unwrap_or_else(|| "<terminated by signal>".to_string())
    ))]
    ProcessExecution { command: String, code: Option<i32> },

    #[snafu(display("Unable to {} for '{}': {}", action, command, source))]
    ProcessIo {
        command: String,
        action: String,
        source: std::io::Error,
    },

    #[snafu(display("Unable to capture stdout of '{}'", command))]
    MissingStdout { command: String },

    #[snafu(display(
        "Output of '{}' reached the {} byte capture limit and cannot be trusted",
        command,
        limit
    ))]
    OutputTooLarge { command: String, limit: usize },

    #[snafu(display("Unable to decode status document: {}", source))]
    MalformedOutput { source: serde_json::Error },

    #[snafu(display(
        "Unexpected {} phase for '{}': got '{}', expecting '{}'",
        kind,
        name,
        observed,
        expected
    ))]
    PhaseMismatch {
        kind: String,
        name: String,
        observed: Phase,
        expected: Phase,
    },

    #[snafu(display("Command '{}' was cancelled", command))]
    Cancelled { command: String },

    #[snafu(display("Failed to ensure kubernetes cluster exists: {}", source))]
    ClusterCheck { source: CollaboratorError },

    #[snafu(display("Failed to translate install configuration into resources: {}", source))]
    ResourceBuild { source: CollaboratorError },

    #[snafu(display(
        "Failed to apply Velero resources: {}\n\n{} {}` to check the deploy logs",
        source,
        DEPLOY_LOGS_HINT,
        namespace
    ))]
    ResourceApply {
        namespace: String,
        source: CollaboratorError,
    },

    #[snafu(display(
        "Velero deployment did not become ready: {}\n\n{} {}` to check the deploy logs",
        source,
        DEPLOY_LOGS_HINT,
        namespace
    ))]
    DeploymentReady {
        namespace: String,
        source: CollaboratorError,
    },

    #[snafu(display(
        "Velero node agent daemonset did not become ready: {}\n\n{} {}` to check the deploy logs",
        source,
        DEPLOY_LOGS_HINT,
        namespace
    ))]
    DaemonSetReady {
        namespace: String,
        source: CollaboratorError,
    },

    #[snafu(display("Unable to uninstall Velero from namespace '{}': {}", namespace, source))]
    Uninstall {
        namespace: String,
        source: CollaboratorError,
    },

    #[snafu(display("Unable to read settings from the environment: {}", source))]
    Settings { source: envy::Error },
}
