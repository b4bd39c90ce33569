/*!

`velero-e2e` drives the `velero` CLI and a Kubernetes cluster through the lifecycle of a
backup/restore end-to-end test: installing Velero, creating backups, restores and storage
locations, verifying their phases and collecting their logs.

The output of `velero ... get -o json` is never trusted blindly. It is captured into a bounded
buffer (see [`OperationRunner`]), rejected when it fills the buffer, and its `status.phase` is
checked after every create command because `--wait` says nothing about how the operation ended.

!*/

pub mod backup;
pub mod command;
pub mod config;
pub mod constants;
mod error;
pub mod install;
pub mod k8s;
pub mod location;
pub mod restore;
pub mod settings;
pub mod status;
pub mod velero;

pub use backup::BackupRequest;
pub use command::{CapturedOutput, CommandLine, OperationRunner};
pub use config::{ConfigBuilder, ConfigMap, InstallConfig};
pub use error::{CollaboratorError, Error, Result};
pub use install::{install_velero, uninstall_velero, Installer};
pub use location::{BackupLocationRequest, SecretKeyRef};
pub use restore::RestoreRequest;
pub use settings::E2eSettings;
pub use status::Phase;
pub use tokio_util::sync::CancellationToken;
pub use velero::{Operation, VeleroCli};

use env_logger::Builder;
use log::LevelFilter;
use std::env;

const DEFAULT_LEVEL_FILTER: LevelFilter = LevelFilter::Info;

/// Extract the value of `RUST_LOG` if it exists, otherwise log this crate at `log_level` (or
/// `Info`) and everything else at `Error`.
pub fn init_logger(log_level: Option<LevelFilter>) {
    match env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            Builder::new()
                .filter_level(LevelFilter::Error)
                .filter(
                    Some(env!("CARGO_CRATE_NAME")),
                    log_level.unwrap_or(DEFAULT_LEVEL_FILTER),
                )
                .init();
        }
    }
}
