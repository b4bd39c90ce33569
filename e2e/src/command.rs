/*!

Cancellable execution of external commands.

[`OperationRunner::run_captured`] keeps a bounded prefix of a command's stdout. The output is read
to completion *before* waiting for the process to exit, otherwise a command writing more than the
pipe buffer would block forever on its write while we block forever on its exit.

!*/

use crate::constants::DEFAULT_CAPTURE_CAPACITY;
use crate::error::{self, Result};
use log::{debug, trace};
use snafu::{ensure, OptionExt, ResultExt};
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandLine {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The arguments as lossy UTF-8, mostly useful for assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        command
    }
}

impl Display for CommandLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// The prefix of a command's stdout that fit in the capture window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    bytes: Vec<u8>,
}

impl CapturedOutput {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for CapturedOutput {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Runs commands on behalf of the operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationRunner {
    capacity: usize,
}

impl Default for OperationRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_CAPACITY)
    }
}

impl OperationRunner {
    /// A runner that captures at most `capacity - 1` bytes of output. Output that fills all
    /// `capacity` bytes is rejected as possibly truncated.
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Runs `command`, returning the stdout it produced. Stderr goes to our stderr.
    pub async fn run_captured(
        &self,
        cancel: &CancellationToken,
        command: &CommandLine,
    ) -> Result<CapturedOutput> {
        debug!("Running '{}'", command);
        let mut child = spawn(cancel, command, Stdio::piped())?;
        let mut stdout = child
            .stdout
            .take()
            .context(error::MissingStdoutSnafu {
                command: command.to_string(),
            })?;

        let mut buf = vec![0u8; self.capacity];
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            read = fill_buffer(&mut stdout, &mut buf) => Some(read),
        };
        let filled = match read {
            Some(read) => read.context(error::ProcessIoSnafu {
                command: command.to_string(),
                action: "read stdout",
            })?,
            None => return Err(kill(child, command).await),
        };
        trace!("Read {} bytes from '{}'", filled, command);
        ensure!(
            filled < buf.len(),
            error::OutputTooLargeSnafu {
                command: command.to_string(),
                limit: self.capacity,
            }
        );
        drop(stdout);

        let status = wait(cancel, child, command).await?;
        ensure!(
            status.success(),
            error::ProcessExecutionSnafu {
                command: command.to_string(),
                code: status.code(),
            }
        );
        buf.truncate(filled);
        Ok(CapturedOutput::from(buf))
    }

    /// Runs `command` with stdout and stderr going straight to ours.
    pub async fn run_streamed(
        &self,
        cancel: &CancellationToken,
        command: &CommandLine,
    ) -> Result<()> {
        debug!("Running '{}'", command);
        let child = spawn(cancel, command, Stdio::inherit())?;
        let status = wait(cancel, child, command).await?;
        ensure!(
            status.success(),
            error::ProcessExecutionSnafu {
                command: command.to_string(),
                code: status.code(),
            }
        );
        Ok(())
    }
}

fn spawn(cancel: &CancellationToken, command: &CommandLine, stdout: Stdio) -> Result<Child> {
    ensure!(
        !cancel.is_cancelled(),
        error::CancelledSnafu {
            command: command.to_string(),
        }
    );
    command
        .command()
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::inherit())
        .spawn()
        .context(error::ProcessSpawnSnafu {
            command: command.to_string(),
        })
}

async fn wait(
    cancel: &CancellationToken,
    mut child: Child,
    command: &CommandLine,
) -> Result<ExitStatus> {
    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        status = child.wait() => Some(status),
    };
    match status {
        Some(status) => status.context(error::ProcessIoSnafu {
            command: command.to_string(),
            action: "wait for exit",
        }),
        None => Err(kill(child, command).await),
    }
}

async fn kill(mut child: Child, command: &CommandLine) -> error::Error {
    debug!("Killing '{}'", command);
    if let Err(e) = child.kill().await {
        debug!("Unable to kill '{}': {}", command, e);
    }
    error::Error::Cancelled {
        command: command.to_string(),
    }
}

/// Reads until `buf` is full or the stream ends, returning the number of bytes read.
async fn fill_buffer<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
