//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "External command execution with captured output and timeouts."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Shell execution adapter.
//!
//! Ordinary command failures come back as a [`CommandExecutionResult`] with
//! `success == false`. Only the inability to start the process is an error.

use std::fmt;
use std::io;

use async_trait::async_trait;

pub use mcctl_common::CommandExecutionResult;

mod options;
mod process;

pub use options::RunOptions;
pub use process::ProcessShell;

/// Why a process could not be spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnFailureKind {
    /// The binary does not exist on the search path.
    NotFound,
    /// The binary exists but may not be executed.
    PermissionDenied,
    /// Any other operating system refusal.
    Other,
}

impl From<io::ErrorKind> for SpawnFailureKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => SpawnFailureKind::NotFound,
            io::ErrorKind::PermissionDenied => SpawnFailureKind::PermissionDenied,
            _ => SpawnFailureKind::Other,
        }
    }
}

impl fmt::Display for SpawnFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpawnFailureKind::NotFound => "binary not found",
            SpawnFailureKind::PermissionDenied => "permission denied",
            SpawnFailureKind::Other => "os error",
        };
        f.write_str(label)
    }
}

/// Error type for the shell adapter.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// The process could not be started at all.
    #[error("failed to spawn '{command}' ({kind}): {source}")]
    SpawnFailure {
        /// Program that was requested.
        command: String,
        /// Classified cause.
        kind: SpawnFailureKind,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// The process started but its exit status could not be collected.
    #[error("failed to wait on '{command}': {source}")]
    Wait {
        /// Program that was requested.
        command: String,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
}

impl ShellError {
    pub(crate) fn spawn(command: &str, source: io::Error) -> Self {
        ShellError::SpawnFailure {
            command: command.to_owned(),
            kind: source.kind().into(),
            source,
        }
    }
}

/// Capability interface for running an external command to completion.
#[async_trait]
pub trait ShellAdapter: Send + Sync {
    /// Run `command` with `args`, waiting at most `options.timeout`.
    async fn run(
        &self,
        command: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandExecutionResult, ShellError>;
}
