//! ---
//! mcctl_section: "01-core-functionality"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Outcome of one external command or console exchange."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of a single shell invocation or console command.
///
/// A command that ran and exited nonzero is still a result, with `success == false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandExecutionResult {
    /// `None` when the process was killed before reporting a status.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub success: bool,
    /// Set when the process was killed because it outlived its timeout.
    #[serde(default)]
    pub timed_out: bool,
}

impl CommandExecutionResult {
    /// Build a result for a completed process.
    pub fn completed(
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: exit_code == Some(0),
            exit_code,
            stdout,
            stderr,
            elapsed,
            timed_out: false,
        }
    }

    /// Build a result for a process that was killed on timeout.
    pub fn timed_out(stdout: String, stderr: String, elapsed: Duration) -> Self {
        Self {
            exit_code: None,
            stdout,
            stderr,
            elapsed,
            success: false,
            timed_out: true,
        }
    }

    /// Build a successful result carrying only textual output (console replies).
    pub fn output(stdout: String, elapsed: Duration) -> Self {
        Self::completed(Some(0), stdout, String::new(), elapsed)
    }

    /// Best description of why the command failed, preferring stderr.
    pub fn failure_detail(&self) -> String {
        if self.timed_out {
            return format!("timed out after {:?}", self.elapsed);
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_owned();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_owned();
        }
        match self.exit_code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_owned(),
        }
    }
}
