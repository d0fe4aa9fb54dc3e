//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "tokio::process backed shell adapter."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::io;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{CommandExecutionResult, RunOptions, ShellAdapter, ShellError};

/// How long to wait for pipes to close after a timed-out child is killed.
const DRAIN_AFTER_KILL: Duration = Duration::from_secs(1);

/// Runs commands as real child processes.
///
/// On unix each child leads its own process group, and a timeout kills the whole
/// group so helpers the command forked do not outlive it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessShell;

impl ProcessShell {
    /// Create a new adapter.
    pub fn new() -> Self {
        Self
    }
}

fn drain<R>(reader: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            if let Err(err) = reader.read_to_end(&mut buf).await {
                debug!(?err, "stopped reading child output");
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

#[cfg(unix)]
fn kill_group(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) -> io::Result<()> {
    Ok(())
}

async fn collect(handle: JoinHandle<String>, bound: Option<Duration>) -> String {
    let abort = handle.abort_handle();
    let joined = match bound {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                return String::new();
            }
        },
        None => handle.await,
    };
    joined.unwrap_or_default()
}

#[async_trait]
impl ShellAdapter for ProcessShell {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandExecutionResult, ShellError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(%command, ?args, cwd = ?options.cwd, timeout = ?options.timeout, "spawning command");
        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ShellError::spawn(command, source))?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let waited = tokio::time::timeout(options.timeout, child.wait()).await;
        match waited {
            Ok(Ok(status)) => {
                let result = CommandExecutionResult::completed(
                    status.code(),
                    collect(stdout, None).await,
                    collect(stderr, None).await,
                    started.elapsed(),
                );
                debug!(
                    %command,
                    exit_code = ?result.exit_code,
                    elapsed = ?result.elapsed,
                    "command finished"
                );
                Ok(result)
            }
            Ok(Err(source)) => Err(ShellError::Wait {
                command: command.to_owned(),
                source,
            }),
            Err(_) => {
                if let Some(pid) = child.id() {
                    if let Err(err) = kill_group(pid) {
                        warn!(%command, pid, ?err, "failed to kill process group");
                    }
                }
                if let Err(err) = child.kill().await {
                    warn!(%command, ?err, "failed to kill timed out command");
                }
                let elapsed = started.elapsed();
                warn!(%command, ?elapsed, "command timed out and was killed");
                Ok(CommandExecutionResult::timed_out(
                    collect(stdout, Some(DRAIN_AFTER_KILL)).await,
                    collect(stderr, Some(DRAIN_AFTER_KILL)).await,
                    elapsed,
                ))
            }
        }
    }
}
