//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "In-memory process table with spawn, signal, and exit tracking."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! Each started program gets a watcher task that owns the child handle and
//! records its exit. A generation counter keeps a late watcher from
//! overwriting the entry of a newer run.

use std::collections::HashMap;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use mcctl_common::supervisor::{ProcessDescription, ProcessState, SignalKind};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::ProgramConfig;

const EXIT_POLL: Duration = Duration::from_millis(50);
const KILL_SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum TableError {
    #[error("process '{0}' is not registered")]
    UnknownProcess(String),
    #[error("failed to spawn '{name}'")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to signal '{name}'")]
    Signal {
        name: String,
        #[source]
        source: io::Error,
    },
}

type Result<T> = std::result::Result<T, TableError>;

struct Entry {
    program: ProgramConfig,
    state: ProcessState,
    pid: Option<u32>,
    restarts: u32,
    started_at: Option<chrono::DateTime<Utc>>,
    exit_code: Option<i32>,
    generation: u64,
    stop_requested: bool,
    killer: Option<oneshot::Sender<()>>,
}

impl Entry {
    fn new(program: ProgramConfig) -> Self {
        Self {
            program,
            state: ProcessState::Stopped,
            pid: None,
            restarts: 0,
            started_at: None,
            exit_code: None,
            generation: 0,
            stop_requested: false,
            killer: None,
        }
    }

    fn describe(&self) -> ProcessDescription {
        ProcessDescription {
            name: self.program.name.clone(),
            state: self.state,
            pid: self.pid,
            restarts: self.restarts,
            started_at: self.started_at,
            exit_code: self.exit_code,
        }
    }

    fn alive(&self) -> bool {
        self.pid.is_some()
    }

    fn force_kill(&mut self) {
        if let Some(killer) = self.killer.take() {
            // the watcher may already have observed the exit
            let _ = killer.send(());
        }
    }
}

/// Registered programs and their current run.
#[derive(Clone)]
pub struct ProcessTable {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    grace: Duration,
}

impl ProcessTable {
    pub fn new(programs: impl IntoIterator<Item = ProgramConfig>, grace: Duration) -> Self {
        let entries = programs
            .into_iter()
            .map(|program| (program.name.clone(), Entry::new(program)))
            .collect();
        Self {
            entries: Arc::new(Mutex::new(entries)),
            grace,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries sorted by name.
    pub fn list(&self) -> Vec<ProcessDescription> {
        let mut all: Vec<_> = self.entries.lock().values().map(Entry::describe).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn describe(&self, name: &str) -> Result<ProcessDescription> {
        self.entries
            .lock()
            .get(name)
            .map(Entry::describe)
            .ok_or_else(|| TableError::UnknownProcess(name.to_owned()))
    }

    /// Spawn the program unless a run is already live. Must be called inside a tokio runtime.
    pub fn start(&self, name: &str) -> Result<ProcessDescription> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| TableError::UnknownProcess(name.to_owned()))?;
        if entry.alive() {
            debug!(process = name, pid = ?entry.pid, "already running");
            return Ok(entry.describe());
        }

        let program = &entry.program;
        let mut command = Command::new(&program.command);
        command
            .args(&program.args)
            .envs(&program.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &program.cwd {
            command.current_dir(cwd);
        }
        let child = command.spawn().map_err(|source| {
            entry.state = ProcessState::Errored;
            TableError::Spawn {
                name: name.to_owned(),
                source,
            }
        })?;

        let (kill_tx, kill_rx) = oneshot::channel();
        entry.generation += 1;
        entry.state = ProcessState::Running;
        entry.pid = child.id();
        entry.started_at = Some(Utc::now());
        entry.exit_code = None;
        entry.stop_requested = false;
        entry.killer = Some(kill_tx);
        let generation = entry.generation;
        let description = entry.describe();
        drop(entries);

        info!(process = name, pid = ?description.pid, "process started");
        tokio::spawn(watch_child(
            self.entries.clone(),
            name.to_owned(),
            generation,
            child,
            kill_rx,
        ));
        Ok(description)
    }

    /// Forward a signal. Signalling a process with no live run is a no-op.
    pub fn signal(&self, name: &str, signal: SignalKind) -> Result<ProcessDescription> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| TableError::UnknownProcess(name.to_owned()))?;
        let Some(pid) = entry.pid else {
            debug!(process = name, ?signal, "signal ignored, not running");
            return Ok(entry.describe());
        };

        entry.stop_requested = true;
        entry.state = ProcessState::Stopping;
        match signal {
            SignalKind::Term => terminate(entry, pid).map_err(|source| TableError::Signal {
                name: name.to_owned(),
                source,
            })?,
            SignalKind::Kill => entry.force_kill(),
        }
        info!(process = name, pid, ?signal, "signal delivered");
        Ok(entry.describe())
    }

    /// TERM, wait out the grace period, KILL if needed, then start again.
    pub async fn restart(&self, name: &str) -> Result<ProcessDescription> {
        self.halt(name).await?;
        self.start(name)?;
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| TableError::UnknownProcess(name.to_owned()))?;
        entry.restarts += 1;
        Ok(entry.describe())
    }

    /// Halt every live process. Used on daemon shutdown.
    pub async fn shutdown(&self) {
        let names: Vec<String> = self
            .entries
            .lock()
            .values()
            .filter(|entry| entry.alive())
            .map(|entry| entry.program.name.clone())
            .collect();
        let halts = names.iter().map(|name| self.halt(name));
        for (name, result) in names.iter().zip(join_all(halts).await) {
            if let Err(err) = result {
                warn!(process = %name, error = %err, "shutdown halt failed");
            }
        }
    }

    /// Start every program flagged `autostart`.
    pub fn autostart(&self) -> Vec<(String, Result<ProcessDescription>)> {
        let names: Vec<String> = self
            .entries
            .lock()
            .values()
            .filter(|entry| entry.program.autostart)
            .map(|entry| entry.program.name.clone())
            .collect();
        names
            .into_iter()
            .map(|name| {
                let result = self.start(&name);
                (name, result)
            })
            .collect()
    }

    async fn halt(&self, name: &str) -> Result<()> {
        if self.describe(name)?.pid.is_none() {
            return Ok(());
        }
        self.signal(name, SignalKind::Term)?;
        if self.wait_exit(name, self.grace).await? {
            return Ok(());
        }
        warn!(
            process = name,
            grace_ms = self.grace.as_millis() as u64,
            "grace period elapsed, killing"
        );
        self.signal(name, SignalKind::Kill)?;
        if !self.wait_exit(name, KILL_SETTLE).await? {
            warn!(process = name, "process still alive after kill");
        }
        Ok(())
    }

    async fn wait_exit(&self, name: &str, limit: Duration) -> Result<bool> {
        let deadline = Instant::now() + limit;
        loop {
            if self.describe(name)?.pid.is_none() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(EXIT_POLL).await;
        }
    }
}

#[cfg(unix)]
fn terminate(_entry: &mut Entry, pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // exited between the table read and the signal
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
fn terminate(entry: &mut Entry, _pid: u32) -> io::Result<()> {
    entry.force_kill();
    Ok(())
}

async fn watch_child(
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    name: String,
    generation: u64,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        Ok(()) = kill_rx => None,
    };
    let status = match exited {
        Some(status) => status,
        None => {
            if let Err(err) = child.start_kill() {
                warn!(process = %name, error = %err, "kill failed");
            }
            child.wait().await
        }
    };

    let mut entries = entries.lock();
    let Some(entry) = entries.get_mut(&name) else {
        return;
    };
    if entry.generation != generation {
        return;
    }
    entry.pid = None;
    entry.killer = None;
    match status {
        Ok(status) => {
            entry.exit_code = exit_code(status);
            entry.state = if entry.stop_requested || status.success() {
                ProcessState::Stopped
            } else {
                ProcessState::Errored
            };
            info!(
                process = %name,
                exit_code = ?entry.exit_code,
                state = ?entry.state,
                "process exited"
            );
        }
        Err(err) => {
            entry.state = ProcessState::Errored;
            warn!(process = %name, error = %err, "lost track of process");
        }
    }
}

/// Exit code, or `128 + signal` for signal deaths on unix.
fn exit_code(status: ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal().map(|signal| 128 + signal)
    }
    #[cfg(not(unix))]
    {
        None
    }
}
