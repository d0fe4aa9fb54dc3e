//! ---
//! mcctl_section: "15-testing-qa-runbook"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "In-memory compose CLI double."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet};
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use mcctl_shell::{CommandExecutionResult, RunOptions, ShellAdapter, ShellError, SpawnFailureKind};
use parking_lot::Mutex;

const SUBCOMMANDS: &[&str] = &["up", "kill", "ps", "stop"];

/// Container state tracked by [`FakeComposeShell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// `State: running`.
    Running,
    /// `State: exited`.
    Exited,
}

#[derive(Debug, Default)]
struct ComposeState {
    containers: HashMap<String, ContainerState>,
    invocations: Vec<Vec<String>>,
    stubborn: HashSet<String>,
    broken: HashSet<String>,
    missing_binary: bool,
}

/// Answers `up`, `kill`, `ps`, and `stop` like `docker compose` would.
///
/// Every call is recorded. Services marked stubborn ignore SIGTERM; broken
/// services fail `up` with exit status 1.
#[derive(Debug, Default)]
pub struct FakeComposeShell {
    state: Mutex<ComposeState>,
}

impl FakeComposeShell {
    /// No containers, every service well-behaved.
    pub fn new() -> Self {
        Self::default()
    }

    /// `service` ignores SIGTERM from now on.
    pub fn make_stubborn(&self, service: &str) {
        self.state.lock().stubborn.insert(service.to_owned());
    }

    /// `service` fails to come up.
    pub fn make_broken(&self, service: &str) {
        self.state.lock().broken.insert(service.to_owned());
    }

    /// Every later call fails to spawn, as if docker were not installed.
    pub fn remove_binary(&self) {
        self.state.lock().missing_binary = true;
    }

    /// Force a container into `state`.
    pub fn set_state(&self, service: &str, state: ContainerState) {
        self.state.lock().containers.insert(service.to_owned(), state);
    }

    /// Current container state, `None` if it was never created.
    pub fn container(&self, service: &str) -> Option<ContainerState> {
        self.state.lock().containers.get(service).copied()
    }

    /// Argument vectors of every call so far.
    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.state.lock().invocations.clone()
    }

    /// Number of calls that used `subcommand`.
    pub fn count(&self, subcommand: &str) -> usize {
        self.state
            .lock()
            .invocations
            .iter()
            .filter(|args| subcommand_of(args) == Some(subcommand))
            .count()
    }

    /// Signals delivered through `kill -s`, in order.
    pub fn signals(&self) -> Vec<String> {
        self.state
            .lock()
            .invocations
            .iter()
            .filter(|args| subcommand_of(args) == Some("kill"))
            .filter_map(|args| {
                let at = args.iter().position(|arg| arg == "-s")?;
                args.get(at + 1).cloned()
            })
            .collect()
    }
}

fn subcommand_of(args: &[String]) -> Option<&str> {
    args.iter()
        .map(String::as_str)
        .find(|arg| SUBCOMMANDS.contains(arg))
}

fn ok(stdout: String) -> CommandExecutionResult {
    CommandExecutionResult::completed(Some(0), stdout, String::new(), Duration::from_millis(1))
}

fn failed(stderr: String) -> CommandExecutionResult {
    CommandExecutionResult::completed(Some(1), String::new(), stderr, Duration::from_millis(1))
}

fn ps_row(service: &str, state: ContainerState) -> String {
    let (state, status) = match state {
        ContainerState::Running => ("running", "Up 1 second"),
        ContainerState::Exited => ("exited", "Exited (143) 1 second ago"),
    };
    serde_json::json!({
        "Name": format!("{service}-1"),
        "Service": service,
        "State": state,
        "Health": "",
        "Status": status,
    })
    .to_string()
}

#[async_trait]
impl ShellAdapter for FakeComposeShell {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        _options: &RunOptions,
    ) -> Result<CommandExecutionResult, ShellError> {
        let mut state = self.state.lock();
        if state.missing_binary {
            return Err(ShellError::SpawnFailure {
                command: command.to_owned(),
                kind: SpawnFailureKind::NotFound,
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        state.invocations.push(args.to_vec());

        let Some(service) = args.last().cloned() else {
            return Ok(failed("no arguments".into()));
        };
        let result = match subcommand_of(args) {
            Some("up") if state.broken.contains(&service) => {
                failed(format!("service \"{service}\" exited with code 1"))
            }
            Some("up") => {
                state.containers.insert(service, ContainerState::Running);
                ok(String::new())
            }
            Some("stop") => {
                if let Some(container) = state.containers.get_mut(&service) {
                    *container = ContainerState::Exited;
                }
                ok(String::new())
            }
            Some("kill") => {
                let signal = args
                    .iter()
                    .position(|arg| arg == "-s")
                    .and_then(|at| args.get(at + 1))
                    .map(String::as_str)
                    .unwrap_or("SIGKILL");
                let stubborn = state.stubborn.contains(&service);
                match state.containers.get_mut(&service) {
                    Some(container) if *container == ContainerState::Running => {
                        if signal != "SIGTERM" || !stubborn {
                            *container = ContainerState::Exited;
                        }
                        ok(String::new())
                    }
                    _ => failed(format!(
                        "Cannot kill container {service}: container is not running"
                    )),
                }
            }
            Some("ps") => match state.containers.get(&service) {
                Some(container) => ok(format!("{}\n", ps_row(&service, *container))),
                None => ok(String::new()),
            },
            _ => failed(format!("unknown command: {}", args.join(" "))),
        };
        Ok(result)
    }
}
