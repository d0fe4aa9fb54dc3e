//! ---
//! mcctl_section: "15-testing-qa-runbook"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "In-memory supervisor control API double."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use mcctl_common::supervisor::{ProcessDescription, ProcessState, SignalKind};
use mcctl_orchestrator::{ServiceError, SupervisorClient};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Table {
    processes: HashMap<String, ProcessDescription>,
    stubborn: HashSet<String>,
    calls: Vec<String>,
    unreachable: bool,
    next_pid: u32,
}

/// Process table answering like the supervisor daemon.
#[derive(Debug, Default)]
pub struct FakeSupervisorClient {
    table: Mutex<Table>,
}

impl FakeSupervisorClient {
    /// Empty process table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stopped process entry.
    pub fn register(&self, process: &str) {
        self.table.lock().processes.insert(
            process.to_owned(),
            ProcessDescription {
                name: process.to_owned(),
                state: ProcessState::Stopped,
                pid: None,
                restarts: 0,
                started_at: None,
                exit_code: None,
            },
        );
    }

    /// `process` ignores `term`.
    pub fn make_stubborn(&self, process: &str) {
        self.table.lock().stubborn.insert(process.to_owned());
    }

    /// Every later request fails as if the daemon were down.
    pub fn go_offline(&self) {
        self.table.lock().unreachable = true;
    }

    /// Current state of `process`.
    pub fn state(&self, process: &str) -> Option<ProcessState> {
        self.table.lock().processes.get(process).map(|p| p.state)
    }

    /// Requests received, as `describe:<name>`, `start:<name>`, `term:<name>`, `kill:<name>`.
    pub fn calls(&self) -> Vec<String> {
        self.table.lock().calls.clone()
    }

    fn guard(table: &Table) -> Result<(), ServiceError> {
        if table.unreachable {
            let endpoint = "http://127.0.0.1:7100: connection refused";
            return Err(ServiceError::Unreachable(endpoint.into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SupervisorClient for FakeSupervisorClient {
    async fn describe(&self, process: &str) -> Result<Option<ProcessDescription>, ServiceError> {
        let mut table = self.table.lock();
        Self::guard(&table)?;
        table.calls.push(format!("describe:{process}"));
        Ok(table.processes.get(process).cloned())
    }

    async fn start(&self, process: &str) -> Result<ProcessDescription, ServiceError> {
        let mut table = self.table.lock();
        Self::guard(&table)?;
        table.calls.push(format!("start:{process}"));
        table.next_pid += 1;
        let pid = 4000 + table.next_pid;
        let entry = table
            .processes
            .get_mut(process)
            .ok_or_else(|| ServiceError::NotRegistered(process.to_owned()))?;
        if entry.state != ProcessState::Running {
            entry.state = ProcessState::Running;
            entry.pid = Some(pid);
            entry.started_at = Some(Utc::now());
            entry.exit_code = None;
        }
        Ok(entry.clone())
    }

    async fn signal(
        &self,
        process: &str,
        signal: SignalKind,
    ) -> Result<ProcessDescription, ServiceError> {
        let mut table = self.table.lock();
        Self::guard(&table)?;
        let label = match signal {
            SignalKind::Term => "term",
            SignalKind::Kill => "kill",
        };
        table.calls.push(format!("{label}:{process}"));
        let stubborn = table.stubborn.contains(process);
        let entry = table
            .processes
            .get_mut(process)
            .ok_or_else(|| ServiceError::NotRegistered(process.to_owned()))?;
        if signal == SignalKind::Kill || !stubborn {
            entry.state = ProcessState::Stopped;
            entry.pid = None;
            entry.exit_code = Some(if signal == SignalKind::Kill { 137 } else { 0 });
        }
        Ok(entry.clone())
    }
}
