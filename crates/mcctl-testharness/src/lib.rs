//! ---
//! mcctl_section: "15-testing-qa-runbook"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Test doubles and fixtures shared by integration suites."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! Deterministic stand-ins for docker compose, the supervisor daemon, the
//! remote console, and the operator, plus a [`Harness`] wiring them into an
//! [`Orchestrator`](mcctl_orchestrator::Orchestrator) over a temporary store.
#![warn(missing_docs)]

mod compose;
mod doubles;
mod fixtures;
mod supervisor;

pub use compose::{ContainerState, FakeComposeShell};
pub use doubles::{CountingKdf, FakeConsole, RecordingPrompt};
pub use fixtures::{cheap_credentials, fast_lifecycle, Harness, CONSOLE_PASSWORD};
pub use supervisor::FakeSupervisorClient;
