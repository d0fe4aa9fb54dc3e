//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Wire types of the process supervisor control API."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! JSON bodies exchanged with the supervisor daemon.
//!
//! | Method | Path                          | Body            | Reply                     |
//! |--------|-------------------------------|-----------------|---------------------------|
//! | GET    | `/api/processes`              |                 | `Vec<ProcessDescription>` |
//! | GET    | `/api/processes/:name`        |                 | `ProcessDescription`      |
//! | POST   | `/api/processes/:name/start`  |                 | `ProcessDescription`      |
//! | POST   | `/api/processes/:name/signal` | `SignalRequest` | `ProcessDescription`      |
//! | POST   | `/api/processes/:name/restart`|                 | `ProcessDescription`      |
//!
//! Failures reply with an [`ErrorBody`] and a 4xx/5xx status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a supervised process as tracked by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Running,
    Starting,
    Stopping,
    Stopped,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDescription {
    pub name: String,
    pub state: ProcessState,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub restarts: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

/// Signal the daemon forwards to a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Term,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRequest {
    pub signal: SignalKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_lowercase() {
        let body = serde_json::to_string(&SignalRequest {
            signal: SignalKind::Term,
        })
        .unwrap();
        assert_eq!(body, r#"{"signal":"term"}"#);
        let description: ProcessDescription =
            serde_json::from_str(r#"{"name":"mc-lobby","state":"errored"}"#).unwrap();
        assert_eq!(description.state, ProcessState::Errored);
        assert_eq!(description.restarts, 0);
        assert!(description.pid.is_none());
    }
}
