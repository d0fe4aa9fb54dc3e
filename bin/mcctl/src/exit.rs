//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "binary"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Maps classified failures onto process exit codes."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::process::ExitCode;

use mcctl_orchestrator::{DocsError, ErrorClass, OrchestratorError, PromptError, ServiceError};
use mcctl_rcon::RconError;
use mcctl_security::CredentialError;

pub const INTERNAL: u8 = 1;
pub const USER: u8 = 2;
pub const BACKEND: u8 = 3;

/// Failures raised by the CLI itself.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Rejected(String),
    /// Some members of a batch failed; `worst` is the most severe class among them.
    #[error("{failed} of {total} instances failed")]
    BatchFailed {
        failed: usize,
        total: usize,
        worst: ErrorClass,
    },
}

/// Internal outranks backend, which outranks user.
pub fn worst_class(classes: impl IntoIterator<Item = ErrorClass>) -> Option<ErrorClass> {
    classes.into_iter().max_by_key(|class| match class {
        ErrorClass::User => 0,
        ErrorClass::Backend => 1,
        ErrorClass::Internal => 2,
    })
}

fn class_code(class: ErrorClass) -> u8 {
    match class {
        ErrorClass::User => USER,
        ErrorClass::Backend => BACKEND,
        ErrorClass::Internal => INTERNAL,
    }
}

pub fn code_for(err: &anyhow::Error) -> ExitCode {
    ExitCode::from(classify(err))
}

fn classify(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<OrchestratorError>() {
            return class_code(err.class());
        }
        if let Some(CliError::BatchFailed { worst, .. }) = cause.downcast_ref::<CliError>() {
            return class_code(*worst);
        }
        if let Some(err) = cause.downcast_ref::<CredentialError>() {
            return if err.is_user_error() { USER } else { INTERNAL };
        }
        if cause.is::<ServiceError>() || cause.is::<RconError>() {
            return BACKEND;
        }
        if cause.is::<CliError>() || cause.is::<PromptError>() {
            return USER;
        }
        if let Some(DocsError::UnknownTopic(_)) = cause.downcast_ref::<DocsError>() {
            return USER;
        }
    }
    INTERNAL
}
