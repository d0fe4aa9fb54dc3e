//! ---
//! mcctl_section: "15-testing-qa-runbook"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Console, prompt, and key-derivation doubles."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mcctl_common::CommandExecutionResult;
use mcctl_orchestrator::{PromptAdapter, PromptError};
use mcctl_persistence::KdfParams;
use mcctl_rcon::{ConsoleBridge, ConsoleTarget, RconError};
use mcctl_security::{CredentialError, PasswordKdf, ScryptKdf};
use parking_lot::Mutex;
use zeroize::Zeroizing;

/// Console that accepts one password and answers from a reply table.
#[derive(Debug)]
pub struct FakeConsole {
    password: String,
    replies: Mutex<HashMap<String, String>>,
    received: Mutex<Vec<(String, String)>>,
    refusing: Mutex<bool>,
}

impl FakeConsole {
    /// Console guarded by `password`.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            replies: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
            refusing: Mutex::new(false),
        }
    }

    /// Reply to `command` with `output`. Unknown commands echo back.
    pub fn reply(&self, command: &str, output: &str) {
        self.replies.lock().insert(command.to_owned(), output.to_owned());
    }

    /// Refuse connections from now on.
    pub fn refuse(&self) {
        *self.refusing.lock() = true;
    }

    /// `(address, command)` of every authenticated request.
    pub fn received(&self) -> Vec<(String, String)> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl ConsoleBridge for FakeConsole {
    async fn execute(
        &self,
        target: &ConsoleTarget,
        command: &str,
    ) -> Result<CommandExecutionResult, RconError> {
        if *self.refusing.lock() {
            return Err(RconError::ConnectionRefused {
                addr: target.address(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        if target.password != self.password {
            return Err(RconError::AuthenticationFailed);
        }
        self.received
            .lock()
            .push((target.address(), command.to_owned()));
        let output = self
            .replies
            .lock()
            .get(command)
            .cloned()
            .unwrap_or_else(|| format!("Unknown command: {command}"));
        Ok(CommandExecutionResult::output(output, Duration::from_millis(2)))
    }
}

/// Prompt answering from a script and recording every question.
#[derive(Debug, Default)]
pub struct RecordingPrompt {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl RecordingPrompt {
    /// Prompt that will hand out `answers` in order.
    pub fn scripted<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }

    fn next(&self, message: &str) -> Result<String, PromptError> {
        self.asked.lock().push(message.to_owned());
        self.answers
            .lock()
            .pop_front()
            .ok_or_else(|| PromptError::Unavailable(message.to_owned()))
    }
}

impl PromptAdapter for RecordingPrompt {
    fn confirm(&self, message: &str) -> Result<bool, PromptError> {
        let answer = self.next(message)?;
        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    fn select(&self, message: &str, options: &[String]) -> Result<String, PromptError> {
        let answer = self.next(message)?;
        if options.contains(&answer) {
            Ok(answer)
        } else {
            Err(PromptError::Cancelled)
        }
    }

    fn input(&self, message: &str) -> Result<String, PromptError> {
        self.next(message)
    }

    fn password(&self, message: &str) -> Result<String, PromptError> {
        self.next(message)
    }
}

/// Scrypt wrapper counting derivations.
#[derive(Debug, Default)]
pub struct CountingKdf {
    calls: AtomicUsize,
}

impl CountingKdf {
    /// Derivations performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PasswordKdf for CountingKdf {
    fn derive(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ScryptKdf.derive(password, salt, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_prompt_runs_out() {
        let prompt = RecordingPrompt::scripted(["yes"]);
        assert!(prompt.confirm("delete lobby?").unwrap());
        assert!(matches!(prompt.input("name"), Err(PromptError::Unavailable(_))));
        assert_eq!(prompt.asked(), vec!["delete lobby?", "name"]);
    }
}
