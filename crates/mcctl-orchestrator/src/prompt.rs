//! ---
//! mcctl_section: "01-core-functionality"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Interactive prompt capability and the headless implementation."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! Prompts are resolved by callers before orchestration runs. Destructive
//! operations receive the answer as a plain `confirmed` flag.

use std::collections::HashMap;

/// Errors raised while asking the operator something.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// No interactive channel or preset answer is available.
    #[error("no answer available for prompt '{0}'")]
    Unavailable(String),
    /// The operator aborted the prompt.
    #[error("prompt cancelled")]
    Cancelled,
    /// The two entries of a new secret differ.
    #[error("entries for '{0}' do not match")]
    Mismatch(String),
    /// Reading or writing the terminal failed.
    #[error("prompt io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability interface for operator interaction.
pub trait PromptAdapter: Send + Sync {
    /// Yes/no question.
    fn confirm(&self, message: &str) -> Result<bool, PromptError>;

    /// Pick one of `options`.
    fn select(&self, message: &str, options: &[String]) -> Result<String, PromptError>;

    /// Free-form text.
    fn input(&self, message: &str) -> Result<String, PromptError>;

    /// Secret text. Implementations must not echo it.
    fn password(&self, message: &str) -> Result<String, PromptError>;

    /// New secret, asked twice; both entries must match.
    fn new_password(&self, message: &str) -> Result<String, PromptError> {
        let first = self.password(message)?;
        let second = self.password(&format!("{message} (again)"))?;
        if first != second {
            return Err(PromptError::Mismatch(message.to_owned()));
        }
        Ok(first)
    }
}

/// Prompt for headless callers: answers come from presets keyed by message.
#[derive(Debug, Clone, Default)]
pub struct ApiPrompt {
    assume_yes: Option<bool>,
    answers: HashMap<String, String>,
}

impl ApiPrompt {
    /// Prompt with no presets; every question fails with `Unavailable`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every confirmation with `answer`.
    pub fn assume(mut self, answer: bool) -> Self {
        self.assume_yes = Some(answer);
        self
    }

    /// Preset the answer to `message` for `select` and `input`.
    pub fn answer(mut self, message: impl Into<String>, value: impl Into<String>) -> Self {
        self.answers.insert(message.into(), value.into());
        self
    }
}

impl PromptAdapter for ApiPrompt {
    fn confirm(&self, message: &str) -> Result<bool, PromptError> {
        if let Some(answer) = self.answers.get(message) {
            return Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes" | "true"));
        }
        self.assume_yes
            .ok_or_else(|| PromptError::Unavailable(message.to_owned()))
    }

    fn select(&self, message: &str, options: &[String]) -> Result<String, PromptError> {
        let answer = self
            .answers
            .get(message)
            .ok_or_else(|| PromptError::Unavailable(message.to_owned()))?;
        options
            .iter()
            .find(|option| *option == answer)
            .cloned()
            .ok_or_else(|| {
                PromptError::Unavailable(format!("{message} (preset '{answer}' is not an option)"))
            })
    }

    fn input(&self, message: &str) -> Result<String, PromptError> {
        self.answers
            .get(message)
            .cloned()
            .ok_or_else(|| PromptError::Unavailable(message.to_owned()))
    }

    fn password(&self, message: &str) -> Result<String, PromptError> {
        self.input(message)
    }
}
