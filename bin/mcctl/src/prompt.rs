//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "binary"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Terminal prompt for CLI confirmations, input, and masked passwords."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::io::{self, BufRead, IsTerminal, Write};

use mcctl_orchestrator::{PromptAdapter, PromptError};

/// Prompts on stderr and reads answers from stdin.
///
/// Without a terminal on stdin every question is `Unavailable`, unless
/// `--yes` pre-answered confirmations.
#[derive(Debug, Clone, Copy)]
pub struct TerminalPrompt {
    assume_yes: bool,
}

impl TerminalPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    fn ask(&self, message: &str) -> Result<String, PromptError> {
        if !io::stdin().is_terminal() {
            return Err(PromptError::Unavailable(message.to_owned()));
        }
        let mut stderr = io::stderr();
        write!(stderr, "{message}")?;
        stderr.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(PromptError::Cancelled);
        }
        Ok(line.trim().to_owned())
    }
}

impl PromptAdapter for TerminalPrompt {
    fn confirm(&self, message: &str) -> Result<bool, PromptError> {
        if self.assume_yes {
            return Ok(true);
        }
        loop {
            match self.ask(&format!("{message} [y/N]: "))?.to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "" | "n" | "no" => return Ok(false),
                _ => eprintln!("Please enter 'y' or 'n'."),
            }
        }
    }

    fn select(&self, message: &str, options: &[String]) -> Result<String, PromptError> {
        if options.is_empty() {
            return Err(PromptError::Unavailable(message.to_owned()));
        }
        eprintln!("{message}");
        for (idx, option) in options.iter().enumerate() {
            eprintln!("  {}. {}", idx + 1, option);
        }
        loop {
            let answer = self.ask("Select an option: ")?;
            if let Ok(index) = answer.parse::<usize>() {
                if (1..=options.len()).contains(&index) {
                    return Ok(options[index - 1].clone());
                }
            }
            if let Some(option) = options.iter().find(|option| **option == answer) {
                return Ok(option.clone());
            }
            eprintln!("Choose a number between 1 and {}.", options.len());
        }
    }

    fn input(&self, message: &str) -> Result<String, PromptError> {
        loop {
            let answer = self.ask(&format!("{message}: "))?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            eprintln!("Input cannot be empty. Please try again.");
        }
    }

    /// Reads from the controlling terminal with echo off.
    fn password(&self, message: &str) -> Result<String, PromptError> {
        if !io::stdin().is_terminal() {
            return Err(PromptError::Unavailable(message.to_owned()));
        }
        loop {
            let answer = rpassword::prompt_password(format!("{message}: "))?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            eprintln!("Password cannot be empty. Please try again.");
        }
    }
}
