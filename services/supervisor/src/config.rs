//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Program table configuration for the supervisor."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_GRACE_SECS: u64 = 10;

/// Top-level supervisor document.
///
/// ```toml
/// grace_period_secs = 10
///
/// [[program]]
/// name = "mc-survival-1"
/// command = "java"
/// args = ["-Xmx4G", "-jar", "server.jar", "nogui"]
/// cwd = "/srv/survival-1"
/// autostart = true
///
/// [program.env]
/// EULA = "TRUE"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorFile {
    /// Wait between TERM and KILL during restart and shutdown.
    #[serde(default = "default_grace_secs")]
    pub grace_period_secs: u64,
    /// Supervised programs.
    #[serde(default, rename = "program")]
    pub programs: Vec<ProgramConfig>,
}

fn default_grace_secs() -> u64 {
    DEFAULT_GRACE_SECS
}

impl SupervisorFile {
    /// Grace period as a duration.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for SupervisorFile {
    fn default() -> Self {
        Self {
            grace_period_secs: DEFAULT_GRACE_SECS,
            programs: Vec::new(),
        }
    }
}

/// One supervised program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Stable process name, conventionally `mc-<instance>`.
    pub name: String,
    /// Executable.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Extra environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Start when the daemon starts.
    #[serde(default)]
    pub autostart: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub programs: usize,
    pub autostart: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read supervisor configuration from {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse supervisor configuration at {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("supervisor configuration validation failed:\n{details}")]
    Validation { details: String },
}

pub fn load_config(path: impl AsRef<Path>) -> Result<SupervisorFile, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn validate_config(config: &SupervisorFile) -> Result<ValidationReport, ConfigError> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    if config.grace_period_secs == 0 {
        errors.push("grace_period_secs must be greater than zero".to_string());
    }

    for program in &config.programs {
        if program.name.trim().is_empty() {
            errors.push("program name may not be empty".to_string());
        } else if program.name.contains('/') {
            errors.push(format!("program name '{}' may not contain '/'", program.name));
        }
        if !names.insert(program.name.clone()) {
            errors.push(format!("duplicate program name '{}'", program.name));
        }
        if program.command.trim().is_empty() {
            errors.push(format!("program '{}' must define a command", program.name));
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::Validation {
            details: errors.join("\n"),
        });
    }

    Ok(ValidationReport {
        programs: config.programs.len(),
        autostart: config.programs.iter().filter(|p| p.autostart).count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
grace_period_secs = 5

[[program]]
name = "mc-survival-1"
command = "java"
args = ["-jar", "server.jar", "nogui"]
autostart = true

[program.env]
EULA = "TRUE"

[[program]]
name = "mc-lobby"
command = "java"
"#;

    #[test]
    fn parses_program_tables() {
        let file: SupervisorFile = toml::from_str(SAMPLE).unwrap();
        assert_eq!(file.grace_period(), Duration::from_secs(5));
        assert_eq!(file.programs.len(), 2);
        assert_eq!(file.programs[0].env["EULA"], "TRUE");
        assert!(!file.programs[1].autostart);
        let report = validate_config(&file).unwrap();
        assert_eq!(report.programs, 2);
        assert_eq!(report.autostart, 1);
    }

    #[test]
    fn duplicates_and_blank_commands_are_rejected() {
        let mut file: SupervisorFile = toml::from_str(SAMPLE).unwrap();
        file.programs[1].name = "mc-survival-1".into();
        file.programs[1].command = " ".into();
        let err = validate_config(&file).unwrap_err().to_string();
        assert!(err.contains("duplicate program name"));
        assert!(err.contains("must define a command"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config("/nonexistent/supervisor.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
