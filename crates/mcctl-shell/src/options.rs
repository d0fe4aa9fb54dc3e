//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Per-invocation execution options."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Working directory, environment overlay, and timeout for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Directory the process starts in; inherits the caller's when `None`.
    pub cwd: Option<PathBuf>,
    /// Variables merged over the ambient environment. Later inserts replace earlier ones.
    pub env: IndexMap<String, String>,
    /// Upper bound on wall-clock runtime before the process is killed.
    pub timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: IndexMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RunOptions {
    /// Options with the given timeout and no overlay.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Set the working directory.
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add or replace one environment variable in the overlay.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Replace the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_stay_unique() {
        let options = RunOptions::default()
            .env("COMPOSE_FILE", "a.yml")
            .env("COMPOSE_FILE", "b.yml");
        assert_eq!(options.env.len(), 1);
        assert_eq!(options.env["COMPOSE_FILE"], "b.yml");
    }

    #[test]
    fn builder_sets_fields() {
        let options = RunOptions::with_timeout(Duration::from_secs(5)).cwd("/srv/mc");
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.cwd.as_deref(), Some(Path::new("/srv/mc")));
    }
}
