//! ---
//! mcctl_section: "01-core-functionality"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Layered TOML configuration for the control plane."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/mcctl.redb")
}

fn default_lock_wait() -> Duration {
    Duration::from_secs(10)
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("data/audit.log")
}

fn default_audit_actor() -> String {
    "cli:local".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_compose_binary() -> String {
    "docker".to_owned()
}

fn default_compose_args() -> Vec<String> {
    vec!["compose".to_owned()]
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_compose_file() -> String {
    "docker-compose.yml".to_owned()
}

fn default_shell_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_service_prefix() -> String {
    "mc-".to_owned()
}

fn default_supervisor_endpoint() -> String {
    "http://127.0.0.1:7100".to_owned()
}

fn default_supervisor_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_grace_period() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_console_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_console_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_console_port() -> u16 {
    25575
}

fn default_console_password_env() -> String {
    "RCON_PASSWORD".to_owned()
}

fn default_log_n() -> u8 {
    14
}

fn default_block_size() -> u32 {
    16
}

fn default_parallelism() -> u32 {
    1
}

fn default_key_len() -> usize {
    64
}

fn default_salt_len() -> usize {
    16
}

fn default_docs_directory() -> PathBuf {
    PathBuf::from("docs")
}

/// Smallest salt accepted for new credentials.
pub const MIN_SALT_LEN: usize = 16;
/// Smallest derived key accepted for new credentials.
pub const MIN_KEY_LEN: usize = 32;

/// Primary configuration object for mcctl.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub docs: DocsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "MCCTL_CONFIG";

    /// Load the first configuration found, falling back to defaults when none exists.
    ///
    /// An explicit `MCCTL_CONFIG` path must exist; a missing file there is an error.
    pub fn load_or_default<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!("no configuration file found; using built-in defaults");
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.shell.validate()?;
        self.supervisor.validate()?;
        self.lifecycle.validate()?;
        self.credentials.validate()?;
        if self.console.timeout.is_zero() {
            return Err(anyhow!("console.timeout_secs must be greater than zero"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Location of the embedded metadata store.
///
/// The file is opened per operation; `lock_wait` bounds how long an operation
/// waits for another process to release it.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "lock_wait_ms", default = "default_lock_wait")]
    pub lock_wait: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            lock_wait: default_lock_wait(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
    /// Actor recorded for operations issued from this host.
    #[serde(default = "default_audit_actor")]
    pub actor: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
            actor: default_audit_actor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Compose CLI invocation settings for shell-managed instances.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_compose_binary")]
    pub compose_binary: String,
    /// Leading arguments placed before every compose subcommand.
    #[serde(default = "default_compose_args")]
    pub compose_args: Vec<String>,
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    #[serde(default = "default_compose_file")]
    pub compose_file: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "timeout_secs", default = "default_shell_timeout")]
    pub timeout: Duration,
    #[serde(default = "default_service_prefix")]
    pub service_prefix: String,
}

impl ShellConfig {
    fn validate(&self) -> Result<()> {
        if self.compose_binary.trim().is_empty() {
            return Err(anyhow!("shell.compose_binary must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("shell.timeout_secs must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            compose_binary: default_compose_binary(),
            compose_args: default_compose_args(),
            project_dir: default_project_dir(),
            compose_file: default_compose_file(),
            timeout: default_shell_timeout(),
            service_prefix: default_service_prefix(),
        }
    }
}

/// Control API of the always-on process supervisor.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_supervisor_endpoint")]
    pub endpoint: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "request_timeout_secs", default = "default_supervisor_timeout")]
    pub request_timeout: Duration,
    #[serde(default = "default_service_prefix")]
    pub process_prefix: String,
}

impl SupervisorConfig {
    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.endpoint)
            .with_context(|| format!("supervisor.endpoint '{}' is not a URL", self.endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "supervisor.endpoint must use http or https, found '{}'",
                url.scheme()
            ));
        }
        Ok(())
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_supervisor_endpoint(),
            request_timeout: default_supervisor_timeout(),
            process_prefix: default_service_prefix(),
        }
    }
}

/// Two-phase shutdown timing shared by every service manager.
#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "grace_period_secs", default = "default_grace_period")]
    pub grace_period: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "poll_interval_ms", default = "default_poll_interval")]
    pub poll_interval: Duration,
}

impl LifecycleConfig {
    fn validate(&self) -> Result<()> {
        if self.grace_period.is_zero() {
            return Err(anyhow!("lifecycle.grace_period_secs must be greater than zero"));
        }
        if self.poll_interval.is_zero() || self.poll_interval >= self.grace_period {
            return Err(anyhow!(
                "lifecycle.poll_interval_ms must be non-zero and shorter than the grace period"
            ));
        }
        Ok(())
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            poll_interval: default_poll_interval(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "timeout_secs", default = "default_console_timeout")]
    pub timeout: Duration,
    #[serde(default = "default_console_host")]
    pub default_host: String,
    #[serde(default = "default_console_port")]
    pub default_port: u16,
    /// Environment variable consulted when an instance has no stored console password.
    #[serde(default = "default_console_password_env")]
    pub password_env: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            timeout: default_console_timeout(),
            default_host: default_console_host(),
            default_port: default_console_port(),
            password_env: default_console_password_env(),
        }
    }
}

/// scrypt cost parameters applied to newly registered credentials.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialConfig {
    #[serde(default = "default_log_n")]
    pub log_n: u8,
    #[serde(default = "default_block_size")]
    pub r: u32,
    #[serde(default = "default_parallelism")]
    pub p: u32,
    #[serde(default = "default_key_len")]
    pub key_len: usize,
    #[serde(default = "default_salt_len")]
    pub salt_len: usize,
}

impl CredentialConfig {
    fn validate(&self) -> Result<()> {
        if self.salt_len < MIN_SALT_LEN {
            return Err(anyhow!(
                "credentials.salt_len must be at least {MIN_SALT_LEN} bytes"
            ));
        }
        if self.key_len < MIN_KEY_LEN || self.key_len > 64 {
            return Err(anyhow!(
                "credentials.key_len must be between {MIN_KEY_LEN} and 64 bytes"
            ));
        }
        if self.log_n == 0 || self.r == 0 || self.p == 0 {
            return Err(anyhow!("credentials cost parameters must be non-zero"));
        }
        Ok(())
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            log_n: default_log_n(),
            r: default_block_size(),
            p: default_parallelism(),
            key_len: default_key_len(),
            salt_len: default_salt_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    #[serde(default = "default_docs_directory")]
    pub directory: PathBuf,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            directory: default_docs_directory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::tempdir;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_str("").unwrap();
        assert_eq!(config.shell.compose_binary, "docker");
        assert_eq!(config.shell.timeout, Duration::from_secs(60));
        assert_eq!(config.lifecycle.grace_period, Duration::from_secs(30));
        assert_eq!(config.lifecycle.poll_interval, Duration::from_millis(500));
        assert_eq!(config.console.default_port, 25575);
        assert_eq!(config.credentials.log_n, 14);
        assert_eq!(config.audit.actor, "cli:local");
        assert_eq!(config.storage.lock_wait, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_str(
            r#"
            [shell]
            compose_binary = "podman"
            compose_args = []
            timeout_secs = 15

            [lifecycle]
            grace_period_secs = 5
            poll_interval_ms = 100

            [supervisor]
            endpoint = "https://supervisor.internal:7100"
            "#,
        )
        .unwrap();
        assert_eq!(config.shell.compose_binary, "podman");
        assert!(config.shell.compose_args.is_empty());
        assert_eq!(config.shell.timeout, Duration::from_secs(15));
        assert_eq!(config.lifecycle.grace_period, Duration::from_secs(5));
        assert_eq!(config.lifecycle.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn rejects_poll_interval_longer_than_grace() {
        let err = AppConfig::from_str(
            r#"
            [lifecycle]
            grace_period_secs = 1
            poll_interval_ms = 2000
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn rejects_short_salt() {
        let err = AppConfig::from_str("[credentials]\nsalt_len = 8\n").unwrap_err();
        assert!(err.to_string().contains("salt_len"));
    }

    #[test]
    fn rejects_non_http_supervisor_endpoint() {
        let unix = "[supervisor]\nendpoint = \"unix:///run/sup.sock\"\n";
        assert!(AppConfig::from_str(unix).is_err());
    }

    #[test]
    fn load_falls_back_to_defaults_without_candidates() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let loaded = AppConfig::load_or_default(&[missing]).unwrap();
        assert!(loaded.source.is_none());
    }

    #[test]
    fn load_picks_first_existing_candidate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mcctl.toml");
        let body = "[storage]\npath = \"/srv/mc/state.redb\"\nlock_wait_ms = 2500\n";
        fs::write(&path, body).unwrap();
        let loaded = AppConfig::load_or_default(&[dir.path().join("nope.toml"), path.clone()])
            .unwrap();
        assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.storage.path, PathBuf::from("/srv/mc/state.redb"));
        assert_eq!(loaded.config.storage.lock_wait, Duration::from_millis(2500));
    }
}
