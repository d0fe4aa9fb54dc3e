//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Shell-managed instances driven through the compose CLI."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::sync::Arc;

use async_trait::async_trait;
use mcctl_common::{CommandExecutionResult, LifecycleConfig, ShellConfig};
use mcctl_persistence::BackendKind;
use mcctl_shell::{RunOptions, ShellAdapter};
use serde::Deserialize;
use mcctl_logging::{mc_debug, mc_error, LogContext};

use crate::error::ServiceError;
use crate::service::{ServiceManager, StopSignal};
use crate::status::LifecycleStatus;

/// Drives instances as compose services named `<service_prefix><instance>`.
pub struct ComposeServiceManager {
    shell: Arc<dyn ShellAdapter>,
    config: ShellConfig,
    timing: LifecycleConfig,
}

const SHELL_BACKEND: &str = "shell-managed";

impl ComposeServiceManager {
    /// Manager issuing compose commands through `shell`.
    pub fn new(shell: Arc<dyn ShellAdapter>, config: ShellConfig, timing: LifecycleConfig) -> Self {
        Self {
            shell,
            config,
            timing,
        }
    }

    /// Compose service backing `instance`.
    pub fn service_name(&self, instance: &str) -> String {
        format!("{}{}", self.config.service_prefix, instance)
    }

    fn options(&self) -> RunOptions {
        RunOptions::with_timeout(self.config.timeout)
            .cwd(&self.config.project_dir)
            .env("COMPOSE_FILE", &self.config.compose_file)
    }

    async fn compose(
        &self,
        action: &str,
        tail: &[&str],
    ) -> Result<CommandExecutionResult, ServiceError> {
        let args: Vec<String> = self
            .config
            .compose_args
            .iter()
            .cloned()
            .chain(tail.iter().map(|arg| (*arg).to_owned()))
            .collect();
        let ctx = LogContext::new()
            .with_backend(SHELL_BACKEND)
            .with_operation(action);
        mc_debug!(context = ctx, "invoking {} {}", self.config.compose_binary, args.join(" "));
        let result = self
            .shell
            .run(&self.config.compose_binary, &args, &self.options())
            .await?;
        if result.timed_out {
            mc_error!(context = ctx, "compose {action} timed out after {:?}", result.elapsed);
            return Err(ServiceError::Timeout {
                action: action.to_owned(),
                elapsed: result.elapsed,
            });
        }
        if !result.success {
            let detail = result.failure_detail();
            if action != "kill" {
                mc_error!(context = ctx, "compose {action} failed: {detail}");
            }
            return Err(ServiceError::CommandFailed {
                action: action.to_owned(),
                detail,
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl ServiceManager for ComposeServiceManager {
    fn kind(&self) -> BackendKind {
        BackendKind::ShellManaged
    }

    fn timing(&self) -> LifecycleConfig {
        self.timing
    }

    async fn status(&self, instance: &str) -> Result<LifecycleStatus, ServiceError> {
        let service = self.service_name(instance);
        let result = self
            .compose("ps", &["ps", "-a", "--format", "json", &service])
            .await?;
        Ok(parse_ps_output(&service, &result.stdout))
    }

    async fn launch(&self, instance: &str) -> Result<(), ServiceError> {
        let service = self.service_name(instance);
        self.compose("up", &["up", "-d", &service]).await?;
        Ok(())
    }

    async fn signal(&self, instance: &str, signal: StopSignal) -> Result<(), ServiceError> {
        let service = self.service_name(instance);
        let name = match signal {
            StopSignal::Terminate => "SIGTERM",
            StopSignal::Kill => "SIGKILL",
        };
        match self.compose("kill", &["kill", "-s", name, &service]).await {
            Ok(_) => Ok(()),
            // compose refuses to signal a container that already exited
            Err(ServiceError::CommandFailed { detail, .. })
                if detail.contains("no container") || detail.contains("is not running") =>
            {
                let ctx = LogContext::lifecycle(instance, SHELL_BACKEND).with_operation("kill");
                mc_debug!(context = ctx, "signal target {service} already gone: {detail}");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PsRow {
    #[serde(rename = "Service", default)]
    service: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Health", default)]
    health: String,
}

impl PsRow {
    fn status(&self) -> LifecycleStatus {
        match self.state.to_ascii_lowercase().as_str() {
            "running" if self.health.eq_ignore_ascii_case("starting") => LifecycleStatus::Starting,
            "running" => LifecycleStatus::Running,
            "restarting" => LifecycleStatus::Starting,
            "removing" => LifecycleStatus::Stopping,
            "exited" | "created" | "paused" => LifecycleStatus::Stopped,
            "dead" => LifecycleStatus::Error,
            _ => LifecycleStatus::Unknown,
        }
    }
}

/// Map `compose ps` output for `service` to a lifecycle status.
///
/// Accepts newline-delimited JSON objects, a JSON array, or the plain table
/// format. No row for the service means the container does not exist.
pub fn parse_ps_output(service: &str, stdout: &str) -> LifecycleStatus {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return LifecycleStatus::Stopped;
    }

    let rows: Option<Vec<PsRow>> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).ok()
    } else if trimmed.starts_with('{') {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<PsRow>(line).ok())
            .collect()
    } else {
        None
    };

    match rows {
        Some(rows) => rows
            .iter()
            .find(|row| row.service == service)
            .or_else(|| rows.iter().find(|row| container_matches(&row.name, service)))
            .map(PsRow::status)
            .unwrap_or(LifecycleStatus::Stopped),
        None => parse_table(service, trimmed),
    }
}

/// True when `name` is the container compose created for `service`.
///
/// Container names are `service`, `project-service-N` or `project_service_N`;
/// a bare prefix match would confuse `mc-survival-1` with `mc-survival-10`.
fn container_matches(name: &str, service: &str) -> bool {
    if name == service {
        return true;
    }
    let Some(cut) = name.rfind(['-', '_']) else {
        return false;
    };
    let replica = &name[cut + 1..];
    if replica.is_empty() || !replica.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let base = &name[..cut];
    base == service
        || base
            .strip_suffix(service)
            .is_some_and(|project| project.ends_with(['-', '_']))
}

fn parse_table(service: &str, text: &str) -> LifecycleStatus {
    let Some(line) = text.lines().find(|line| {
        line.split_whitespace()
            .any(|word| word == service || container_matches(word, service))
    }) else {
        return LifecycleStatus::Stopped;
    };
    let lower = line.to_ascii_lowercase();
    if lower.contains("(health: starting)") || lower.contains("restarting") {
        LifecycleStatus::Starting
    } else if line.contains("Up") || lower.contains("running") {
        LifecycleStatus::Running
    } else if line.contains("Exit") || lower.contains("exited") || lower.contains("created") {
        LifecycleStatus::Stopped
    } else if lower.contains("dead") {
        LifecycleStatus::Error
    } else {
        LifecycleStatus::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mcctl_shell::ShellError;
    use parking_lot::Mutex;

    #[test]
    fn ndjson_rows() {
        let out = concat!(
            r#"{"Name":"mc-lobby-1","Service":"mc-lobby","State":"running","Health":""}"#,
            "\n",
            r#"{"Name":"mc-survival-1-1","Service":"mc-survival-1","State":"exited"}"#,
        );
        assert_eq!(parse_ps_output("mc-lobby", out), LifecycleStatus::Running);
        assert_eq!(parse_ps_output("mc-survival-1", out), LifecycleStatus::Stopped);
        assert_eq!(parse_ps_output("mc-creative", out), LifecycleStatus::Stopped);
    }

    #[test]
    fn json_array_with_health() {
        let out = r#"[{"Service":"mc-lobby","State":"running","Health":"starting"}]"#;
        assert_eq!(parse_ps_output("mc-lobby", out), LifecycleStatus::Starting);
        let out = r#"[{"Service":"mc-lobby","State":"dead"}]"#;
        assert_eq!(parse_ps_output("mc-lobby", out), LifecycleStatus::Error);
    }

    #[test]
    fn table_fallback() {
        let out = concat!(
            "NAME          COMMAND   SERVICE    STATUS\n",
            "mc-lobby-1    \"/start\"  mc-lobby   Up 2 minutes\n",
        );
        assert_eq!(parse_ps_output("mc-lobby", out), LifecycleStatus::Running);
        let out = "mc-lobby-1  mc-lobby  Exit 137";
        assert_eq!(parse_ps_output("mc-lobby", out), LifecycleStatus::Stopped);
        assert_eq!(parse_ps_output("mc-lobby", ""), LifecycleStatus::Stopped);
    }

    #[test]
    fn numbered_services_do_not_shadow_each_other() {
        let out = concat!(
            r#"{"Name":"mc-survival-10-1","Service":"","State":"running"}"#,
            "\n",
            r#"{"Name":"stack_mc-survival-1_1","Service":"","State":"exited"}"#,
        );
        assert_eq!(parse_ps_output("mc-survival-1", out), LifecycleStatus::Stopped);
        assert_eq!(parse_ps_output("mc-survival-10", out), LifecycleStatus::Running);
        let out = r#"{"Name":"mc-survival-10-1","Service":"","State":"running"}"#;
        assert_eq!(parse_ps_output("mc-survival-1", out), LifecycleStatus::Stopped);

        let table = "mc-survival-10-1  mc-survival-10  Up 5 minutes\n";
        assert_eq!(parse_ps_output("mc-survival-1", table), LifecycleStatus::Stopped);
        assert_eq!(parse_ps_output("mc-survival-10", table), LifecycleStatus::Running);

        assert!(container_matches("mc-lobby", "mc-lobby"));
        assert!(container_matches("mc-lobby-2", "mc-lobby"));
        assert!(container_matches("proj-mc-lobby-1", "mc-lobby"));
        assert!(!container_matches("mc-lobby-backup-1", "mc-lobby"));
        assert!(!container_matches("mc-lobby-", "mc-lobby"));
    }

    #[test]
    fn log_label_matches_backend_kind() {
        assert_eq!(BackendKind::ShellManaged.to_string(), SHELL_BACKEND);
    }

    struct ScriptedShell {
        calls: Mutex<Vec<(String, Vec<String>, RunOptions)>>,
        reply: CommandExecutionResult,
    }

    #[async_trait]
    impl ShellAdapter for ScriptedShell {
        async fn run(
            &self,
            command: &str,
            args: &[String],
            options: &RunOptions,
        ) -> Result<CommandExecutionResult, ShellError> {
            self.calls
                .lock()
                .push((command.to_owned(), args.to_vec(), options.clone()));
            Ok(self.reply.clone())
        }
    }

    fn manager(reply: CommandExecutionResult) -> (ComposeServiceManager, Arc<ScriptedShell>) {
        let shell = Arc::new(ScriptedShell {
            calls: Mutex::new(Vec::new()),
            reply,
        });
        let manager = ComposeServiceManager::new(
            shell.clone(),
            ShellConfig::default(),
            LifecycleConfig::default(),
        );
        (manager, shell)
    }

    #[tokio::test]
    async fn launch_uses_compose_file_and_project_dir() {
        let (manager, shell) = manager(CommandExecutionResult::completed(
            Some(0),
            String::new(),
            String::new(),
            Duration::from_millis(5),
        ));
        manager.launch("survival-1").await.unwrap();
        let calls = shell.calls.lock();
        let (binary, args, options) = &calls[0];
        assert_eq!(binary, "docker");
        assert_eq!(args, &["compose", "up", "-d", "mc-survival-1"]);
        assert_eq!(options.env["COMPOSE_FILE"], "docker-compose.yml");
        assert_eq!(options.timeout, Duration::from_secs(60));
        assert!(options.cwd.is_some());
    }

    #[tokio::test]
    async fn nonzero_exit_is_command_failure() {
        let (manager, _) = manager(CommandExecutionResult::completed(
            Some(1),
            String::new(),
            "service \"mc-x\" has no build section".into(),
            Duration::from_millis(5),
        ));
        let err = manager.launch("x").await.unwrap_err();
        assert!(matches!(err, ServiceError::CommandFailed { ref action, .. } if action == "up"));
    }

    #[tokio::test]
    async fn timed_out_invocation_is_timeout() {
        let (manager, _) = manager(CommandExecutionResult::timed_out(
            String::new(),
            String::new(),
            Duration::from_secs(60),
        ));
        let err = manager.status("x").await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout { .. }));
    }

    #[tokio::test]
    async fn signalling_an_exited_container_is_not_an_error() {
        let (manager, shell) = manager(CommandExecutionResult::completed(
            Some(1),
            String::new(),
            "no container to kill".into(),
            Duration::from_millis(5),
        ));
        manager.signal("x", StopSignal::Kill).await.unwrap();
        assert_eq!(
            shell.calls.lock()[0].1,
            vec!["compose", "kill", "-s", "SIGKILL", "mc-x"]
        );
    }
}
