//! ---
//! mcctl_section: "15-testing-qa-runbook"
//! mcctl_subsection: "integration-test"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Process-backed shell adapter behaviour against real binaries."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
#![cfg(unix)]

use std::time::{Duration, Instant};

use mcctl_shell::{ProcessShell, RunOptions, ShellAdapter, ShellError, SpawnFailureKind};
use tempfile::tempdir;

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_owned(), script.to_owned()]
}

#[tokio::test]
async fn captures_stdout_and_stderr() {
    let result = ProcessShell::new()
        .run("sh", &sh("echo up; echo warn >&2"), &RunOptions::default())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout.trim(), "up");
    assert_eq!(result.stderr.trim(), "warn");
}

#[tokio::test]
async fn nonzero_exit_is_a_result_not_an_error() {
    let result = ProcessShell::new()
        .run("sh", &sh("echo nope >&2; exit 3"), &RunOptions::default())
        .await
        .unwrap();
    assert!(!result.success);
    assert!(!result.timed_out);
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.failure_detail(), "nope");
}

#[tokio::test]
async fn missing_binary_is_spawn_failure() {
    let err = ProcessShell::new()
        .run("mcctl-definitely-missing-binary", &[], &RunOptions::default())
        .await
        .unwrap_err();
    match err {
        ShellError::SpawnFailure { kind, command, .. } => {
            assert_eq!(kind, SpawnFailureKind::NotFound);
            assert_eq!(command, "mcctl-definitely-missing-binary");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn timeout_kills_the_process() {
    let started = Instant::now();
    let result = ProcessShell::new()
        .run(
            "sh",
            &sh("sleep 30"),
            &RunOptions::with_timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();
    assert!(result.timed_out);
    assert!(!result.success);
    assert!(started.elapsed() < Duration::from_secs(5));
}

fn alive(pid: libc::pid_t) -> bool {
    // SAFETY: signal 0 only checks that the pid exists.
    if unsafe { libc::kill(pid, 0) } != 0 {
        return false;
    }
    // an orphaned zombie answers signal 0 until init reaps it
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat
            .rsplit(')')
            .next()
            .is_some_and(|rest| rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}

#[tokio::test]
async fn timeout_also_kills_forked_helpers() {
    let result = ProcessShell::new()
        .run(
            "sh",
            &sh("sleep 30 & echo $!; wait"),
            &RunOptions::with_timeout(Duration::from_millis(300)),
        )
        .await
        .unwrap();
    assert!(result.timed_out);
    let helper: libc::pid_t = result.stdout.trim().parse().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while alive(helper) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!alive(helper), "background sleep {helper} survived the timeout");
}

#[tokio::test]
async fn env_overlay_and_cwd_are_applied() {
    let dir = tempdir().unwrap();
    let options = RunOptions::default()
        .cwd(dir.path())
        .env("COMPOSE_FILE", "docker-compose.yml");
    let result = ProcessShell::new()
        .run("sh", &sh("echo $COMPOSE_FILE; pwd"), &options)
        .await
        .unwrap();
    let mut lines = result.stdout.lines();
    assert_eq!(lines.next(), Some("docker-compose.yml"));
    let reported = std::path::PathBuf::from(lines.next().unwrap());
    assert_eq!(
        reported.canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
}

#[tokio::test]
async fn ambient_environment_is_inherited() {
    let result = ProcessShell::new()
        .run("sh", &sh("test -n \"$PATH\""), &RunOptions::default())
        .await
        .unwrap();
    assert!(result.success);
}
