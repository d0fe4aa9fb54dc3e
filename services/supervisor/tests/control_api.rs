//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "tests"
//! mcctl_type: "source"
//! mcctl_scope: "test"
//! mcctl_description: "Drives the supervisor over HTTP with the orchestrator's client."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
#![cfg(unix)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mcctl_common::supervisor::{ProcessState, SignalKind};
use mcctl_common::{LifecycleConfig, SupervisorConfig};
use mcctl_orchestrator::{
    HttpSupervisorClient, LifecycleStatus, ServiceError, ServiceManager, SupervisorClient,
    SupervisorServiceManager,
};
use mcctl_supervisor::{router, ProcessTable, ProgramConfig};
use tokio::net::TcpListener;

fn program(name: &str, script: &str) -> ProgramConfig {
    ProgramConfig {
        name: name.to_owned(),
        command: "sh".to_owned(),
        args: vec!["-c".to_owned(), script.to_owned()],
        cwd: None,
        env: BTreeMap::new(),
        autostart: false,
    }
}

async fn serve(programs: Vec<ProgramConfig>) -> (String, Arc<ProcessTable>) {
    let table = Arc::new(ProcessTable::new(programs, Duration::from_millis(500)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(table.clone());
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    (format!("http://{addr}"), table)
}

fn client(endpoint: &str) -> HttpSupervisorClient {
    HttpSupervisorClient::new(&SupervisorConfig {
        endpoint: endpoint.to_owned(),
        request_timeout: Duration::from_secs(5),
        ..SupervisorConfig::default()
    })
    .unwrap()
}

fn timing() -> LifecycleConfig {
    LifecycleConfig {
        grace_period: Duration::from_millis(600),
        poll_interval: Duration::from_millis(30),
    }
}

#[tokio::test]
async fn lifecycle_through_the_service_manager() {
    let (endpoint, table) = serve(vec![program("mc-survival-1", "exec sleep 30")]).await;
    let manager = SupervisorServiceManager::new(Arc::new(client(&endpoint)), "mc-", timing());

    assert_eq!(manager.status("survival-1").await.unwrap(), LifecycleStatus::Stopped);
    assert_eq!(manager.start("survival-1").await.unwrap(), LifecycleStatus::Running);
    assert_eq!(manager.start("survival-1").await.unwrap(), LifecycleStatus::Running);

    let report = manager.stop("survival-1", true).await.unwrap();
    assert_eq!(report.final_status, LifecycleStatus::Stopped);
    assert!(!report.escalated);
    assert!(table.describe("mc-survival-1").unwrap().pid.is_none());

    // unregistered names read as stopped
    assert_eq!(manager.status("creative").await.unwrap(), LifecycleStatus::Stopped);
}

#[tokio::test]
async fn stubborn_process_is_escalated() {
    let (endpoint, _table) = serve(vec![program(
        "mc-stubborn",
        "trap '' TERM; while true; do sleep 1; done",
    )])
    .await;
    let manager = SupervisorServiceManager::new(Arc::new(client(&endpoint)), "mc-", timing());

    manager.start("stubborn").await.unwrap();
    let report = manager.stop("stubborn", true).await.unwrap();
    assert!(report.escalated);
    assert!(report.waited >= Duration::from_millis(600));
    assert_eq!(report.final_status, LifecycleStatus::Stopped);
}

#[tokio::test]
async fn unknown_process_and_health() {
    let (endpoint, _table) = serve(vec![program("mc-lobby", "exec sleep 30")]).await;
    let client = client(&endpoint);

    assert!(client.describe("mc-nope").await.unwrap().is_none());
    assert!(matches!(
        client.signal("mc-nope", SignalKind::Term).await,
        Err(ServiceError::NotRegistered(_))
    ));

    let health: serde_json::Value = reqwest::get(format!("{endpoint}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["processes"], 1);
}

#[tokio::test]
async fn restart_endpoint_counts_restarts() {
    let (endpoint, table) = serve(vec![program("mc-lobby", "exec sleep 30")]).await;
    table.start("mc-lobby").unwrap();

    let http = reqwest::Client::new();
    let body: serde_json::Value = http
        .post(format!("{endpoint}/api/processes/mc-lobby/restart"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["state"], "running");
    assert_eq!(body["restarts"], 1);

    let listed: serde_json::Value = http
        .get(format!("{endpoint}/api/processes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed[0]["name"], "mc-lobby");
    table.shutdown().await;
    assert_eq!(table.describe("mc-lobby").unwrap().state, ProcessState::Stopped);
}

#[tokio::test]
async fn offline_daemon_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client = client(&format!("http://{addr}"));
    assert!(matches!(
        client.describe("mc-lobby").await,
        Err(ServiceError::Unreachable(_))
    ));
}
