//! ---
//! mcctl_section: "15-testing-qa-runbook"
//! mcctl_subsection: "integration-test"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "World save records and remote console sessions over the harness."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use anyhow::Result;
use mcctl_orchestrator::{DeleteRequest, ErrorKind, NewInstance, NewWorld, OrchestratorError};
use mcctl_persistence::{BackendKind, ConsoleEndpoint};
use mcctl_security::{AuditAction, AuditFilter};
use mcctl_testharness::Harness;

fn create(h: &Harness, name: &str) -> Result<()> {
    h.orchestrator.create_instance(NewInstance {
        name: name.to_owned(),
        backend: BackendKind::ShellManaged,
        config_ref: format!("{name}.yml"),
        console: None,
    })?;
    Ok(())
}

fn world(id: &str, instance: &str) -> NewWorld {
    NewWorld {
        id: id.to_owned(),
        instance: instance.to_owned(),
        location: format!("/srv/minecraft/{id}").into(),
        size_bytes: 4096,
    }
}

#[tokio::test]
async fn deleting_an_instance_leaves_its_worlds_dangling() -> Result<()> {
    let h = Harness::new()?;
    create(&h, "survival-1")?;
    h.orchestrator.create_world(world("overworld", "survival-1"))?;

    let report = h
        .orchestrator
        .delete_instance(
            "survival-1",
            DeleteRequest { confirmed: true, ..DeleteRequest::default() },
        )
        .await?;
    assert_eq!(report.orphaned_worlds, vec!["overworld".to_owned()]);
    assert!(report.removed_worlds.is_empty());

    let views = h.orchestrator.list_worlds(None)?;
    assert_eq!(views.len(), 1);
    assert!(views[0].dangling);
    assert_eq!(views[0].world.instance, "survival-1");

    // a dangling world can be rehomed once a new parent exists
    create(&h, "survival-2")?;
    let moved = h.orchestrator.assign_world("overworld", "survival-2")?;
    assert_eq!(moved.instance, "survival-2");
    assert!(!h.orchestrator.list_worlds(None)?[0].dangling);
    Ok(())
}

#[tokio::test]
async fn cascading_delete_removes_worlds() -> Result<()> {
    let h = Harness::new()?;
    create(&h, "lobby")?;
    create(&h, "creative")?;
    h.orchestrator.create_world(world("hub", "lobby"))?;
    h.orchestrator.create_world(world("plots", "creative"))?;

    let report = h
        .orchestrator
        .delete_instance(
            "lobby",
            DeleteRequest {
                confirmed: true,
                force: false,
                cascade_worlds: true,
            },
        )
        .await?;
    assert_eq!(report.removed_worlds, vec!["hub".to_owned()]);

    let remaining: Vec<String> = h
        .orchestrator
        .list_worlds(None)?
        .into_iter()
        .map(|view| view.world.id)
        .collect();
    assert_eq!(remaining, vec!["plots".to_owned()]);
    Ok(())
}

#[test]
fn world_rules() -> Result<()> {
    let h = Harness::new()?;
    create(&h, "lobby")?;

    let orphan = h.orchestrator.create_world(world("hub", "missing")).unwrap_err();
    assert_eq!(orphan.kind(), ErrorKind::NotFound);

    h.orchestrator.create_world(world("hub", "lobby"))?;
    let duplicate = h.orchestrator.create_world(world("hub", "lobby")).unwrap_err();
    assert_eq!(duplicate.kind(), ErrorKind::DuplicateId);

    let bad = h.orchestrator.create_world(world("../hub", "lobby")).unwrap_err();
    assert_eq!(bad.kind(), ErrorKind::InvalidInput);

    let unmoved = h.orchestrator.assign_world("hub", "nowhere").unwrap_err();
    assert!(matches!(unmoved, OrchestratorError::NotFound { .. }));
    assert_eq!(h.orchestrator.list_worlds(Some("lobby"))?.len(), 1);

    assert!(matches!(
        h.orchestrator.delete_world("hub", false),
        Err(OrchestratorError::ConfirmationRequired(_))
    ));
    let deleted = h.orchestrator.delete_world("hub", true)?;
    assert_eq!(deleted.size_bytes, 4096);
    assert!(h.orchestrator.list_worlds(None)?.is_empty());

    let audited = h.audit.query(&AuditFilter {
        action: Some(AuditAction::WorldDelete),
        ..AuditFilter::default()
    })?;
    assert_eq!(audited.len(), 2);
    Ok(())
}

#[tokio::test]
async fn console_commands_reach_running_instances_only() -> Result<()> {
    let h = Harness::new()?;
    create(&h, "lobby")?;
    h.console.reply("list", "There are 0 of a max of 20 players online:");

    let idle = h.orchestrator.console_command("lobby", "list").await.unwrap_err();
    assert_eq!(idle.kind(), ErrorKind::InvalidState);
    assert!(h.console.received().is_empty());

    h.orchestrator.start_instance("lobby").await?;
    let result = h.orchestrator.console_command("lobby", "list").await?;
    assert_eq!(result.stdout, "There are 0 of a max of 20 players online:");
    assert_eq!(
        h.console.received(),
        vec![("127.0.0.1:25575".to_owned(), "list".to_owned())]
    );

    h.console.refuse();
    let refused = h.orchestrator.console_command("lobby", "list").await.unwrap_err();
    assert_eq!(refused.kind(), ErrorKind::ConnectionRefused);
    Ok(())
}

#[tokio::test]
async fn instance_console_endpoint_overrides_the_default() -> Result<()> {
    let h = Harness::new()?;
    h.orchestrator.create_instance(NewInstance {
        name: "creative".to_owned(),
        backend: BackendKind::ShellManaged,
        config_ref: "creative.yml".to_owned(),
        console: Some(ConsoleEndpoint {
            host: "10.0.0.7".to_owned(),
            port: 25580,
            password: Some("not-the-default".to_owned()),
        }),
    })?;
    h.orchestrator.start_instance("creative").await?;

    let err = h.orchestrator.console_command("creative", "say hi").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);

    h.orchestrator.create_instance(NewInstance {
        name: "survival".to_owned(),
        backend: BackendKind::ShellManaged,
        config_ref: "survival.yml".to_owned(),
        console: Some(ConsoleEndpoint {
            host: "10.0.0.8".to_owned(),
            port: 25581,
            password: None,
        }),
    })?;
    h.orchestrator.start_instance("survival").await?;
    h.orchestrator.console_command("survival", "say hi").await?;
    assert_eq!(
        h.console.received(),
        vec![("10.0.0.8:25581".to_owned(), "say hi".to_owned())]
    );
    Ok(())
}
