//! ---
//! mcctl_section: "15-testing-qa-runbook"
//! mcctl_subsection: "integration-test"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Administrator credentials stored next to instance metadata."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::Result;
use mcctl_orchestrator::{NewInstance, PromptAdapter};
use mcctl_persistence::{BackendKind, Store};
use mcctl_security::{CredentialError, CredentialStore};
use mcctl_testharness::{cheap_credentials, CountingKdf, Harness, RecordingPrompt};

#[test]
fn register_verify_rotate() -> Result<()> {
    let h = Harness::new()?;
    let store = h.credentials();

    let alice = store.register("alice", "s3cret!")?;
    assert_eq!(alice.username, "alice");
    assert!(alice.last_used.is_none());

    assert!(store.verify("alice", "s3cret!")?);
    assert!(!store.verify("alice", "s3cret?")?);

    let rotated = store.rotate("alice", "newpass")?;
    assert!(rotated.rotated_at.is_some());
    assert_eq!(rotated.created_at, alice.created_at);
    assert!(!store.verify("alice", "s3cret!")?);
    assert!(store.verify("alice", "newpass")?);

    let listed = store.list()?;
    assert_eq!(listed.len(), 1);
    assert!(listed[0].last_used.is_some());
    Ok(())
}

#[test]
fn rejected_registrations_are_user_errors() -> Result<()> {
    let h = Harness::new()?;
    let store = h.credentials();
    store.register("alice", "s3cret!")?;

    let duplicate = store.register("alice", "other").unwrap_err();
    assert!(matches!(duplicate, CredentialError::DuplicateUsername(_)));
    assert!(duplicate.is_user_error());

    assert!(matches!(store.register("bob", ""), Err(CredentialError::EmptyPassword)));
    assert!(matches!(store.register("", "pw"), Err(CredentialError::InvalidUsername(_))));
    assert!(matches!(store.rotate("carol", "pw"), Err(CredentialError::NotFound(_))));

    // the first registration is untouched
    assert!(store.verify("alice", "s3cret!")?);
    Ok(())
}

#[test]
fn unknown_user_costs_the_same_derivation_as_a_wrong_password() -> Result<()> {
    let h = Harness::new()?;
    let kdf = Arc::new(CountingKdf::default());
    let store = h.credentials_with(kdf.clone());
    store.register("alice", "s3cret!")?;

    let baseline = kdf.calls();
    assert!(!store.verify("mallory", "s3cret!")?);
    let unknown = kdf.calls() - baseline;

    let baseline = kdf.calls();
    assert!(!store.verify("alice", "wrong")?);
    let wrong = kdf.calls() - baseline;

    assert_eq!(unknown, 1);
    assert_eq!(wrong, 1);
    Ok(())
}

#[test]
fn credentials_share_the_store_with_instances() -> Result<()> {
    let h = Harness::new()?;
    h.orchestrator.create_instance(NewInstance {
        name: "alice".to_owned(),
        backend: BackendKind::ShellManaged,
        config_ref: "alice".to_owned(),
        console: None,
    })?;
    let store = h.credentials();
    store.register("alice", "s3cret!")?;

    // same key in different tables
    assert_eq!(h.orchestrator.get_instance("alice")?.name, "alice");
    assert!(store.verify("alice", "s3cret!")?);
    Ok(())
}

#[test]
fn credentials_survive_reopening_the_store() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("mcctl.redb");
    {
        let store = CredentialStore::new(Arc::new(Store::open(&path)?), cheap_credentials());
        store.register("alice", "s3cret!")?;
    }
    let reopened = CredentialStore::new(Arc::new(Store::open(&path)?), cheap_credentials());
    assert!(reopened.verify("alice", "s3cret!")?);
    Ok(())
}

#[test]
fn prompted_password_feeds_registration() -> Result<()> {
    let h = Harness::new()?;
    let store = h.credentials();
    let prompt = RecordingPrompt::scripted(["hunter2"]);

    let password = prompt.input("Password for 'alice'")?;
    store.register("alice", &password)?;
    assert!(store.verify("alice", "hunter2")?);
    assert_eq!(prompt.asked(), vec!["Password for 'alice'".to_owned()]);

    // a second question with no scripted answer is unavailable, not empty
    assert!(prompt.input("Password again").is_err());
    Ok(())
}
