//! ---
//! mcctl_section: "15-testing-qa-runbook"
//! mcctl_subsection: "integration-test"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Property checks for repository create/get and ordering."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use mcctl_persistence::{
    BackendKind, ConsoleEndpoint, CredentialPatch, CredentialRepository, CredentialSecret,
    KdfParams, ServerInstance, ServerRepository, Store, StoredCredential, WorldRepository,
    WorldSave,
};
use proptest::prelude::*;
use tempfile::tempdir;

fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800, 0u32..1_000_000_000)
        .prop_map(|(secs, nanos)| Utc.timestamp_opt(secs, nanos).single().unwrap_or_default())
}

fn backend() -> impl Strategy<Value = BackendKind> {
    prop_oneof![
        Just(BackendKind::ShellManaged),
        Just(BackendKind::SupervisorManaged)
    ]
}

fn console() -> impl Strategy<Value = Option<ConsoleEndpoint>> {
    proptest::option::of(
        ("[a-z0-9.]{1,24}", any::<u16>(), proptest::option::of("[ -~]{0,32}")).prop_map(
            |(host, port, password)| ConsoleEndpoint {
                host,
                port,
                password,
            },
        ),
    )
}

prop_compose! {
    fn server_instance()(
        name in "[a-zA-Z0-9][a-zA-Z0-9_-]{0,63}",
        backend in backend(),
        config_ref in "[ -~]{0,64}",
        console in console(),
        settings in proptest::collection::vec(("[A-Z_]{1,12}", "[ -~]{0,16}"), 0..4),
        created_at in timestamp(),
    ) -> ServerInstance {
        let settings = settings.into_iter().collect();
        ServerInstance { name, backend, config_ref, console, settings, created_at }
    }
}

prop_compose! {
    fn world_save()(
        id in "[a-z0-9-]{1,32}",
        instance in "[a-z0-9-]{1,32}",
        location in "/[a-z0-9/_-]{0,48}",
        size_bytes in any::<u64>(),
        last_modified in timestamp(),
        locked_by in proptest::option::of("[a-z0-9-]{1,32}"),
    ) -> WorldSave {
        WorldSave {
            id,
            instance,
            location: PathBuf::from(location),
            size_bytes,
            last_modified,
            locked_by,
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn server_instance_round_trips(record in server_instance()) {
        let store = Store::in_memory().unwrap();
        let repo: &dyn ServerRepository = &store;
        let created = repo.create(record.clone()).unwrap();
        prop_assert_eq!(repo.get(&created.name).unwrap(), Some(record));
    }

    #[test]
    fn world_save_round_trips(record in world_save()) {
        let store = Store::in_memory().unwrap();
        let repo: &dyn WorldRepository = &store;
        let created = repo.create(record.clone()).unwrap();
        prop_assert_eq!(repo.get(&created.id).unwrap(), Some(record));
    }

    #[test]
    fn list_matches_creation_order(names in proptest::collection::hash_set("[a-z]{1,12}", 1..16)) {
        let names: Vec<String> = names.into_iter().collect();
        let store = Store::in_memory().unwrap();
        let repo: &dyn ServerRepository = &store;
        for name in &names {
            repo.create(ServerInstance {
                name: name.clone(),
                backend: BackendKind::ShellManaged,
                config_ref: String::new(),
                console: None,
                settings: Default::default(),
                created_at: Utc::now(),
            })
            .unwrap();
        }
        let listed: Vec<String> = repo.list().unwrap().map(|i| i.name).collect();
        prop_assert_eq!(listed, names);
    }
}

#[test]
fn credential_secret_replacement_is_atomic_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mcctl.redb");
    let params = KdfParams {
        log_n: 10,
        r: 8,
        p: 1,
        key_len: 32,
    };
    let original = StoredCredential {
        username: "alice".into(),
        secret: CredentialSecret {
            salt: vec![1; 16],
            hash: vec![2; 32],
            params,
        },
        created_at: Utc::now(),
        last_used: None,
        rotated_at: None,
    };
    let rotated_secret = CredentialSecret {
        salt: vec![3; 16],
        hash: vec![4; 32],
        params,
    };
    {
        let store = Store::open(&path).unwrap();
        let repo: &dyn CredentialRepository = &store;
        repo.create(original.clone()).unwrap();
        repo.update(
            "alice",
            CredentialPatch {
                secret: Some((rotated_secret.clone(), Utc::now())),
                last_used: None,
            },
        )
        .unwrap();
    }
    let store = Store::open(&path).unwrap();
    let repo: &dyn CredentialRepository = &store;
    let reloaded = repo.get("alice").unwrap().unwrap();
    assert_eq!(reloaded.secret, rotated_secret);
    assert!(reloaded.rotated_at.is_some());
    assert_eq!(reloaded.created_at, original.created_at);
}
