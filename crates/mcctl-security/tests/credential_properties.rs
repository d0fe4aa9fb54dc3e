//! ---
//! mcctl_section: "15-testing-qa-runbook"
//! mcctl_subsection: "integration-test"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Credential store verification and timing-safety properties."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mcctl_common::CredentialConfig;
use mcctl_persistence::{KdfParams, Store};
use mcctl_security::{CredentialError, CredentialStore, PasswordKdf, ScryptKdf};
use proptest::prelude::*;
use zeroize::Zeroizing;

const CHEAP: CredentialConfig = CredentialConfig {
    log_n: 4,
    r: 8,
    p: 1,
    key_len: 32,
    salt_len: 16,
};

#[derive(Default)]
struct CountingKdf {
    calls: AtomicUsize,
    last: Mutex<Option<KdfParams>>,
}

impl PasswordKdf for CountingKdf {
    fn derive(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(*params);
        ScryptKdf.derive(password, salt, params)
    }
}

fn counting_store() -> (CredentialStore, Arc<CountingKdf>) {
    let kdf = Arc::new(CountingKdf::default());
    let repo = Arc::new(Store::in_memory().unwrap());
    let store = CredentialStore::with_kdf(repo, kdf.clone(), CHEAP);
    (store, kdf)
}

#[test]
fn unknown_user_and_wrong_password_each_derive_once() {
    let (store, kdf) = counting_store();
    store.register("alice", "s3cret!").unwrap();

    let before = kdf.calls.load(Ordering::SeqCst);
    assert!(!store.verify("mallory", "s3cret!").unwrap());
    let after_unknown = kdf.calls.load(Ordering::SeqCst);
    assert!(!store.verify("alice", "wrong").unwrap());
    let after_wrong = kdf.calls.load(Ordering::SeqCst);

    assert_eq!(after_unknown - before, 1);
    assert_eq!(after_wrong - after_unknown, 1);
}

#[test]
fn unknown_user_decoy_costs_what_stored_hashes_cost() {
    let repo = Arc::new(Store::in_memory().unwrap());
    let before = CredentialStore::new(repo.clone(), CHEAP);
    before.register("alice", "s3cret!").unwrap();
    before.register("bob", "hunter22").unwrap();

    let raised = CredentialConfig { log_n: 6, ..CHEAP };
    let kdf = Arc::new(CountingKdf::default());
    let after = CredentialStore::with_kdf(repo, kdf.clone(), raised);
    after.register("carol", "pa55word").unwrap();

    assert!(!after.verify("alice", "wrong").unwrap());
    let known = kdf.last.lock().unwrap().unwrap();
    assert!(!after.verify("mallory", "wrong").unwrap());
    let unknown = kdf.last.lock().unwrap().unwrap();
    assert_eq!(known.log_n, 4);
    assert_eq!(unknown, known);

    let (empty, kdf) = counting_store();
    assert!(!empty.verify("mallory", "wrong").unwrap());
    assert_eq!(kdf.last.lock().unwrap().unwrap().log_n, CHEAP.log_n);
}

#[test]
fn rotation_scenario() {
    let store = CredentialStore::new(Arc::new(Store::in_memory().unwrap()), CHEAP);
    store.register("alice", "s3cret!").unwrap();
    assert!(store.verify("alice", "s3cret!").unwrap());
    assert!(!store.verify("alice", "wrong").unwrap());
    let rotated = store.rotate("alice", "newpass").unwrap();
    assert!(rotated.rotated_at.is_some());
    assert!(!store.verify("alice", "s3cret!").unwrap());
    assert!(store.verify("alice", "newpass").unwrap());
}

fn mutate_one_char(password: &str, index: usize) -> String {
    let mut chars: Vec<char> = password.chars().collect();
    let at = index % chars.len();
    chars[at] = if chars[at] == 'a' { 'b' } else { 'a' };
    chars.into_iter().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn verify_accepts_exact_password_only(password in "[ -~]{1,24}", index in any::<usize>()) {
        let store = CredentialStore::new(Arc::new(Store::in_memory().unwrap()), CHEAP);
        store.register("admin", &password).unwrap();
        prop_assert!(store.verify("admin", &password).unwrap());
        let altered = mutate_one_char(&password, index);
        prop_assert!(!store.verify("admin", &altered).unwrap());
        let extended = format!("{password}x");
        prop_assert!(!store.verify("admin", &extended).unwrap());
    }
}
