//! End-to-end flow scenarios against the in-memory providers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::timeout;

use onboard_flow::error::ProviderError;
use onboard_flow::flow::{
    ActionName, FlowCompletion, FlowKind, FlowListener, KeyComparison, KeyEncoding, Orchestrator,
    ProfileFields, PublicKey, SessionStatus, Step, compare_keys,
};
use onboard_flow::providers::memory::new_secret_key;
use onboard_flow::providers::{
    AuthMethod, AuthenticatedKey, GeneratedIdentity, InMemoryKeyProvider, InMemoryLegacyProvider,
    KeyIdentityProvider, KeyOp, LegacyOp, LegacyUser, LinkProof, LinkedIdentity, Providers,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);
const EMAIL: &str = "ada@example.com";
const PASSWORD: &str = "correct horse";

struct Harness {
    legacy: Arc<InMemoryLegacyProvider>,
    keys: Arc<InMemoryKeyProvider>,
    flow: Arc<Orchestrator>,
}

fn password(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

fn harness(kind: FlowKind) -> Harness {
    let legacy = InMemoryLegacyProvider::new();
    let keys = InMemoryKeyProvider::new();
    let providers = Providers::new(legacy.clone(), keys.clone());
    let flow = Arc::new(Orchestrator::new(kind, providers).unwrap());
    Harness { legacy, keys, flow }
}

/// Migration harness with one registered legacy account.
async fn migration() -> (Harness, LegacyUser) {
    let h = harness(FlowKind::LegacyMigration);
    let user = h.legacy.register_account(EMAIL, PASSWORD).await;
    (h, user)
}

async fn wait_until_loading(flow: &Orchestrator, action: ActionName) {
    timeout(TEST_TIMEOUT, async {
        while !flow.is_loading(action).await {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("action never started");
}

#[derive(Default)]
struct Recorder {
    completions: Mutex<Vec<FlowCompletion>>,
}

impl FlowListener for Recorder {
    fn on_complete(&self, completion: &FlowCompletion) {
        self.completions.lock().unwrap().push(completion.clone());
    }
}

// ── Action independence ─────────────────────────────────────────────────

#[tokio::test]
async fn failed_action_leaves_sibling_action_untouched() {
    let (h, _) = migration().await;

    h.flow.continue_with_existing_session().await.unwrap();
    assert_eq!(h.flow.current_step().await, Step::LegacyAuth);
    let continue_error = h
        .flow
        .get_error(ActionName::ContinueWithExistingSession)
        .await
        .expect("no existing session should fail");
    assert!(!h.flow.is_loading(ActionName::AuthenticateWithLegacyProvider).await);
    assert!(h.flow.get_error(ActionName::AuthenticateWithLegacyProvider).await.is_none());

    h.flow
        .authenticate_with_legacy_provider(EMAIL, password("wrong"))
        .await
        .unwrap();
    let auth_error = h
        .flow
        .get_error(ActionName::AuthenticateWithLegacyProvider)
        .await
        .unwrap();
    assert_eq!(auth_error.message, "Invalid credentials");
    assert_eq!(
        h.flow.get_error(ActionName::ContinueWithExistingSession).await,
        Some(continue_error)
    );
    assert!(!h.flow.is_loading(ActionName::ContinueWithExistingSession).await);
}

// ── Single flight ───────────────────────────────────────────────────────

#[tokio::test]
async fn second_invoke_while_pending_is_a_no_op() {
    let (h, _) = migration().await;
    let gate = h.legacy.pause(LegacyOp::Authenticate).await;

    let first = tokio::spawn({
        let flow = Arc::clone(&h.flow);
        async move {
            flow.authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
                .await
        }
    });
    wait_until_loading(&h.flow, ActionName::AuthenticateWithLegacyProvider).await;

    h.flow.continue_with_existing_session().await.unwrap();
    h.flow
        .authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
        .await
        .unwrap();
    assert_eq!(h.legacy.calls(LegacyOp::CurrentSession).await, 0);
    assert_eq!(h.legacy.calls(LegacyOp::Authenticate).await, 1);
    assert!(!h.flow.is_loading(ActionName::ContinueWithExistingSession).await);
    assert!(!h.flow.can_go_back().await);
    assert!(!h.flow.go_back().await);

    gate.notify_one();
    timeout(TEST_TIMEOUT, first).await.unwrap().unwrap().unwrap();

    // Zero links: the entry check runs and routes straight to profile setup.
    assert_eq!(h.flow.current_step().await, Step::ProfileSetup);
    assert_eq!(h.legacy.calls(LegacyOp::Authenticate).await, 1);
}

// ── Back navigation ─────────────────────────────────────────────────────

#[tokio::test]
async fn go_back_restores_each_prior_snapshot() {
    let h = harness(FlowKind::Signup);

    let initial = h.flow.data().await;
    h.flow.generate_identity().await.unwrap();
    let before_ack = h.flow.data().await;
    assert!(before_ack.identity.is_some());
    h.flow.acknowledge_backup().await.unwrap();
    assert_eq!(h.flow.current_step().await, Step::ProfileSetup);

    assert!(h.flow.go_back().await);
    assert_eq!(h.flow.current_step().await, Step::KeyBackup);
    assert_eq!(h.flow.data().await, before_ack);

    assert!(h.flow.go_back().await);
    assert_eq!(h.flow.current_step().await, Step::KeySetup);
    assert_eq!(h.flow.data().await, initial);
    assert!(h.flow.data().await.identity.is_none());

    assert!(!h.flow.can_go_back().await);
    assert!(!h.flow.go_back().await);
}

#[tokio::test]
async fn complete_step_is_irreversible() {
    let h = harness(FlowKind::Signup);
    h.flow.generate_identity().await.unwrap();
    h.flow.acknowledge_backup().await.unwrap();
    h.flow
        .complete_profile(ProfileFields {
            name: Some("ada".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(h.flow.current_step().await, Step::Complete);
    assert!(!h.flow.can_go_back().await);
    assert!(!h.flow.go_back().await);
    assert_eq!(h.flow.current_step().await, Step::Complete);
}

#[tokio::test]
async fn go_back_keeps_action_errors() {
    let (h, _) = migration().await;
    h.flow.send_passwordless_link(EMAIL).await.unwrap();
    h.flow
        .complete_passwordless_link("https://auth.invalid/link/forged")
        .await
        .unwrap();
    assert_eq!(h.flow.current_step().await, Step::EmailSent);
    assert!(h.flow.get_error(ActionName::CompletePasswordlessLink).await.is_some());

    assert!(h.flow.go_back().await);
    assert_eq!(h.flow.current_step().await, Step::LegacyAuth);
    assert!(h.flow.data().await.pending_email.is_none());
    assert!(h.flow.get_error(ActionName::CompletePasswordlessLink).await.is_some());
}

#[tokio::test]
async fn passwordless_migration_back_through_every_step() {
    let (h, _) = migration().await;
    let initial = h.flow.data().await;

    h.flow.send_passwordless_link(EMAIL).await.unwrap();
    let at_email_sent = h.flow.data().await;
    let link = h.legacy.issued_link(EMAIL).await.unwrap();
    h.flow.complete_passwordless_link(link).await.unwrap();
    assert_eq!(h.flow.current_step().await, Step::ProfileSetup);
    assert_eq!(h.flow.data().await.linked_identities, Some(vec![]));

    assert!(h.flow.go_back().await);
    assert_eq!(h.flow.current_step().await, Step::CheckingLinks);
    assert!(h.flow.data().await.legacy_user.is_some());
    assert!(h.flow.data().await.linked_identities.is_none());

    assert!(h.flow.go_back().await);
    assert_eq!(h.flow.current_step().await, Step::EmailSent);
    assert_eq!(h.flow.data().await, at_email_sent);

    assert!(h.flow.go_back().await);
    assert_eq!(h.flow.current_step().await, Step::LegacyAuth);
    assert_eq!(h.flow.data().await, initial);
    assert!(!h.flow.go_back().await);
}

// ── Key canonicalization ────────────────────────────────────────────────

#[test]
fn same_key_in_two_encodings_matches() {
    let key = PublicKey::from_bytes([42; 32]);
    let other = PublicKey::from_bytes([7; 32]);
    assert_eq!(
        compare_keys(&key.to_hex(), &key.to_base64()).unwrap(),
        KeyComparison::Matches
    );
    assert_eq!(
        compare_keys(&key.to_hex(), &other.to_hex()).unwrap(),
        KeyComparison::Mismatch
    );
    assert_eq!(
        compare_keys(&key.to_base64(), &other.to_base64()).unwrap(),
        KeyComparison::Mismatch
    );
}

#[tokio::test]
async fn base64_signer_matches_hex_link() {
    let (h, user) = migration().await;
    let secret = new_secret_key();
    let pk = h
        .keys
        .connect_signer(AuthMethod::RemoteSigner, secret.expose_secret(), KeyEncoding::Base64)
        .await
        .unwrap();
    h.keys
        .seed_link(&user.provider_user_id, pk, Utc::now() - chrono::Duration::days(1))
        .await;

    h.flow
        .authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
        .await
        .unwrap();
    h.flow
        .authenticate_with_linked_identity(AuthMethod::RemoteSigner, None)
        .await
        .unwrap();
    assert_eq!(h.flow.current_step().await, Step::Complete);
    assert!(h.flow.data().await.expected_public_key.is_none());
}

// ── Terminal irreversibility ────────────────────────────────────────────

#[tokio::test]
async fn linking_step_cannot_be_left_backwards() {
    let (h, user) = migration().await;
    h.keys.fail_next(KeyOp::LinkIdentity, "relay offline").await;

    h.flow
        .authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
        .await
        .unwrap();
    assert_eq!(h.flow.current_step().await, Step::ProfileSetup);
    h.flow.generate_identity().await.unwrap();
    h.flow
        .complete_profile(ProfileFields {
            name: Some("ada".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    // The entry link failed; the session waits on the linking step.
    assert_eq!(h.flow.current_step().await, Step::Linking);
    assert!(h.flow.get_error(ActionName::LinkIdentity).await.is_some());
    assert!(!h.flow.can_go_back().await);
    assert!(!h.flow.go_back().await);
    assert_eq!(h.flow.current_step().await, Step::Linking);

    h.flow.link_identity().await.unwrap();
    assert_eq!(h.flow.current_step().await, Step::Complete);
    assert!(!h.flow.can_go_back().await);
    assert_eq!(h.keys.linked(&user.provider_user_id).await.len(), 1);
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn zero_linked_identities_route_to_profile_setup() {
    let (h, user) = migration().await;
    let recorder = Arc::new(Recorder::default());
    let flow = Orchestrator::new(
        FlowKind::LegacyMigration,
        Providers::new(h.legacy.clone(), h.keys.clone()),
    )
    .unwrap()
    .with_listener(recorder.clone());

    flow.authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
        .await
        .unwrap();
    assert_eq!(flow.current_step().await, Step::ProfileSetup);
    assert_eq!(h.keys.calls(KeyOp::CheckLinkedIdentities).await, 1);

    flow.import_identity(new_secret_key()).await.unwrap();
    flow.complete_profile(ProfileFields {
        display_name: Some("Ada L.".into()),
        ..Default::default()
    })
    .await
    .unwrap();

    assert_eq!(flow.current_step().await, Step::Complete);
    let data = flow.data().await;
    let linked = h.keys.linked(&user.provider_user_id).await;
    assert_eq!(linked.len(), 1);
    assert_eq!(
        Some(linked[0].public_key.clone()),
        data.link.map(|l| l.public_key.to_hex())
    );
    assert_eq!(
        recorder.completions.lock().unwrap().as_slice(),
        &[FlowCompletion {
            id: flow.id(),
            success: true,
            error: None
        }]
    );
}

#[tokio::test]
async fn one_linked_identity_with_matching_key_skips_mismatch() {
    let (h, user) = migration().await;
    let secret = new_secret_key();
    let pk = h
        .keys
        .connect_signer(AuthMethod::Extension, secret.expose_secret(), KeyEncoding::Hex)
        .await
        .unwrap();
    h.keys
        .seed_link(&user.provider_user_id, pk, Utc::now() - chrono::Duration::days(30))
        .await;

    h.flow
        .authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
        .await
        .unwrap();
    assert_eq!(h.flow.current_step().await, Step::LinkedIdentityAuth);
    assert_eq!(h.flow.data().await.selected_identity, Some(pk));

    h.flow
        .authenticate_with_linked_identity(AuthMethod::Extension, None)
        .await
        .unwrap();
    assert_eq!(h.flow.current_step().await, Step::Complete);
    assert_eq!(h.flow.status().await, SessionStatus::Completed);
    assert!(h.flow.get_error(ActionName::LinkIdentity).await.is_none());
    let data = h.flow.data().await;
    assert!(data.expected_public_key.is_none());
    assert_eq!(data.link.map(|l| l.public_key), Some(pk));
}

#[tokio::test]
async fn mismatch_then_relink_clears_keys_and_completes() {
    let (h, user) = migration().await;
    let x = PublicKey::from_bytes([3; 32]);
    h.keys
        .seed_link(&user.provider_user_id, x, Utc::now() - chrono::Duration::days(10))
        .await;
    let y_secret = new_secret_key();
    let y = h
        .keys
        .connect_signer(AuthMethod::Extension, y_secret.expose_secret(), KeyEncoding::Hex)
        .await
        .unwrap();

    h.flow
        .authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
        .await
        .unwrap();
    h.flow
        .authenticate_with_linked_identity(AuthMethod::Extension, None)
        .await
        .unwrap();
    assert_eq!(h.flow.current_step().await, Step::IdentityMismatch);
    let data = h.flow.data().await;
    assert_eq!(data.expected_public_key, Some(x));
    assert_eq!(data.actual_public_key, Some(y));

    h.flow.resolve_mismatch_by_relinking().await.unwrap();
    assert_eq!(h.flow.current_step().await, Step::Complete);
    let data = h.flow.data().await;
    assert!(data.expected_public_key.is_none());
    assert!(data.actual_public_key.is_none());

    let linked = h.keys.linked(&user.provider_user_id).await;
    let newest: Vec<&LinkedIdentity> = linked.iter().filter(|l| l.is_most_recent).collect();
    assert_eq!(newest.len(), 1);
    assert_eq!(newest[0].public_key, y.to_hex());
}

#[tokio::test]
async fn mismatch_retry_with_expected_key_links() {
    let (h, user) = migration().await;
    let x_secret = new_secret_key();
    let x = onboard_flow::providers::memory::public_key_for(x_secret.expose_secret()).unwrap();
    h.keys.seed_link(&user.provider_user_id, x, Utc::now()).await;
    let wrong = new_secret_key();

    h.flow
        .authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
        .await
        .unwrap();
    h.flow
        .authenticate_with_linked_identity(AuthMethod::SecretKey, Some(wrong))
        .await
        .unwrap();
    assert_eq!(h.flow.current_step().await, Step::IdentityMismatch);

    let still_wrong = new_secret_key();
    h.flow
        .resolve_mismatch_by_retry(AuthMethod::SecretKey, Some(still_wrong))
        .await
        .unwrap();
    assert_eq!(h.flow.current_step().await, Step::IdentityMismatch);
    assert_eq!(h.flow.data().await.expected_public_key, Some(x));

    h.flow
        .resolve_mismatch_by_retry(AuthMethod::SecretKey, Some(x_secret))
        .await
        .unwrap();
    assert_eq!(h.flow.current_step().await, Step::Complete);
    assert!(h.flow.data().await.actual_public_key.is_none());
}

#[tokio::test]
async fn direct_login_completes_or_detours_into_migration() {
    let h = harness(FlowKind::DirectLogin);
    h.flow
        .authenticate_with_identity(AuthMethod::SecretKey, Some(new_secret_key()))
        .await
        .unwrap();
    assert_eq!(h.flow.current_step().await, Step::Complete);

    let h = harness(FlowKind::DirectLogin);
    h.flow.start_migration().await.unwrap();
    assert_eq!(h.flow.current_step().await, Step::LegacyAuth);
    assert!(h.flow.can_go_back().await);
    assert!(h.flow.go_back().await);
    assert_eq!(h.flow.current_step().await, Step::IdentityAuth);
}

// ── Custom adapters ─────────────────────────────────────────────────────

/// Key provider that reports links without a most-recent flag, as raw
/// key text and age in days.
struct UnflaggedLinks {
    keys: Vec<(String, i64)>,
}

#[async_trait]
impl KeyIdentityProvider for UnflaggedLinks {
    async fn authenticate(
        &self,
        _method: AuthMethod,
        _secret: Option<SecretString>,
    ) -> Result<AuthenticatedKey, ProviderError> {
        Err(ProviderError::Timeout {
            provider: "stub".into(),
            timeout: Duration::from_secs(10),
        })
    }

    async fn generate_identity(&self) -> Result<GeneratedIdentity, ProviderError> {
        unimplemented!("not used in link tests")
    }

    async fn check_linked_identities(
        &self,
        _provider_user_id: &str,
    ) -> Result<Vec<LinkedIdentity>, ProviderError> {
        Ok(self
            .keys
            .iter()
            .map(|(key, days_ago)| LinkedIdentity {
                public_key: key.clone(),
                linked_at: Utc::now() - chrono::Duration::days(*days_ago),
                profile_summary: None,
                is_most_recent: false,
            })
            .collect())
    }

    async fn link_identity(
        &self,
        _provider_user_id: &str,
        _public_key: &str,
        _proof: &LinkProof,
    ) -> Result<(), ProviderError> {
        unimplemented!("not used in link tests")
    }
}

#[tokio::test]
async fn newest_link_is_selected_when_provider_flags_none() {
    let legacy = InMemoryLegacyProvider::new();
    legacy.register_account(EMAIL, PASSWORD).await;
    let older = PublicKey::from_bytes([1; 32]);
    let newest = PublicKey::from_bytes([2; 32]);
    let keys = Arc::new(UnflaggedLinks {
        keys: vec![(older.to_base64(), 20), (newest.to_base64(), 2)],
    });
    let flow = Orchestrator::new(FlowKind::LegacyMigration, Providers::new(legacy, keys)).unwrap();

    flow.authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
        .await
        .unwrap();
    assert_eq!(flow.current_step().await, Step::LinkedIdentityAuth);
    assert_eq!(flow.data().await.selected_identity, Some(newest));

    flow.select_linked_identity(older).await.unwrap();
    assert_eq!(flow.data().await.selected_identity, Some(older));
    assert_eq!(flow.current_step().await, Step::LinkedIdentityAuth);

    // Provider timeouts surface as a normal action failure.
    flow.authenticate_with_linked_identity(AuthMethod::Extension, None)
        .await
        .unwrap();
    let error = flow
        .get_error(ActionName::AuthenticateWithLinkedIdentity)
        .await
        .unwrap();
    assert_eq!(error.message, "The request timed out");
    assert_eq!(flow.current_step().await, Step::LinkedIdentityAuth);

    flow.use_new_identity().await.unwrap();
    assert_eq!(flow.current_step().await, Step::ProfileSetup);
    assert!(flow.data().await.selected_identity.is_none());
}

#[tokio::test]
async fn unreadable_links_are_skipped() {
    let legacy = InMemoryLegacyProvider::new();
    legacy.register_account(EMAIL, PASSWORD).await;
    let readable = PublicKey::from_bytes([3; 32]);
    let keys = Arc::new(UnflaggedLinks {
        keys: vec![(readable.to_hex(), 30), ("npub1garbage".to_string(), 1)],
    });
    let flow = Orchestrator::new(FlowKind::LegacyMigration, Providers::new(legacy, keys)).unwrap();

    flow.authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
        .await
        .unwrap();
    assert!(flow.get_error(ActionName::CheckLinkedIdentities).await.is_none());
    assert_eq!(flow.current_step().await, Step::LinkedIdentityAuth);
    let data = flow.data().await;
    assert_eq!(data.selected_identity, Some(readable));
    assert_eq!(data.linked_identities.map(|l| l.len()), Some(1));
}

#[tokio::test]
async fn only_unreadable_links_count_as_none() {
    let legacy = InMemoryLegacyProvider::new();
    legacy.register_account(EMAIL, PASSWORD).await;
    let keys = Arc::new(UnflaggedLinks {
        keys: vec![("zz".to_string(), 1)],
    });
    let flow = Orchestrator::new(FlowKind::LegacyMigration, Providers::new(legacy, keys)).unwrap();

    flow.authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
        .await
        .unwrap();
    assert!(flow.get_error(ActionName::CheckLinkedIdentities).await.is_none());
    assert_eq!(flow.current_step().await, Step::ProfileSetup);
}

// ── Entry-action chains ─────────────────────────────────────────────────

#[tokio::test]
async fn entry_action_chain_is_one_in_flight_unit() {
    let (h, _) = migration().await;
    let gate = h.keys.pause(KeyOp::CheckLinkedIdentities).await;

    let chain = tokio::spawn({
        let flow = Arc::clone(&h.flow);
        async move {
            flow.authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
                .await
        }
    });
    wait_until_loading(&h.flow, ActionName::CheckLinkedIdentities).await;

    // Landed on checking_links, but the chain still holds the session.
    let snapshot = h.flow.snapshot().await;
    assert_eq!(snapshot.step, Step::CheckingLinks);
    assert!(!snapshot.can_go_back);
    assert!(!h.flow.go_back().await);
    h.flow.send_passwordless_link(EMAIL).await.unwrap();
    assert_eq!(h.legacy.calls(LegacyOp::SendPasswordlessLink).await, 0);

    gate.notify_one();
    timeout(TEST_TIMEOUT, chain).await.unwrap().unwrap().unwrap();

    assert_eq!(h.flow.current_step().await, Step::ProfileSetup);
    assert!(h.flow.get_error(ActionName::CheckLinkedIdentities).await.is_none());
    assert!(h.flow.get_error(ActionName::SendPasswordlessLink).await.is_none());
}

#[tokio::test]
async fn reset_during_entry_action_drops_the_chain() {
    let (h, _) = migration().await;
    let gate = h.keys.pause(KeyOp::CheckLinkedIdentities).await;

    let chain = tokio::spawn({
        let flow = Arc::clone(&h.flow);
        async move {
            flow.authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
                .await
        }
    });
    wait_until_loading(&h.flow, ActionName::CheckLinkedIdentities).await;

    h.flow.reset().await;
    gate.notify_one();
    timeout(TEST_TIMEOUT, chain).await.unwrap().unwrap().unwrap();

    let snapshot = h.flow.snapshot().await;
    assert_eq!(snapshot.step, Step::LegacyAuth);
    assert_eq!(snapshot.history_depth, 0);
    assert!(snapshot.actions.is_empty());
    assert!(snapshot.data.legacy_user.is_none());
    assert_eq!(h.keys.calls(KeyOp::CheckLinkedIdentities).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn observer_going_back_mid_chain_is_refused() {
    for _ in 0..50 {
        let (h, _) = migration().await;
        let mut rx = h.flow.subscribe();

        let observer = tokio::spawn({
            let flow = Arc::clone(&h.flow);
            async move {
                while rx.changed().await.is_ok() {
                    let step = rx.borrow_and_update().step;
                    match step {
                        Step::CheckingLinks => return Some(flow.go_back().await),
                        Step::ProfileSetup => return None,
                        _ => {}
                    }
                }
                None
            }
        });

        h.flow
            .authenticate_with_legacy_provider(EMAIL, password(PASSWORD))
            .await
            .unwrap();
        let went_back = timeout(TEST_TIMEOUT, observer).await.unwrap().unwrap();

        assert_ne!(went_back, Some(true));
        assert_eq!(h.flow.current_step().await, Step::ProfileSetup);
        assert!(h.flow.get_error(ActionName::CheckLinkedIdentities).await.is_none());
    }
}
