//! In-memory identity providers.
//!
//! Back the demo server and the test suite. Both support per-operation
//! failure injection, call counting, and pausing an operation until the
//! test releases it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    AuthMethod, AuthenticatedKey, GeneratedIdentity, KeyIdentityProvider, LegacyCredential,
    LegacyIdentityProvider, LegacyUser, LinkProof, LinkedIdentity,
};
use crate::error::ProviderError;
use crate::flow::key::{KeyEncoding, PublicKey};

const LEGACY_PROVIDER: &str = "legacy";
const KEY_PROVIDER: &str = "keys";

/// Legacy provider operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyOp {
    Authenticate,
    SendPasswordlessLink,
    CurrentSession,
    SignOut,
}

/// Key provider operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyOp {
    Authenticate,
    GenerateIdentity,
    CheckLinkedIdentities,
    LinkIdentity,
}

/// Per-operation test controls shared by both providers.
struct OpControl<Op> {
    failures: Mutex<HashMap<Op, String>>,
    gates: Mutex<HashMap<Op, Arc<Notify>>>,
    calls: Mutex<HashMap<Op, usize>>,
}

impl<Op: Copy + Eq + Hash> OpControl<Op> {
    fn new() -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    async fn enter(&self, provider: &str, op: Op) -> Result<(), ProviderError> {
        *self.calls.lock().await.entry(op).or_default() += 1;

        let gate = self.gates.lock().await.remove(&op);
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match self.failures.lock().await.remove(&op) {
            Some(reason) => Err(ProviderError::Unavailable {
                provider: provider.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    async fn fail_next(&self, op: Op, reason: String) {
        self.failures.lock().await.insert(op, reason);
    }

    async fn pause(&self, op: Op) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().await.insert(op, Arc::clone(&gate));
        gate
    }

    async fn calls(&self, op: Op) -> usize {
        self.calls.lock().await.get(&op).copied().unwrap_or(0)
    }
}

struct Account {
    user: LegacyUser,
    password: SecretString,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Email/password accounts held in memory.
pub struct InMemoryLegacyProvider {
    accounts: RwLock<HashMap<String, Account>>,
    issued_links: RwLock<HashMap<String, String>>,
    session: RwLock<Option<LegacyUser>>,
    control: OpControl<LegacyOp>,
}

impl InMemoryLegacyProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accounts: RwLock::new(HashMap::new()),
            issued_links: RwLock::new(HashMap::new()),
            session: RwLock::new(None),
            control: OpControl::new(),
        })
    }

    /// Create an account and return its user record.
    pub async fn register_account(&self, email: &str, password: &str) -> LegacyUser {
        let user = LegacyUser {
            provider_user_id: Uuid::new_v4().to_string(),
            email: Some(email.trim().to_string()),
        };
        self.accounts.write().await.insert(
            normalize_email(email),
            Account {
                user: user.clone(),
                password: SecretString::from(password.to_string()),
            },
        );
        user
    }

    /// Pretend the user is already signed in on this device.
    pub async fn set_current_session(&self, user: Option<LegacyUser>) {
        *self.session.write().await = user;
    }

    /// The sign-in link most recently mailed to `email`.
    pub async fn issued_link(&self, email: &str) -> Option<String> {
        self.issued_links
            .read()
            .await
            .get(&normalize_email(email))
            .cloned()
    }

    pub async fn fail_next(&self, op: LegacyOp, reason: impl Into<String>) {
        self.control.fail_next(op, reason.into()).await;
    }

    /// Block the next call of `op` until the returned handle is notified.
    pub async fn pause(&self, op: LegacyOp) -> Arc<Notify> {
        self.control.pause(op).await
    }

    pub async fn calls(&self, op: LegacyOp) -> usize {
        self.control.calls(op).await
    }

    fn invalid_credentials() -> ProviderError {
        ProviderError::InvalidCredentials {
            provider: LEGACY_PROVIDER.to_string(),
        }
    }
}

#[async_trait]
impl LegacyIdentityProvider for InMemoryLegacyProvider {
    async fn authenticate(&self, credential: LegacyCredential) -> Result<LegacyUser, ProviderError> {
        self.control
            .enter(LEGACY_PROVIDER, LegacyOp::Authenticate)
            .await?;

        let user = match credential {
            LegacyCredential::Password { email, password } => {
                let accounts = self.accounts.read().await;
                let account = accounts
                    .get(&normalize_email(&email))
                    .ok_or_else(Self::invalid_credentials)?;
                if account.password.expose_secret() != password.expose_secret() {
                    return Err(Self::invalid_credentials());
                }
                account.user.clone()
            }
            LegacyCredential::EmailLink { email, link } => {
                let key = normalize_email(&email);
                let mut links = self.issued_links.write().await;
                if links.get(&key) != Some(&link) {
                    return Err(Self::invalid_credentials());
                }
                links.remove(&key);
                let accounts = self.accounts.read().await;
                accounts
                    .get(&key)
                    .map(|a| a.user.clone())
                    .ok_or_else(Self::invalid_credentials)?
            }
        };

        info!(user_id = %user.provider_user_id, "Legacy account signed in");
        *self.session.write().await = Some(user.clone());
        Ok(user)
    }

    async fn send_passwordless_link(&self, email: &str) -> Result<(), ProviderError> {
        self.control
            .enter(LEGACY_PROVIDER, LegacyOp::SendPasswordlessLink)
            .await?;

        let key = normalize_email(email);
        if !self.accounts.read().await.contains_key(&key) {
            return Err(ProviderError::Rejected {
                provider: LEGACY_PROVIDER.to_string(),
                reason: format!("no account for {email}"),
            });
        }
        let link = format!("https://auth.invalid/link/{}", Uuid::new_v4());
        debug!(email = %key, "Passwordless link issued");
        self.issued_links.write().await.insert(key, link);
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<LegacyUser>, ProviderError> {
        self.control
            .enter(LEGACY_PROVIDER, LegacyOp::CurrentSession)
            .await?;
        Ok(self.session.read().await.clone())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.control.enter(LEGACY_PROVIDER, LegacyOp::SignOut).await?;
        *self.session.write().await = None;
        Ok(())
    }
}

/// A connected extension or remote signer.
struct ConnectedSigner {
    key: SigningKey,
    encoding: KeyEncoding,
}

/// Generate a fresh secret key, hex encoded.
pub fn new_secret_key() -> SecretString {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    SecretString::from(hex::encode(seed))
}

/// Derive the public key for a hex-encoded secret key.
pub fn public_key_for(secret: &str) -> Result<PublicKey, ProviderError> {
    Ok(PublicKey::from_bytes(
        signing_key_from_secret(secret)?.verifying_key().to_bytes(),
    ))
}

fn signing_key_from_secret(secret: &str) -> Result<SigningKey, ProviderError> {
    let invalid = || ProviderError::InvalidCredentials {
        provider: KEY_PROVIDER.to_string(),
    };
    let bytes = hex::decode(secret.trim()).map_err(|_| invalid())?;
    let seed: [u8; 32] = bytes.try_into().map_err(|_| invalid())?;
    Ok(SigningKey::from_bytes(&seed))
}

fn link_message(provider_user_id: &str, public_key: &PublicKey) -> String {
    format!("link:{provider_user_id}:{public_key}")
}

/// Public-key identities and their links, held in memory.
pub struct InMemoryKeyProvider {
    signers: RwLock<HashMap<AuthMethod, ConnectedSigner>>,
    sessions: RwLock<HashMap<AuthMethod, PublicKey>>,
    links: RwLock<HashMap<String, Vec<LinkedIdentity>>>,
    control: OpControl<KeyOp>,
}

impl InMemoryKeyProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            signers: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            links: RwLock::new(HashMap::new()),
            control: OpControl::new(),
        })
    }

    /// Connect an extension or remote signer holding `secret`. The signer
    /// reports its key in `encoding`.
    pub async fn connect_signer(
        &self,
        method: AuthMethod,
        secret: &str,
        encoding: KeyEncoding,
    ) -> Result<PublicKey, ProviderError> {
        let key = signing_key_from_secret(secret)?;
        let public_key = PublicKey::from_bytes(key.verifying_key().to_bytes());
        self.signers
            .write()
            .await
            .insert(method, ConnectedSigner { key, encoding });
        Ok(public_key)
    }

    /// Record an existing link, as if made in an earlier session.
    pub async fn seed_link(
        &self,
        provider_user_id: &str,
        public_key: PublicKey,
        linked_at: DateTime<Utc>,
    ) {
        let mut links = self.links.write().await;
        let entries = links.entry(provider_user_id.to_string()).or_default();
        entries.retain(|e| PublicKey::parse(&e.public_key).ok() != Some(public_key));
        entries.push(LinkedIdentity {
            public_key: public_key.to_hex(),
            linked_at,
            profile_summary: None,
            is_most_recent: false,
        });
        entries.sort_by_key(|e| e.linked_at);
        let last = entries.len() - 1;
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.is_most_recent = i == last;
        }
    }

    pub async fn linked(&self, provider_user_id: &str) -> Vec<LinkedIdentity> {
        self.links
            .read()
            .await
            .get(provider_user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn fail_next(&self, op: KeyOp, reason: impl Into<String>) {
        self.control.fail_next(op, reason.into()).await;
    }

    /// Block the next call of `op` until the returned handle is notified.
    pub async fn pause(&self, op: KeyOp) -> Arc<Notify> {
        self.control.pause(op).await
    }

    pub async fn calls(&self, op: KeyOp) -> usize {
        self.control.calls(op).await
    }

    fn rejected(reason: impl Into<String>) -> ProviderError {
        ProviderError::Rejected {
            provider: KEY_PROVIDER.to_string(),
            reason: reason.into(),
        }
    }

    async fn verify_proof(
        &self,
        provider_user_id: &str,
        public_key: &PublicKey,
        proof: &LinkProof,
    ) -> Result<(), ProviderError> {
        let message = link_message(provider_user_id, public_key);
        let signing_key = match proof {
            LinkProof::SecretKey(secret) => signing_key_from_secret(secret.expose_secret())?,
            LinkProof::Session { method } => {
                let sessions = self.sessions.read().await;
                if sessions.get(method) != Some(public_key) {
                    return Err(Self::rejected(format!(
                        "{method} session does not hold {public_key}"
                    )));
                }
                match self.signers.read().await.get(method) {
                    Some(signer) => signer.key.clone(),
                    // Secret-key sessions keep no signer; the session match is the proof.
                    None => return Ok(()),
                }
            }
        };

        let signature = signing_key.sign(message.as_bytes());
        let verifying_key = VerifyingKey::from_bytes(public_key.as_bytes())
            .map_err(|_| Self::rejected("not a valid ed25519 key"))?;
        verifying_key
            .verify(message.as_bytes(), &signature)
            .map_err(|_| Self::rejected("proof does not match the key being linked"))
    }
}

#[async_trait]
impl KeyIdentityProvider for InMemoryKeyProvider {
    async fn authenticate(
        &self,
        method: AuthMethod,
        secret: Option<SecretString>,
    ) -> Result<AuthenticatedKey, ProviderError> {
        self.control.enter(KEY_PROVIDER, KeyOp::Authenticate).await?;

        let (public_key, encoding) = match method {
            AuthMethod::SecretKey => {
                let secret = secret.ok_or_else(|| ProviderError::InvalidCredentials {
                    provider: KEY_PROVIDER.to_string(),
                })?;
                (public_key_for(secret.expose_secret())?, KeyEncoding::Hex)
            }
            AuthMethod::Extension | AuthMethod::RemoteSigner => {
                let signers = self.signers.read().await;
                let signer = signers.get(&method).ok_or_else(|| ProviderError::Unavailable {
                    provider: KEY_PROVIDER.to_string(),
                    reason: format!("no {method} signer connected"),
                })?;
                (
                    PublicKey::from_bytes(signer.key.verifying_key().to_bytes()),
                    signer.encoding,
                )
            }
        };

        self.sessions.write().await.insert(method, public_key);
        info!(method = %method, public_key = %public_key, "Public-key identity authenticated");
        Ok(AuthenticatedKey {
            public_key: public_key.encode(encoding),
        })
    }

    async fn generate_identity(&self) -> Result<GeneratedIdentity, ProviderError> {
        self.control
            .enter(KEY_PROVIDER, KeyOp::GenerateIdentity)
            .await?;
        let secret = new_secret_key();
        let public_key = public_key_for(secret.expose_secret())?;
        Ok(GeneratedIdentity {
            public_key: public_key.to_hex(),
            private_material: secret,
        })
    }

    async fn check_linked_identities(
        &self,
        provider_user_id: &str,
    ) -> Result<Vec<LinkedIdentity>, ProviderError> {
        self.control
            .enter(KEY_PROVIDER, KeyOp::CheckLinkedIdentities)
            .await?;
        Ok(self.linked(provider_user_id).await)
    }

    async fn link_identity(
        &self,
        provider_user_id: &str,
        public_key: &str,
        proof: &LinkProof,
    ) -> Result<(), ProviderError> {
        self.control.enter(KEY_PROVIDER, KeyOp::LinkIdentity).await?;

        let key = PublicKey::parse(public_key).map_err(|e| Self::rejected(e.to_string()))?;
        self.verify_proof(provider_user_id, &key, proof).await?;
        self.seed_link(provider_user_id, key, Utc::now()).await;
        info!(user_id = %provider_user_id, public_key = %key, "Public-key identity linked");
        Ok(())
    }
}
