//! Identity provider adapters.
//!
//! The orchestrator only sees these capability surfaces. Network and
//! protocol details stay behind the adapter.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub use memory::{InMemoryKeyProvider, InMemoryLegacyProvider, KeyOp, LegacyOp};

/// An authenticated legacy (email/password) account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyUser {
    pub provider_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Credential accepted by the legacy provider.
#[derive(Debug, Clone)]
pub enum LegacyCredential {
    Password { email: String, password: SecretString },
    EmailLink { email: String, link: String },
}

/// How the user proves control of a public-key identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Browser extension signer.
    Extension,
    /// Remote signer reached over a relay.
    RemoteSigner,
    /// Raw secret key pasted by the user.
    SecretKey,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Extension => "extension",
            Self::RemoteSigner => "remote_signer",
            Self::SecretKey => "secret_key",
        };
        write!(f, "{s}")
    }
}

/// Result of a public-key authentication. The key is in whatever
/// encoding the signer used.
#[derive(Debug, Clone)]
pub struct AuthenticatedKey {
    pub public_key: String,
}

/// A freshly generated keypair.
#[derive(Debug, Clone)]
pub struct GeneratedIdentity {
    pub public_key: String,
    pub private_material: SecretString,
}

/// Short profile shown next to a linked key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
}

/// A public key previously linked to a legacy account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIdentity {
    pub public_key: String,
    pub linked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_summary: Option<ProfileSummary>,
    pub is_most_recent: bool,
}

/// Evidence that the caller controls the key being linked.
#[derive(Debug, Clone)]
pub enum LinkProof {
    /// Secret material of a generated or imported identity.
    SecretKey(SecretString),
    /// The signer session opened by a previous `authenticate` call.
    Session { method: AuthMethod },
}

/// The legacy email/password identity system.
#[async_trait]
pub trait LegacyIdentityProvider: Send + Sync {
    async fn authenticate(&self, credential: LegacyCredential) -> Result<LegacyUser, ProviderError>;

    async fn send_passwordless_link(&self, email: &str) -> Result<(), ProviderError>;

    /// The account already signed in on this device, if any.
    async fn current_session(&self) -> Result<Option<LegacyUser>, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;
}

/// The public-key identity system.
#[async_trait]
pub trait KeyIdentityProvider: Send + Sync {
    async fn authenticate(
        &self,
        method: AuthMethod,
        secret: Option<SecretString>,
    ) -> Result<AuthenticatedKey, ProviderError>;

    async fn generate_identity(&self) -> Result<GeneratedIdentity, ProviderError>;

    async fn check_linked_identities(
        &self,
        provider_user_id: &str,
    ) -> Result<Vec<LinkedIdentity>, ProviderError>;

    async fn link_identity(
        &self,
        provider_user_id: &str,
        public_key: &str,
        proof: &LinkProof,
    ) -> Result<(), ProviderError>;
}

/// The adapters a session calls into.
#[derive(Clone)]
pub struct Providers {
    pub legacy: Arc<dyn LegacyIdentityProvider>,
    pub keys: Arc<dyn KeyIdentityProvider>,
}

impl Providers {
    pub fn new(
        legacy: Arc<dyn LegacyIdentityProvider>,
        keys: Arc<dyn KeyIdentityProvider>,
    ) -> Self {
        Self { legacy, keys }
    }
}
