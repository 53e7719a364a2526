//! Session data: the facts a flow discovers as it runs.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::key::PublicKey;
use crate::providers::{AuthMethod, LegacyUser, LinkedIdentity};

/// Profile fields captured during setup. Every field is optional so
/// partial updates can be merged across steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl ProfileFields {
    /// Overwrite fields present in `other`; leave the rest alone.
    pub fn merge(&mut self, other: ProfileFields) {
        let ProfileFields {
            name,
            display_name,
            about,
            picture_url,
            website,
        } = other;
        if name.is_some() {
            self.name = name;
        }
        if display_name.is_some() {
            self.display_name = display_name;
        }
        if about.is_some() {
            self.about = about;
        }
        if picture_url.is_some() {
            self.picture_url = picture_url;
        }
        if website.is_some() {
            self.website = website;
        }
    }
}

/// A keypair held by this session. Generated and imported identities are
/// mutually exclusive.
#[derive(Debug, Clone)]
pub enum LocalIdentity {
    Generated {
        public_key: PublicKey,
        private_material: SecretString,
    },
    Imported {
        public_key: PublicKey,
        secret: SecretString,
    },
}

impl LocalIdentity {
    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Generated { public_key, .. } | Self::Imported { public_key, .. } => *public_key,
        }
    }

    pub fn secret(&self) -> &SecretString {
        match self {
            Self::Generated {
                private_material, ..
            } => private_material,
            Self::Imported { secret, .. } => secret,
        }
    }

    pub fn source(&self) -> IdentitySource {
        match self {
            Self::Generated { .. } => IdentitySource::Generated,
            Self::Imported { .. } => IdentitySource::Imported,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Generated,
    Imported,
}

/// A key the user just proved control of through a signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    pub public_key: PublicKey,
    pub method: AuthMethod,
}

/// The authenticated key differs from the one this session expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMismatch {
    pub expected: PublicKey,
    pub actual: PublicKey,
}

/// A link this session completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub public_key: PublicKey,
    pub linked_at: DateTime<Utc>,
}

/// Update to one optional fact.
#[derive(Debug, Clone)]
pub enum Patch<T> {
    Keep,
    Set(T),
    Clear,
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Self::Keep
    }
}

impl<T> Patch<T> {
    fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    fn apply(self, slot: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Set(value) => *slot = Some(value),
            Self::Clear => *slot = None,
        }
    }
}

/// Facts returned by an action handler, merged into [`SessionData`].
#[derive(Debug, Clone, Default)]
pub struct SessionFacts {
    pub legacy_user: Patch<LegacyUser>,
    pub pending_email: Patch<String>,
    pub linked_identities: Patch<Vec<LinkedIdentity>>,
    pub selected_identity: Patch<PublicKey>,
    pub identity: Patch<LocalIdentity>,
    pub authenticated: Patch<AuthenticatedIdentity>,
    pub mismatch: Patch<KeyMismatch>,
    pub link: Patch<LinkRecord>,
    pub profile: Option<ProfileFields>,
}

impl SessionFacts {
    pub fn none() -> Self {
        Self::default()
    }

    /// Facts for a public-key authentication compared against `expected`.
    pub fn authenticated(identity: AuthenticatedIdentity, expected: Option<PublicKey>) -> Self {
        let mismatch = match expected {
            Some(expected) if expected != identity.public_key => Patch::Set(KeyMismatch {
                expected,
                actual: identity.public_key,
            }),
            _ => Patch::Clear,
        };
        Self {
            authenticated: Patch::Set(identity),
            mismatch,
            ..Self::default()
        }
    }

    /// Facts for a completed link. Resolves any mismatch.
    pub fn linked(record: LinkRecord) -> Self {
        Self {
            link: Patch::Set(record),
            mismatch: Patch::Clear,
            selected_identity: Patch::Set(record.public_key),
            ..Self::default()
        }
    }
}

/// Everything a flow session has learned so far.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub legacy_user: Option<LegacyUser>,
    pub pending_email: Option<String>,
    /// `None` until the linked-identity check has run.
    pub linked_identities: Option<Vec<LinkedIdentity>>,
    pub selected_identity: Option<PublicKey>,
    pub identity: Option<LocalIdentity>,
    pub authenticated: Option<AuthenticatedIdentity>,
    pub mismatch: Option<KeyMismatch>,
    pub link: Option<LinkRecord>,
    pub profile_draft: ProfileFields,
}

impl SessionData {
    /// Merge `facts` into this session. Fields the facts leave as
    /// [`Patch::Keep`] are untouched.
    ///
    /// A mismatch can only be recorded together with the authentication
    /// that detected it.
    pub fn merge(&mut self, facts: SessionFacts) {
        let SessionFacts {
            legacy_user,
            pending_email,
            linked_identities,
            selected_identity,
            identity,
            authenticated,
            mut mismatch,
            link,
            profile,
        } = facts;

        if mismatch.is_set() && !authenticated.is_set() {
            tracing::warn!("Dropping key mismatch reported without a fresh authentication");
            mismatch = Patch::Keep;
        }

        legacy_user.apply(&mut self.legacy_user);
        pending_email.apply(&mut self.pending_email);
        linked_identities.apply(&mut self.linked_identities);
        selected_identity.apply(&mut self.selected_identity);
        identity.apply(&mut self.identity);
        authenticated.apply(&mut self.authenticated);
        mismatch.apply(&mut self.mismatch);
        link.apply(&mut self.link);
        if let Some(profile) = profile {
            self.profile_draft.merge(profile);
        }
    }

    /// The linked identity flagged as most recent.
    pub fn most_recent_linked(&self) -> Option<&LinkedIdentity> {
        self.linked_identities
            .as_ref()?
            .iter()
            .find(|l| l.is_most_recent)
    }

    /// The key an authentication in this session is compared against.
    ///
    /// An open mismatch keeps its expectation; otherwise the user's
    /// selection, falling back to the most recently linked key.
    pub fn expected_public_key(&self) -> Option<PublicKey> {
        if let Some(mismatch) = &self.mismatch {
            return Some(mismatch.expected);
        }
        self.selected_identity.or_else(|| {
            self.most_recent_linked()
                .and_then(|l| PublicKey::parse(&l.public_key).ok())
        })
    }

    /// Read-only projection safe to hand to UI observers.
    pub fn view(&self) -> DataView {
        DataView {
            legacy_user: self.legacy_user.clone(),
            pending_email: self.pending_email.clone(),
            linked_identities: self.linked_identities.clone(),
            selected_identity: self.selected_identity,
            identity: self.identity.as_ref().map(|i| IdentityView {
                source: i.source(),
                public_key: i.public_key(),
            }),
            authenticated: self.authenticated,
            expected_public_key: self.mismatch.map(|m| m.expected),
            actual_public_key: self.mismatch.map(|m| m.actual),
            link: self.link,
            profile_draft: self.profile_draft.clone(),
        }
    }
}

/// Public half of a [`LocalIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityView {
    pub source: IdentitySource,
    pub public_key: PublicKey,
}

/// Serializable projection of [`SessionData`] without secret material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataView {
    pub legacy_user: Option<LegacyUser>,
    pub pending_email: Option<String>,
    pub linked_identities: Option<Vec<LinkedIdentity>>,
    pub selected_identity: Option<PublicKey>,
    pub identity: Option<IdentityView>,
    pub authenticated: Option<AuthenticatedIdentity>,
    pub expected_public_key: Option<PublicKey>,
    pub actual_public_key: Option<PublicKey>,
    pub link: Option<LinkRecord>,
    pub profile_draft: ProfileFields,
}

/// Ensure exactly one entry is flagged most recent (the latest `linked_at`
/// wins when the provider flagged none or several).
pub fn normalize_linked(mut linked: Vec<LinkedIdentity>) -> Vec<LinkedIdentity> {
    if linked.iter().filter(|l| l.is_most_recent).count() == 1 {
        return linked;
    }
    let newest = linked
        .iter()
        .enumerate()
        .max_by_key(|(_, l)| l.linked_at)
        .map(|(i, _)| i);
    for (i, entry) in linked.iter_mut().enumerate() {
        entry.is_most_recent = Some(i) == newest;
    }
    linked
}
