//! Action handlers.
//!
//! A handler reads the current [`SessionData`], calls the provider adapters
//! and returns the facts it learned plus an [`Outcome`]. It never mutates
//! the session; the orchestrator merges the result.

use chrono::Utc;
use tracing::{debug, warn};

use super::intent::Intent;
use super::key::{KeyComparison, PublicKey, compare_keys};
use super::model::{
    AuthenticatedIdentity, LinkRecord, LocalIdentity, Patch, SessionData, SessionFacts,
    normalize_linked,
};
use super::state::Outcome;
use crate::error::ActionError;
use crate::providers::{
    AuthMethod, LegacyCredential, LegacyUser, LinkProof, LinkedIdentity, Providers,
};

/// What a successful handler produced.
#[derive(Debug)]
pub struct Handled {
    pub facts: SessionFacts,
    pub outcome: Outcome,
}

impl Handled {
    fn success(facts: SessionFacts) -> Self {
        Self {
            facts,
            outcome: Outcome::Success,
        }
    }

    fn skip(facts: SessionFacts) -> Self {
        Self {
            facts,
            outcome: Outcome::Skip,
        }
    }
}

fn precondition(message: &str) -> ActionError {
    ActionError::Precondition(message.to_string())
}

fn legacy_user(data: &SessionData) -> Result<&LegacyUser, ActionError> {
    data.legacy_user
        .as_ref()
        .ok_or_else(|| precondition("No legacy account is signed in"))
}

fn signed_in(user: LegacyUser) -> SessionFacts {
    SessionFacts {
        legacy_user: Patch::Set(user),
        pending_email: Patch::Clear,
        ..SessionFacts::none()
    }
}

/// Drop provider entries whose key cannot be read. Selection and relinking
/// only ever see keys that parse.
fn readable_links(linked: Vec<LinkedIdentity>, user_id: &str) -> Vec<LinkedIdentity> {
    linked
        .into_iter()
        .filter(|entry| match PublicKey::parse(&entry.public_key) {
            Ok(_) => true,
            Err(e) => {
                warn!(user_id = user_id, public_key = %entry.public_key, error = %e, "Skipping unreadable linked identity");
                false
            }
        })
        .collect()
}

/// Run the handler for `intent`.
pub async fn run(
    intent: Intent,
    data: &SessionData,
    providers: &Providers,
) -> Result<Handled, ActionError> {
    match intent {
        Intent::AuthenticateWithLegacyProvider { email, password } => {
            let user = providers
                .legacy
                .authenticate(LegacyCredential::Password { email, password })
                .await?;
            Ok(Handled::success(signed_in(user)))
        }

        Intent::SendPasswordlessLink { email } => {
            let email = email.trim().to_string();
            if email.is_empty() {
                return Err(precondition("Enter an email address"));
            }
            providers.legacy.send_passwordless_link(&email).await?;
            Ok(Handled::success(SessionFacts {
                pending_email: Patch::Set(email),
                ..SessionFacts::none()
            }))
        }

        Intent::CompletePasswordlessLink { link } => {
            let email = data
                .pending_email
                .clone()
                .ok_or_else(|| precondition("No sign-in link has been requested"))?;
            let user = providers
                .legacy
                .authenticate(LegacyCredential::EmailLink { email, link })
                .await?;
            Ok(Handled::success(signed_in(user)))
        }

        Intent::ContinueWithExistingSession => {
            let user = providers
                .legacy
                .current_session()
                .await?
                .ok_or_else(|| precondition("No legacy account is signed in on this device"))?;
            Ok(Handled::success(signed_in(user)))
        }

        Intent::CheckLinkedIdentities => {
            let user = legacy_user(data)?;
            let fetched = providers
                .keys
                .check_linked_identities(&user.provider_user_id)
                .await?;
            let linked = normalize_linked(readable_links(fetched, &user.provider_user_id));
            debug!(user_id = %user.provider_user_id, count = linked.len(), "Linked identities fetched");

            let selected = match linked.iter().find(|l| l.is_most_recent) {
                Some(most_recent) => Patch::Set(PublicKey::parse(&most_recent.public_key)?),
                None => Patch::Clear,
            };
            let outcome = if linked.is_empty() {
                Outcome::NoLinkedIdentities
            } else {
                Outcome::OneOrMoreLinkedIdentities
            };
            Ok(Handled {
                facts: SessionFacts {
                    linked_identities: Patch::Set(linked),
                    selected_identity: selected,
                    ..SessionFacts::none()
                },
                outcome,
            })
        }

        Intent::SelectLinkedIdentity { public_key } => {
            let known = data.linked_identities.as_deref().unwrap_or_default();
            let is_linked = known
                .iter()
                .any(|l| PublicKey::parse(&l.public_key).ok() == Some(public_key));
            if !is_linked {
                return Err(precondition("That key is not linked to this account"));
            }
            Ok(Handled::success(SessionFacts {
                selected_identity: Patch::Set(public_key),
                ..SessionFacts::none()
            }))
        }

        Intent::AuthenticateWithLinkedIdentity { method, secret }
        | Intent::ResolveMismatchByRetry { method, secret } => {
            let expected = data
                .expected_public_key()
                .ok_or_else(|| precondition("No linked identity to compare against"))?;
            let auth = providers.keys.authenticate(method, secret).await?;
            let actual = PublicKey::parse(&auth.public_key)?;

            let outcome = match compare_keys(&expected.to_hex(), &auth.public_key)? {
                KeyComparison::Matches => Outcome::KeyMatches,
                KeyComparison::Mismatch => Outcome::KeyMismatch,
            };
            let identity = AuthenticatedIdentity {
                public_key: actual,
                method,
            };
            Ok(Handled {
                facts: SessionFacts::authenticated(identity, Some(expected)),
                outcome,
            })
        }

        Intent::UseNewIdentity => Ok(Handled::skip(SessionFacts {
            selected_identity: Patch::Clear,
            ..SessionFacts::none()
        })),

        Intent::ResolveMismatchByRelinking => {
            let mismatch = data
                .mismatch
                .ok_or_else(|| precondition("There is no key mismatch to resolve"))?;
            let user = legacy_user(data)?;
            let auth = data
                .authenticated
                .ok_or_else(|| precondition("Sign in with the new key first"))?;

            let proof = LinkProof::Session {
                method: auth.method,
            };
            providers
                .keys
                .link_identity(&user.provider_user_id, &mismatch.actual.to_hex(), &proof)
                .await?;
            Ok(Handled::success(SessionFacts::linked(LinkRecord {
                public_key: mismatch.actual,
                linked_at: Utc::now(),
            })))
        }

        Intent::GenerateIdentity => {
            let generated = providers.keys.generate_identity().await?;
            let public_key = PublicKey::parse(&generated.public_key)?;
            Ok(Handled::success(SessionFacts {
                identity: Patch::Set(LocalIdentity::Generated {
                    public_key,
                    private_material: generated.private_material,
                }),
                ..SessionFacts::none()
            }))
        }

        Intent::ImportIdentity { secret } => {
            let auth = providers
                .keys
                .authenticate(AuthMethod::SecretKey, Some(secret.clone()))
                .await?;
            let public_key = PublicKey::parse(&auth.public_key)?;
            Ok(Handled::success(SessionFacts {
                identity: Patch::Set(LocalIdentity::Imported { public_key, secret }),
                ..SessionFacts::none()
            }))
        }

        Intent::AcknowledgeBackup => match &data.identity {
            Some(LocalIdentity::Generated { .. }) => Ok(Handled::success(SessionFacts::none())),
            _ => Err(precondition("There is no generated key to back up")),
        },

        Intent::CompleteProfile { fields } => {
            if data.identity.is_none() {
                return Err(precondition("Create or import a key first"));
            }
            Ok(Handled::success(SessionFacts {
                profile: Some(fields),
                ..SessionFacts::none()
            }))
        }

        Intent::LinkIdentity => {
            let user = legacy_user(data)?;
            let (public_key, proof) = match (&data.identity, &data.authenticated) {
                (Some(identity), _) => (
                    identity.public_key(),
                    LinkProof::SecretKey(identity.secret().clone()),
                ),
                (None, Some(auth)) => (
                    auth.public_key,
                    LinkProof::Session {
                        method: auth.method,
                    },
                ),
                (None, None) => return Err(precondition("There is no key to link")),
            };
            providers
                .keys
                .link_identity(&user.provider_user_id, &public_key.to_hex(), &proof)
                .await?;
            Ok(Handled::success(SessionFacts::linked(LinkRecord {
                public_key,
                linked_at: Utc::now(),
            })))
        }

        Intent::AuthenticateWithIdentity { method, secret } => {
            let auth = providers.keys.authenticate(method, secret).await?;
            let identity = AuthenticatedIdentity {
                public_key: PublicKey::parse(&auth.public_key)?,
                method,
            };
            Ok(Handled::success(SessionFacts::authenticated(identity, None)))
        }

        Intent::StartMigration => Ok(Handled::skip(SessionFacts::none())),
    }
}
