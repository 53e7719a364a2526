//! Intents: an action name plus the payload its handler needs.

use secrecy::SecretString;
use serde::Deserialize;

use super::key::PublicKey;
use super::model::ProfileFields;
use super::state::ActionName;
use crate::providers::AuthMethod;

/// A request from a UI step to run one action.
#[derive(Debug, Clone)]
pub enum Intent {
    AuthenticateWithLegacyProvider { email: String, password: SecretString },
    SendPasswordlessLink { email: String },
    CompletePasswordlessLink { link: String },
    ContinueWithExistingSession,
    CheckLinkedIdentities,
    SelectLinkedIdentity { public_key: PublicKey },
    AuthenticateWithLinkedIdentity { method: AuthMethod, secret: Option<SecretString> },
    UseNewIdentity,
    ResolveMismatchByRetry { method: AuthMethod, secret: Option<SecretString> },
    ResolveMismatchByRelinking,
    GenerateIdentity,
    ImportIdentity { secret: SecretString },
    AcknowledgeBackup,
    CompleteProfile { fields: ProfileFields },
    LinkIdentity,
    AuthenticateWithIdentity { method: AuthMethod, secret: Option<SecretString> },
    StartMigration,
}

impl Intent {
    pub fn action(&self) -> ActionName {
        match self {
            Self::AuthenticateWithLegacyProvider { .. } => ActionName::AuthenticateWithLegacyProvider,
            Self::SendPasswordlessLink { .. } => ActionName::SendPasswordlessLink,
            Self::CompletePasswordlessLink { .. } => ActionName::CompletePasswordlessLink,
            Self::ContinueWithExistingSession => ActionName::ContinueWithExistingSession,
            Self::CheckLinkedIdentities => ActionName::CheckLinkedIdentities,
            Self::SelectLinkedIdentity { .. } => ActionName::SelectLinkedIdentity,
            Self::AuthenticateWithLinkedIdentity { .. } => ActionName::AuthenticateWithLinkedIdentity,
            Self::UseNewIdentity => ActionName::UseNewIdentity,
            Self::ResolveMismatchByRetry { .. } => ActionName::ResolveMismatchByRetry,
            Self::ResolveMismatchByRelinking => ActionName::ResolveMismatchByRelinking,
            Self::GenerateIdentity => ActionName::GenerateIdentity,
            Self::ImportIdentity { .. } => ActionName::ImportIdentity,
            Self::AcknowledgeBackup => ActionName::AcknowledgeBackup,
            Self::CompleteProfile { .. } => ActionName::CompleteProfile,
            Self::LinkIdentity => ActionName::LinkIdentity,
            Self::AuthenticateWithIdentity { .. } => ActionName::AuthenticateWithIdentity,
            Self::StartMigration => ActionName::StartMigration,
        }
    }

    /// The payload-free intent a step runs on entry.
    pub fn entry(action: ActionName) -> Option<Intent> {
        match action {
            ActionName::CheckLinkedIdentities => Some(Self::CheckLinkedIdentities),
            ActionName::LinkIdentity => Some(Self::LinkIdentity),
            _ => None,
        }
    }
}

/// Wire form of an [`Intent`], tagged by `action`. Secrets arrive as plain
/// strings and are wrapped on conversion.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IntentRequest {
    AuthenticateWithLegacyProvider { email: String, password: String },
    SendPasswordlessLink { email: String },
    CompletePasswordlessLink { link: String },
    ContinueWithExistingSession,
    CheckLinkedIdentities,
    SelectLinkedIdentity { public_key: PublicKey },
    AuthenticateWithLinkedIdentity {
        method: AuthMethod,
        #[serde(default)]
        secret: Option<String>,
    },
    UseNewIdentity,
    ResolveMismatchByRetry {
        method: AuthMethod,
        #[serde(default)]
        secret: Option<String>,
    },
    ResolveMismatchByRelinking,
    GenerateIdentity,
    ImportIdentity { secret: String },
    AcknowledgeBackup,
    CompleteProfile {
        #[serde(default)]
        fields: ProfileFields,
    },
    LinkIdentity,
    AuthenticateWithIdentity {
        method: AuthMethod,
        #[serde(default)]
        secret: Option<String>,
    },
    StartMigration,
}

fn secret(value: String) -> SecretString {
    SecretString::from(value)
}

impl From<IntentRequest> for Intent {
    fn from(req: IntentRequest) -> Self {
        match req {
            IntentRequest::AuthenticateWithLegacyProvider { email, password } => {
                Self::AuthenticateWithLegacyProvider {
                    email,
                    password: secret(password),
                }
            }
            IntentRequest::SendPasswordlessLink { email } => Self::SendPasswordlessLink { email },
            IntentRequest::CompletePasswordlessLink { link } => {
                Self::CompletePasswordlessLink { link }
            }
            IntentRequest::ContinueWithExistingSession => Self::ContinueWithExistingSession,
            IntentRequest::CheckLinkedIdentities => Self::CheckLinkedIdentities,
            IntentRequest::SelectLinkedIdentity { public_key } => {
                Self::SelectLinkedIdentity { public_key }
            }
            IntentRequest::AuthenticateWithLinkedIdentity { method, secret: s } => {
                Self::AuthenticateWithLinkedIdentity {
                    method,
                    secret: s.map(secret),
                }
            }
            IntentRequest::UseNewIdentity => Self::UseNewIdentity,
            IntentRequest::ResolveMismatchByRetry { method, secret: s } => {
                Self::ResolveMismatchByRetry {
                    method,
                    secret: s.map(secret),
                }
            }
            IntentRequest::ResolveMismatchByRelinking => Self::ResolveMismatchByRelinking,
            IntentRequest::GenerateIdentity => Self::GenerateIdentity,
            IntentRequest::ImportIdentity { secret: s } => Self::ImportIdentity { secret: secret(s) },
            IntentRequest::AcknowledgeBackup => Self::AcknowledgeBackup,
            IntentRequest::CompleteProfile { fields } => Self::CompleteProfile { fields },
            IntentRequest::LinkIdentity => Self::LinkIdentity,
            IntentRequest::AuthenticateWithIdentity { method, secret: s } => {
                Self::AuthenticateWithIdentity {
                    method,
                    secret: s.map(secret),
                }
            }
            IntentRequest::StartMigration => Self::StartMigration,
        }
    }
}
