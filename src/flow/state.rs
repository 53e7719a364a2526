//! Flow vocabulary: kinds, steps, action names and outcomes.

use serde::{Deserialize, Serialize};

/// The three identity journeys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// Fresh signup with a new or imported public-key identity.
    Signup,
    /// Moving a legacy email/password account onto a public-key identity.
    LegacyMigration,
    /// Public-key login, with an optional detour through migration.
    DirectLogin,
}

impl FlowKind {
    pub const ALL: [FlowKind; 3] = [Self::Signup, Self::LegacyMigration, Self::DirectLogin];

    /// The step every session of this kind starts on.
    pub fn initial_step(&self) -> Step {
        match self {
            Self::Signup => Step::KeySetup,
            Self::LegacyMigration => Step::LegacyAuth,
            Self::DirectLogin => Step::IdentityAuth,
        }
    }

    /// Steps defined for this kind.
    pub fn steps(&self) -> &'static [Step] {
        use Step::*;
        match self {
            Self::Signup => &[KeySetup, KeyBackup, ProfileSetup, Complete],
            Self::LegacyMigration => &[
                LegacyAuth,
                EmailSent,
                CheckingLinks,
                LinkedIdentityAuth,
                IdentityMismatch,
                ProfileSetup,
                Linking,
                Complete,
            ],
            Self::DirectLogin => &[
                IdentityAuth,
                LegacyAuth,
                EmailSent,
                CheckingLinks,
                LinkedIdentityAuth,
                IdentityMismatch,
                ProfileSetup,
                Linking,
                Complete,
            ],
        }
    }

    /// Whether `step` belongs to this kind.
    pub fn defines(&self, step: Step) -> bool {
        self.steps().contains(&step)
    }

    /// Whether sessions of this kind sign in to the legacy provider.
    pub fn uses_legacy_provider(&self) -> bool {
        !matches!(self, Self::Signup)
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Signup => "signup",
            Self::LegacyMigration => "legacy_migration",
            Self::DirectLogin => "direct_login",
        };
        write!(f, "{s}")
    }
}

/// A wizard step. Which steps exist depends on the [`FlowKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    KeySetup,
    KeyBackup,
    IdentityAuth,
    LegacyAuth,
    EmailSent,
    CheckingLinks,
    LinkedIdentityAuth,
    IdentityMismatch,
    ProfileSetup,
    Linking,
    Complete,
}

impl Step {
    /// Whether back navigation is allowed while this step is current.
    ///
    /// Leaving `Linking` or `Complete` backwards could strand the two
    /// identity systems in a half-relinked state.
    pub fn is_reversible(&self) -> bool {
        !matches!(self, Self::Linking | Self::Complete)
    }

    /// Whether the flow is finished once it reaches this step.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Action run automatically right after a forward transition into this step.
    pub fn entry_action(&self) -> Option<ActionName> {
        match self {
            Self::CheckingLinks => Some(ActionName::CheckLinkedIdentities),
            Self::Linking => Some(ActionName::LinkIdentity),
            _ => None,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::KeySetup => "key_setup",
            Self::KeyBackup => "key_backup",
            Self::IdentityAuth => "identity_auth",
            Self::LegacyAuth => "legacy_auth",
            Self::EmailSent => "email_sent",
            Self::CheckingLinks => "checking_links",
            Self::LinkedIdentityAuth => "linked_identity_auth",
            Self::IdentityMismatch => "identity_mismatch",
            Self::ProfileSetup => "profile_setup",
            Self::Linking => "linking",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Name of an asynchronous action a step can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    AuthenticateWithLegacyProvider,
    SendPasswordlessLink,
    CompletePasswordlessLink,
    ContinueWithExistingSession,
    CheckLinkedIdentities,
    SelectLinkedIdentity,
    AuthenticateWithLinkedIdentity,
    UseNewIdentity,
    ResolveMismatchByRetry,
    ResolveMismatchByRelinking,
    GenerateIdentity,
    ImportIdentity,
    AcknowledgeBackup,
    CompleteProfile,
    LinkIdentity,
    AuthenticateWithIdentity,
    StartMigration,
}

impl ActionName {
    pub const ALL: [ActionName; 17] = [
        Self::AuthenticateWithLegacyProvider,
        Self::SendPasswordlessLink,
        Self::CompletePasswordlessLink,
        Self::ContinueWithExistingSession,
        Self::CheckLinkedIdentities,
        Self::SelectLinkedIdentity,
        Self::AuthenticateWithLinkedIdentity,
        Self::UseNewIdentity,
        Self::ResolveMismatchByRetry,
        Self::ResolveMismatchByRelinking,
        Self::GenerateIdentity,
        Self::ImportIdentity,
        Self::AcknowledgeBackup,
        Self::CompleteProfile,
        Self::LinkIdentity,
        Self::AuthenticateWithIdentity,
        Self::StartMigration,
    ];

    /// Every outcome this action's handler may report on success.
    pub fn outcomes(&self) -> &'static [Outcome] {
        use Outcome::*;
        match self {
            Self::CheckLinkedIdentities => &[NoLinkedIdentities, OneOrMoreLinkedIdentities],
            Self::AuthenticateWithLinkedIdentity | Self::ResolveMismatchByRetry => {
                &[KeyMatches, KeyMismatch]
            }
            Self::UseNewIdentity | Self::StartMigration => &[Skip],
            _ => &[Success],
        }
    }
}

impl std::fmt::Display for ActionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AuthenticateWithLegacyProvider => "authenticate_with_legacy_provider",
            Self::SendPasswordlessLink => "send_passwordless_link",
            Self::CompletePasswordlessLink => "complete_passwordless_link",
            Self::ContinueWithExistingSession => "continue_with_existing_session",
            Self::CheckLinkedIdentities => "check_linked_identities",
            Self::SelectLinkedIdentity => "select_linked_identity",
            Self::AuthenticateWithLinkedIdentity => "authenticate_with_linked_identity",
            Self::UseNewIdentity => "use_new_identity",
            Self::ResolveMismatchByRetry => "resolve_mismatch_by_retry",
            Self::ResolveMismatchByRelinking => "resolve_mismatch_by_relinking",
            Self::GenerateIdentity => "generate_identity",
            Self::ImportIdentity => "import_identity",
            Self::AcknowledgeBackup => "acknowledge_backup",
            Self::CompleteProfile => "complete_profile",
            Self::LinkIdentity => "link_identity",
            Self::AuthenticateWithIdentity => "authenticate_with_identity",
            Self::StartMigration => "start_migration",
        };
        write!(f, "{s}")
    }
}

/// Branch-relevant result of a successful action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Skip,
    NoLinkedIdentities,
    OneOrMoreLinkedIdentities,
    KeyMatches,
    KeyMismatch,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Skip => "skip",
            Self::NoLinkedIdentities => "no_linked_identities",
            Self::OneOrMoreLinkedIdentities => "one_or_more_linked_identities",
            Self::KeyMatches => "key_matches",
            Self::KeyMismatch => "key_mismatch",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle of a whole session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
    Failed { error: crate::error::ErrorInfo },
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}
