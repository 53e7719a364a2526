//! Transition tables: which step follows which action outcome, per flow.

use std::collections::HashMap;

use super::state::{ActionName, FlowKind, Outcome, Step};
use crate::error::FlowError;

/// One declarative row: `(from, action, outcome) → to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Step,
    pub action: ActionName,
    pub outcome: Outcome,
    pub to: Step,
}

const fn row(from: Step, action: ActionName, outcome: Outcome, to: Step) -> Transition {
    Transition {
        from,
        action,
        outcome,
        to,
    }
}

const SIGNUP: &[Transition] = {
    use ActionName::*;
    use Outcome::*;
    use Step::*;
    &[
        row(KeySetup, GenerateIdentity, Success, KeyBackup),
        row(KeySetup, ImportIdentity, Success, ProfileSetup),
        row(KeyBackup, AcknowledgeBackup, Success, ProfileSetup),
        row(ProfileSetup, CompleteProfile, Success, Complete),
    ]
};

/// Legacy account → public-key identity. Shared by the migration flow and
/// the direct-login detour.
const MIGRATION: &[Transition] = {
    use ActionName::*;
    use Outcome::*;
    use Step::*;
    &[
        row(LegacyAuth, AuthenticateWithLegacyProvider, Success, CheckingLinks),
        row(LegacyAuth, ContinueWithExistingSession, Success, CheckingLinks),
        row(LegacyAuth, SendPasswordlessLink, Success, EmailSent),
        row(EmailSent, SendPasswordlessLink, Success, EmailSent),
        row(EmailSent, CompletePasswordlessLink, Success, CheckingLinks),
        row(CheckingLinks, CheckLinkedIdentities, NoLinkedIdentities, ProfileSetup),
        row(CheckingLinks, CheckLinkedIdentities, OneOrMoreLinkedIdentities, LinkedIdentityAuth),
        row(LinkedIdentityAuth, SelectLinkedIdentity, Success, LinkedIdentityAuth),
        row(LinkedIdentityAuth, AuthenticateWithLinkedIdentity, KeyMatches, Linking),
        row(LinkedIdentityAuth, AuthenticateWithLinkedIdentity, KeyMismatch, IdentityMismatch),
        row(LinkedIdentityAuth, UseNewIdentity, Skip, ProfileSetup),
        row(IdentityMismatch, ResolveMismatchByRetry, KeyMatches, Linking),
        row(IdentityMismatch, ResolveMismatchByRetry, KeyMismatch, IdentityMismatch),
        row(IdentityMismatch, ResolveMismatchByRelinking, Success, Complete),
        row(ProfileSetup, GenerateIdentity, Success, ProfileSetup),
        row(ProfileSetup, ImportIdentity, Success, ProfileSetup),
        row(ProfileSetup, CompleteProfile, Success, Linking),
        row(Linking, LinkIdentity, Success, Complete),
    ]
};

const DIRECT_LOGIN: &[Transition] = {
    use ActionName::*;
    use Outcome::*;
    use Step::*;
    &[
        row(IdentityAuth, AuthenticateWithIdentity, Success, Complete),
        row(IdentityAuth, StartMigration, Skip, LegacyAuth),
    ]
};

/// Lookup table for one [`FlowKind`].
#[derive(Debug, Clone)]
pub struct TransitionTable {
    kind: FlowKind,
    rows: Vec<Transition>,
    index: HashMap<(Step, ActionName, Outcome), Step>,
}

impl TransitionTable {
    /// The built-in table for `kind`.
    pub fn for_kind(kind: FlowKind) -> Self {
        let rows: Vec<Transition> = match kind {
            FlowKind::Signup => SIGNUP.to_vec(),
            FlowKind::LegacyMigration => MIGRATION.to_vec(),
            FlowKind::DirectLogin => DIRECT_LOGIN.iter().chain(MIGRATION).copied().collect(),
        };
        Self::from_rows(kind, rows)
    }

    /// Build a table from explicit rows. Later rows win on duplicate keys.
    pub fn from_rows(kind: FlowKind, rows: Vec<Transition>) -> Self {
        let index = rows
            .iter()
            .map(|t| ((t.from, t.action, t.outcome), t.to))
            .collect();
        Self { kind, rows, index }
    }

    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    pub fn rows(&self) -> &[Transition] {
        &self.rows
    }

    /// Next step for `outcome` of `action` taken at `step`.
    pub fn next(&self, step: Step, action: ActionName, outcome: Outcome) -> Option<Step> {
        self.index.get(&(step, action, outcome)).copied()
    }

    /// Whether `action` is offered at `step`.
    pub fn allows(&self, step: Step, action: ActionName) -> bool {
        self.rows.iter().any(|t| t.from == step && t.action == action)
    }

    /// Actions offered at `step`, in declaration order.
    pub fn actions_at(&self, step: Step) -> Vec<ActionName> {
        let mut actions = Vec::new();
        for t in self.rows.iter().filter(|t| t.from == step) {
            if !actions.contains(&t.action) {
                actions.push(t.action);
            }
        }
        actions
    }

    /// Check the table is total and consistent with its flow kind.
    pub fn validate(&self) -> Result<(), FlowError> {
        let invalid = |reason: String| FlowError::InvalidTable {
            kind: self.kind,
            reason,
        };

        if !self.kind.defines(self.kind.initial_step()) {
            return Err(invalid(format!(
                "initial step {} is not defined",
                self.kind.initial_step()
            )));
        }

        for t in &self.rows {
            for step in [t.from, t.to] {
                if !self.kind.defines(step) {
                    return Err(invalid(format!("step {step} is not part of the flow")));
                }
            }
            if t.from.is_terminal() {
                return Err(invalid(format!("terminal step {} has an exit", t.from)));
            }
            if !t.action.outcomes().contains(&t.outcome) {
                return Err(invalid(format!(
                    "{} never produces {} (at {})",
                    t.action, t.outcome, t.from
                )));
            }
            for outcome in t.action.outcomes() {
                if self.next(t.from, t.action, *outcome).is_none() {
                    return Err(invalid(format!(
                        "{} at {} has no transition for {}",
                        t.action, t.from, outcome
                    )));
                }
            }
        }

        for step in self.kind.steps() {
            if !step.is_terminal() && self.actions_at(*step).is_empty() {
                return Err(invalid(format!("step {step} offers no actions")));
            }
            if let Some(entry) = step.entry_action()
                && !self.allows(*step, entry)
            {
                return Err(invalid(format!(
                    "step {step} does not offer its entry action {entry}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_tables_are_valid() {
        for kind in FlowKind::ALL {
            let table = TransitionTable::for_kind(kind);
            if let Err(e) = table.validate() {
                panic!("{kind} table invalid: {e}");
            }
        }
    }

    #[test]
    fn linked_identity_branching() {
        let table = TransitionTable::for_kind(FlowKind::LegacyMigration);
        assert_eq!(
            table.next(
                Step::CheckingLinks,
                ActionName::CheckLinkedIdentities,
                Outcome::NoLinkedIdentities
            ),
            Some(Step::ProfileSetup)
        );
        assert_eq!(
            table.next(
                Step::CheckingLinks,
                ActionName::CheckLinkedIdentities,
                Outcome::OneOrMoreLinkedIdentities
            ),
            Some(Step::LinkedIdentityAuth)
        );
    }

    #[test]
    fn mismatch_retry_stays_on_resolution_step() {
        let table = TransitionTable::for_kind(FlowKind::DirectLogin);
        assert_eq!(
            table.next(
                Step::IdentityMismatch,
                ActionName::ResolveMismatchByRetry,
                Outcome::KeyMismatch
            ),
            Some(Step::IdentityMismatch)
        );
        assert_eq!(
            table.next(
                Step::IdentityMismatch,
                ActionName::ResolveMismatchByRelinking,
                Outcome::Success
            ),
            Some(Step::Complete)
        );
    }

    #[test]
    fn signup_profile_completes_without_linking() {
        let table = TransitionTable::for_kind(FlowKind::Signup);
        assert_eq!(
            table.next(Step::ProfileSetup, ActionName::CompleteProfile, Outcome::Success),
            Some(Step::Complete)
        );
        assert!(!table.allows(Step::ProfileSetup, ActionName::GenerateIdentity));
    }

    #[test]
    fn actions_at_step_in_declaration_order() {
        let table = TransitionTable::for_kind(FlowKind::LegacyMigration);
        assert_eq!(
            table.actions_at(Step::LegacyAuth),
            vec![
                ActionName::AuthenticateWithLegacyProvider,
                ActionName::ContinueWithExistingSession,
                ActionName::SendPasswordlessLink,
            ]
        );
        assert!(table.actions_at(Step::Complete).is_empty());
    }

    #[test]
    fn validate_rejects_partial_branching() {
        let rows = TransitionTable::for_kind(FlowKind::LegacyMigration)
            .rows()
            .iter()
            .copied()
            .filter(|t| t.outcome != Outcome::KeyMismatch)
            .collect();
        let table = TransitionTable::from_rows(FlowKind::LegacyMigration, rows);
        assert!(matches!(
            table.validate(),
            Err(FlowError::InvalidTable { .. })
        ));
    }

    #[test]
    fn validate_rejects_foreign_steps() {
        let mut rows = SIGNUP.to_vec();
        rows.push(row(
            Step::KeyBackup,
            ActionName::StartMigration,
            Outcome::Skip,
            Step::LegacyAuth,
        ));
        let table = TransitionTable::from_rows(FlowKind::Signup, rows);
        assert!(table.validate().is_err());
    }
}
