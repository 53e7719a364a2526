//! Orchestrator: owns one flow session and drives it through its table.
//!
//! UI layers dispatch [`Intent`]s and observe [`SessionSnapshot`]s. At most
//! one action is in flight per session; the session lock is released while
//! the provider call runs so observers keep reading state.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::handlers;
use super::history::{DEFAULT_HISTORY_LIMIT, NavigationHistory};
use super::intent::Intent;
use super::key::PublicKey;
use super::model::{DataView, ProfileFields, SessionData};
use super::state::{ActionName, FlowKind, SessionStatus, Step};
use super::table::TransitionTable;
use super::tracker::{ActionState, ActionTracker};
use crate::error::{ActionError, ErrorInfo, FlowError};
use crate::providers::{AuthMethod, Providers};

/// Reported once when a session reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowCompletion {
    pub id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Callbacks for session end. Invoked after the session lock is released.
pub trait FlowListener: Send + Sync {
    fn on_complete(&self, completion: &FlowCompletion);

    fn on_cancel(&self, _id: Uuid) {}
}

/// Immutable view of a session, published after every change.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub kind: FlowKind,
    pub step: Step,
    pub status: SessionStatus,
    pub can_go_back: bool,
    pub history_depth: usize,
    pub available_actions: Vec<ActionName>,
    pub actions: BTreeMap<ActionName, ActionState>,
    pub data: DataView,
    pub updated_at: DateTime<Utc>,
}

struct FlowSession {
    step: Step,
    data: SessionData,
    history: NavigationHistory,
    tracker: ActionTracker,
    status: SessionStatus,
    /// Bumped by reset and cancel; results from an older epoch are dropped.
    epoch: u64,
    updated_at: DateTime<Utc>,
}

/// An action that has been marked pending and is ready to run.
struct Run {
    intent: Intent,
    step: Step,
    data: SessionData,
    epoch: u64,
}

impl FlowSession {
    fn new(kind: FlowKind, history_limit: usize) -> Self {
        Self {
            step: kind.initial_step(),
            data: SessionData::default(),
            history: NavigationHistory::with_limit(history_limit),
            tracker: ActionTracker::new(),
            status: SessionStatus::Active,
            epoch: 0,
            updated_at: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

pub struct Orchestrator {
    id: Uuid,
    table: TransitionTable,
    providers: Providers,
    session: RwLock<FlowSession>,
    updates: watch::Sender<SessionSnapshot>,
    listener: Option<Arc<dyn FlowListener>>,
}

impl Orchestrator {
    /// Start a session of `kind` with the built-in table.
    pub fn new(kind: FlowKind, providers: Providers) -> Result<Self, FlowError> {
        Self::with_table(TransitionTable::for_kind(kind), providers)
    }

    /// Start a session driven by `table`. The table is validated first.
    pub fn with_table(table: TransitionTable, providers: Providers) -> Result<Self, FlowError> {
        table.validate()?;
        Ok(Self::from_parts(table, providers))
    }

    fn from_parts(table: TransitionTable, providers: Providers) -> Self {
        let id = Uuid::new_v4();
        let session = FlowSession::new(table.kind(), DEFAULT_HISTORY_LIMIT);
        let initial = build_snapshot(id, &table, &session);
        let (updates, _) = watch::channel(initial);
        info!(session_id = %id, kind = %table.kind(), "Flow session started");
        Self {
            id,
            table,
            providers,
            session: RwLock::new(session),
            updates,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn FlowListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.session.get_mut().history = NavigationHistory::with_limit(limit);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> FlowKind {
        self.table.kind()
    }

    pub async fn current_step(&self) -> Step {
        self.session.read().await.step
    }

    pub async fn status(&self) -> SessionStatus {
        self.session.read().await.status.clone()
    }

    pub async fn is_loading(&self, action: ActionName) -> bool {
        self.session.read().await.tracker.is_loading(action)
    }

    pub async fn get_error(&self, action: ActionName) -> Option<ErrorInfo> {
        self.session.read().await.tracker.error(action).cloned()
    }

    pub async fn can_go_back(&self) -> bool {
        let session = self.session.read().await;
        session.tracker.pending_action().is_none() && session.history.can_go_back(session.step)
    }

    pub async fn data(&self) -> DataView {
        self.session.read().await.data.view()
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        self.session.read().await.updated_at
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let session = self.session.read().await;
        build_snapshot(self.id, &self.table, &session)
    }

    /// Receive a new snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    /// Run `intent`, then any entry action of the step it lands on.
    ///
    /// The chain counts as one in-flight unit: the session stays pending
    /// from the first action until the last entry action settles.
    /// Action failures are recorded against the action name and return
    /// `Ok`. Only engine faults are returned as errors.
    pub async fn invoke(&self, intent: Intent) -> Result<(), FlowError> {
        let Some(mut run) = self.begin(intent).await else {
            return Ok(());
        };
        while let Some(next) = self.settle(run).await? {
            run = next;
        }
        Ok(())
    }

    /// Mark the action pending. `None` if it must not run.
    async fn begin(&self, intent: Intent) -> Option<Run> {
        let action = intent.action();
        let mut session = self.session.write().await;
        if !session.status.is_active() {
            debug!(session_id = %self.id, action = %action, status = ?session.status, "Ignoring action on finished session");
            return None;
        }
        if let Some(pending) = session.tracker.pending_action() {
            debug!(session_id = %self.id, action = %action, pending = %pending, "Ignoring action while another is in flight");
            return None;
        }
        if !self.table.allows(session.step, action) {
            let err = ActionError::NotAvailable {
                action,
                step: session.step,
            };
            warn!(session_id = %self.id, error = %err, "Rejected action");
            session.tracker.fail(action, ErrorInfo::from(&err));
            session.touch();
            self.publish(&session);
            return None;
        }
        session.tracker.start(action);
        session.touch();
        self.publish(&session);
        Some(Run {
            intent,
            step: session.step,
            data: session.data.clone(),
            epoch: session.epoch,
        })
    }

    /// Run the handler for a started action and apply its result. Returns
    /// the entry action of the step it lands on, already marked pending.
    async fn settle(&self, run: Run) -> Result<Option<Run>, FlowError> {
        let Run {
            intent,
            step,
            data,
            epoch,
        } = run;
        let action = intent.action();

        debug!(session_id = %self.id, step = %step, action = %action, "Running action");
        let result = handlers::run(intent, &data, &self.providers).await;

        let mut session = self.session.write().await;
        if session.epoch != epoch {
            debug!(session_id = %self.id, action = %action, "Discarding result from a superseded session state");
            return Ok(None);
        }

        let handled = match result {
            Ok(handled) => handled,
            Err(err) => {
                warn!(session_id = %self.id, step = %step, action = %action, error = %err, "Action failed");
                session.tracker.fail(action, ErrorInfo::from(&err));
                session.touch();
                self.publish(&session);
                return Ok(None);
            }
        };

        let Some(to) = self.table.next(step, action, handled.outcome) else {
            let err = FlowError::UnmappedOutcome {
                kind: self.table.kind(),
                step,
                action,
                outcome: handled.outcome,
            };
            error!(session_id = %self.id, error = %err, "Flow halted");
            let info = ErrorInfo::from(&err);
            session.tracker.fail(action, info.clone());
            session.status = SessionStatus::Failed {
                error: info.clone(),
            };
            session.touch();
            self.publish(&session);
            drop(session);
            self.notify_complete(FlowCompletion {
                id: self.id,
                success: false,
                error: Some(info),
            });
            return Err(err);
        };

        let before = session.data.clone();
        session.data.merge(handled.facts);
        if to != step {
            session.history.push(step, before);
        }
        session.step = to;
        session.tracker.succeed(action);
        session.touch();
        info!(
            session_id = %self.id,
            action = %action,
            outcome = %handled.outcome,
            from = %step,
            to = %to,
            "Flow advanced"
        );

        if to.is_terminal() {
            session.status = SessionStatus::Completed;
            self.publish(&session);
            drop(session);
            info!(session_id = %self.id, "Flow completed");
            self.notify_complete(FlowCompletion {
                id: self.id,
                success: true,
                error: None,
            });
            return Ok(None);
        }

        let entry = match to.entry_action() {
            Some(entry) if to != step && self.table.allows(to, entry) => Intent::entry(entry),
            _ => None,
        };
        let Some(entry) = entry else {
            self.publish(&session);
            return Ok(None);
        };
        // Claimed under the same lock so nothing slips in between.
        session.tracker.start(entry.action());
        self.publish(&session);
        Ok(Some(Run {
            intent: entry,
            step: to,
            data: session.data.clone(),
            epoch,
        }))
    }

    /// Return to the previous step and its data. `false` if there is
    /// nowhere to go, the current step is not reversible, or an action is
    /// in flight.
    pub async fn go_back(&self) -> bool {
        let mut session = self.session.write().await;
        if !session.status.is_active() || session.tracker.pending_action().is_some() {
            return false;
        }
        if !session.history.can_go_back(session.step) {
            debug!(session_id = %self.id, step = %session.step, "Back navigation unavailable");
            return false;
        }
        let Some(entry) = session.history.pop() else {
            return false;
        };
        info!(session_id = %self.id, from = %session.step, to = %entry.step, "Navigated back");
        session.step = entry.step;
        session.data = entry.data;
        session.touch();
        self.publish(&session);
        true
    }

    /// Restart the session at the initial step with empty data.
    pub async fn reset(&self) {
        {
            let mut session = self.session.write().await;
            session.epoch += 1;
            session.step = self.table.kind().initial_step();
            session.data = SessionData::default();
            session.history.clear();
            session.tracker.reset();
            session.status = SessionStatus::Active;
            session.touch();
            self.publish(&session);
        }
        info!(session_id = %self.id, "Flow reset");
        self.sign_out_legacy().await;
    }

    /// Abandon the session. Any in-flight result is discarded.
    pub async fn cancel(&self) {
        {
            let mut session = self.session.write().await;
            if !session.status.is_active() {
                return;
            }
            session.epoch += 1;
            session.tracker.reset();
            session.status = SessionStatus::Cancelled;
            session.touch();
            self.publish(&session);
        }
        info!(session_id = %self.id, "Flow cancelled");
        if let Some(listener) = &self.listener {
            listener.on_cancel(self.id);
        }
        self.sign_out_legacy().await;
    }

    async fn sign_out_legacy(&self) {
        if !self.table.kind().uses_legacy_provider() {
            return;
        }
        if let Err(e) = self.providers.legacy.sign_out().await {
            warn!(session_id = %self.id, error = %e, "Legacy sign-out failed");
        }
    }

    fn publish(&self, session: &FlowSession) {
        self.updates
            .send_replace(build_snapshot(self.id, &self.table, session));
    }

    fn notify_complete(&self, completion: FlowCompletion) {
        if let Some(listener) = &self.listener {
            listener.on_complete(&completion);
        }
    }

    // Typed entry points, one per action.

    pub async fn authenticate_with_legacy_provider(
        &self,
        email: impl Into<String>,
        password: SecretString,
    ) -> Result<(), FlowError> {
        self.invoke(Intent::AuthenticateWithLegacyProvider {
            email: email.into(),
            password,
        })
        .await
    }

    pub async fn send_passwordless_link(&self, email: impl Into<String>) -> Result<(), FlowError> {
        self.invoke(Intent::SendPasswordlessLink {
            email: email.into(),
        })
        .await
    }

    pub async fn complete_passwordless_link(
        &self,
        link: impl Into<String>,
    ) -> Result<(), FlowError> {
        self.invoke(Intent::CompletePasswordlessLink { link: link.into() })
            .await
    }

    pub async fn continue_with_existing_session(&self) -> Result<(), FlowError> {
        self.invoke(Intent::ContinueWithExistingSession).await
    }

    pub async fn check_linked_identities(&self) -> Result<(), FlowError> {
        self.invoke(Intent::CheckLinkedIdentities).await
    }

    pub async fn select_linked_identity(&self, public_key: PublicKey) -> Result<(), FlowError> {
        self.invoke(Intent::SelectLinkedIdentity { public_key }).await
    }

    pub async fn authenticate_with_linked_identity(
        &self,
        method: AuthMethod,
        secret: Option<SecretString>,
    ) -> Result<(), FlowError> {
        self.invoke(Intent::AuthenticateWithLinkedIdentity { method, secret })
            .await
    }

    pub async fn use_new_identity(&self) -> Result<(), FlowError> {
        self.invoke(Intent::UseNewIdentity).await
    }

    pub async fn resolve_mismatch_by_retry(
        &self,
        method: AuthMethod,
        secret: Option<SecretString>,
    ) -> Result<(), FlowError> {
        self.invoke(Intent::ResolveMismatchByRetry { method, secret })
            .await
    }

    pub async fn resolve_mismatch_by_relinking(&self) -> Result<(), FlowError> {
        self.invoke(Intent::ResolveMismatchByRelinking).await
    }

    pub async fn generate_identity(&self) -> Result<(), FlowError> {
        self.invoke(Intent::GenerateIdentity).await
    }

    pub async fn import_identity(&self, secret: SecretString) -> Result<(), FlowError> {
        self.invoke(Intent::ImportIdentity { secret }).await
    }

    pub async fn acknowledge_backup(&self) -> Result<(), FlowError> {
        self.invoke(Intent::AcknowledgeBackup).await
    }

    pub async fn complete_profile(&self, fields: ProfileFields) -> Result<(), FlowError> {
        self.invoke(Intent::CompleteProfile { fields }).await
    }

    pub async fn link_identity(&self) -> Result<(), FlowError> {
        self.invoke(Intent::LinkIdentity).await
    }

    pub async fn authenticate_with_identity(
        &self,
        method: AuthMethod,
        secret: Option<SecretString>,
    ) -> Result<(), FlowError> {
        self.invoke(Intent::AuthenticateWithIdentity { method, secret })
            .await
    }

    pub async fn start_migration(&self) -> Result<(), FlowError> {
        self.invoke(Intent::StartMigration).await
    }
}

fn build_snapshot(id: Uuid, table: &TransitionTable, session: &FlowSession) -> SessionSnapshot {
    let can_go_back =
        session.tracker.pending_action().is_none() && session.history.can_go_back(session.step);
    let available_actions = if session.status.is_active() {
        table.actions_at(session.step)
    } else {
        Vec::new()
    };
    SessionSnapshot {
        id,
        kind: table.kind(),
        step: session.step,
        status: session.status.clone(),
        can_go_back: can_go_back && session.status.is_active(),
        history_depth: session.history.len(),
        available_actions,
        actions: session.tracker.entries(),
        data: session.data.view(),
        updated_at: session.updated_at,
    }
}
