//! Flow engine for step-driven identity onboarding sessions.
//!
//! A session belongs to one [`FlowKind`] and walks that kind's
//! [`TransitionTable`]. UI layers send [`Intent`]s to the [`Orchestrator`],
//! which runs the matching handler against the provider adapters, merges
//! the facts it returns into [`SessionData`], and advances, stays, or
//! halts. Every change is published as a [`SessionSnapshot`].

pub mod handlers;
pub mod history;
pub mod intent;
pub mod key;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod routes;
pub mod state;
pub mod table;
pub mod tracker;
pub mod ws;

pub use history::{HistoryEntry, NavigationHistory};
pub use intent::{Intent, IntentRequest};
pub use key::{KeyComparison, KeyEncoding, PublicKey, compare_keys};
pub use model::{DataView, ProfileFields, SessionData, SessionFacts};
pub use orchestrator::{FlowCompletion, FlowListener, Orchestrator, SessionSnapshot};
pub use registry::{SessionRegistry, spawn_expiry_task};
pub use routes::{FlowRouteState, flow_routes};
pub use state::{ActionName, FlowKind, Outcome, SessionStatus, Step};
pub use table::{Transition, TransitionTable};
pub use tracker::{ActionState, ActionTracker};
