//! Error types for the onboarding flow engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flow::state::{ActionName, FlowKind, Outcome, Step};

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised by identity provider adapters.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("Invalid credentials for provider {provider}")]
    InvalidCredentials { provider: String },

    #[error("Provider {provider} rejected the request: {reason}")]
    Rejected { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Session expired for provider {provider}")]
    SessionExpired { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Public key parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Public key is empty")]
    Empty,

    #[error("Unrecognized public key encoding")]
    UnrecognizedEncoding,

    #[error("Public key has {len} bytes, expected 32")]
    WrongLength { len: usize },
}

/// Engine-level errors. These are configuration or programming faults,
/// never user-facing action failures.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("No transition for {kind} at step {step}: action {action} produced {outcome}")]
    UnmappedOutcome {
        kind: FlowKind,
        step: Step,
        action: ActionName,
        outcome: Outcome,
    },

    #[error("Invalid transition table for {kind}: {reason}")]
    InvalidTable { kind: FlowKind, reason: String },

    #[error("Flow session {id} not found")]
    SessionNotFound { id: Uuid },
}

/// Why a single action failed. Recorded against the action name and never
/// propagated past the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Invalid public key: {0}")]
    Key(#[from] KeyError),

    #[error("Action {action} is not available at step {step}")]
    NotAvailable { action: ActionName, step: Step },

    #[error("{0}")]
    Precondition(String),
}

/// Normalized, serializable error shown by the step that triggered the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({})", self.message, cause),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<&ActionError> for ErrorInfo {
    fn from(err: &ActionError) -> Self {
        match err {
            ActionError::Provider(inner) => {
                let message = match inner {
                    ProviderError::InvalidCredentials { .. } => "Invalid credentials",
                    ProviderError::Timeout { .. } => "The request timed out",
                    ProviderError::SessionExpired { .. } => "Your session has expired",
                    _ => "The identity provider could not complete the request",
                };
                ErrorInfo::new(message).with_cause(inner.to_string())
            }
            ActionError::Key(inner) => {
                ErrorInfo::new("The public key could not be read").with_cause(inner.to_string())
            }
            other => ErrorInfo::new(other.to_string()),
        }
    }
}

impl From<&FlowError> for ErrorInfo {
    fn from(err: &FlowError) -> Self {
        ErrorInfo::new(err.to_string())
    }
}
