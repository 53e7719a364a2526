//! Live flow sessions by id, with idle expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::orchestrator::{FlowListener, Orchestrator};
use super::state::FlowKind;
use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::providers::Providers;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Orchestrator>>>,
    providers: Providers,
    history_limit: usize,
    idle_timeout: Duration,
    listener: Option<Arc<dyn FlowListener>>,
}

impl SessionRegistry {
    pub fn new(providers: Providers, config: &FlowConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            providers,
            history_limit: config.history_limit,
            idle_timeout: config.session_idle_timeout,
            listener: None,
        })
    }

    /// Same as [`SessionRegistry::new`], attaching `listener` to every session.
    pub fn with_listener(
        providers: Providers,
        config: &FlowConfig,
        listener: Arc<dyn FlowListener>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            providers,
            history_limit: config.history_limit,
            idle_timeout: config.session_idle_timeout,
            listener: Some(listener),
        })
    }

    /// Start a new session of `kind`.
    pub async fn create(&self, kind: FlowKind) -> Result<Arc<Orchestrator>, FlowError> {
        let mut flow = Orchestrator::new(kind, self.providers.clone())?
            .with_history_limit(self.history_limit);
        if let Some(listener) = &self.listener {
            flow = flow.with_listener(Arc::clone(listener));
        }
        let flow = Arc::new(flow);
        self.sessions
            .write()
            .await
            .insert(flow.id(), Arc::clone(&flow));
        Ok(flow)
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Orchestrator>, FlowError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(FlowError::SessionNotFound { id })
    }

    /// Cancel and forget a session.
    pub async fn remove(&self, id: Uuid) -> Result<(), FlowError> {
        let flow = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or(FlowError::SessionNotFound { id })?;
        flow.cancel().await;
        info!(session_id = %id, "Flow session removed");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Cancel and drop sessions idle for longer than the configured timeout.
    /// Returns how many were pruned.
    pub async fn prune_idle(&self) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(self.idle_timeout)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
        else {
            return 0;
        };

        let candidates: Vec<Arc<Orchestrator>> =
            self.sessions.read().await.values().cloned().collect();
        let mut expired = Vec::new();
        for flow in candidates {
            if flow.last_activity().await < cutoff {
                expired.push(flow.id());
            }
        }
        if expired.is_empty() {
            return 0;
        }

        let removed: Vec<Arc<Orchestrator>> = {
            let mut sessions = self.sessions.write().await;
            expired.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for flow in &removed {
            debug!(session_id = %flow.id(), "Expiring idle flow session");
            flow.cancel().await;
        }
        info!(count = removed.len(), "Pruned idle flow sessions");
        removed.len()
    }
}

/// Periodically prune idle sessions.
pub fn spawn_expiry_task(
    registry: Arc<SessionRegistry>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            registry.prune_idle().await;
        }
    })
}
