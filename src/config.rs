//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::flow::history::{DEFAULT_HISTORY_LIMIT, min_history_limit};

/// Flow service configuration.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Address the HTTP server binds to.
    pub bind: String,
    pub port: u16,
    /// Maximum remembered steps per session for back navigation. Never
    /// below the longest forward path of a built-in flow.
    pub history_limit: usize,
    /// Sessions untouched for this long are cancelled and dropped.
    pub session_idle_timeout: Duration,
    /// How often idle sessions are swept.
    pub sweep_interval: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            history_limit: DEFAULT_HISTORY_LIMIT,
            session_idle_timeout: Duration::from_secs(1800), // 30 minutes
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl FlowConfig {
    /// Read `ONBOARD_FLOW_*` variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let history_limit = parse(&lookup, "ONBOARD_FLOW_HISTORY_LIMIT")?
            .unwrap_or(defaults.history_limit);
        if history_limit < min_history_limit() {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARD_FLOW_HISTORY_LIMIT".to_string(),
                message: format!("must be at least {}", min_history_limit()),
            });
        }
        Ok(Self {
            bind: lookup("ONBOARD_FLOW_BIND").unwrap_or(defaults.bind),
            port: parse(&lookup, "ONBOARD_FLOW_PORT")?.unwrap_or(defaults.port),
            history_limit,
            session_idle_timeout: parse(&lookup, "ONBOARD_FLOW_SESSION_IDLE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_idle_timeout),
            sweep_interval: parse(&lookup, "ONBOARD_FLOW_SWEEP_INTERVAL_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}
