use std::sync::Arc;

use anyhow::Context;
use onboard_flow::config::FlowConfig;
use onboard_flow::flow::{FlowCompletion, FlowListener, SessionRegistry, flow_routes, spawn_expiry_task};
use onboard_flow::providers::{InMemoryKeyProvider, InMemoryLegacyProvider, Providers};
use uuid::Uuid;

/// Logs session outcomes.
struct LogListener;

impl FlowListener for LogListener {
    fn on_complete(&self, completion: &FlowCompletion) {
        match &completion.error {
            None => tracing::info!(session_id = %completion.id, success = completion.success, "Flow session finished"),
            Some(error) => tracing::warn!(
                session_id = %completion.id,
                success = completion.success,
                error = %error,
                "Flow session finished"
            ),
        }
    }

    fn on_cancel(&self, id: Uuid) {
        tracing::info!(session_id = %id, "Flow session cancelled");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = FlowConfig::from_env().context("Failed to read configuration")?;

    eprintln!("Onboard Flow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}/api/flows", config.listen_addr());
    eprintln!("   WS:  ws://{}/api/flows/{{id}}/ws", config.listen_addr());
    eprintln!("   Providers: in-memory");

    // ── Providers ───────────────────────────────────────────────────────
    let legacy = InMemoryLegacyProvider::new();
    let keys = InMemoryKeyProvider::new();
    if let Ok(email) = std::env::var("ONBOARD_FLOW_DEMO_EMAIL") {
        let password = std::env::var("ONBOARD_FLOW_DEMO_PASSWORD").unwrap_or_default();
        let user = legacy.register_account(&email, &password).await;
        tracing::info!(user_id = %user.provider_user_id, "Demo legacy account registered");
    }
    let providers = Providers::new(legacy, keys);

    // ── Sessions ────────────────────────────────────────────────────────
    let registry = SessionRegistry::with_listener(providers, &config, Arc::new(LogListener));
    let _expiry_handle = spawn_expiry_task(Arc::clone(&registry), config.sweep_interval);

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = flow_routes(registry);
    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr()))?;
    tracing::info!(addr = %config.listen_addr(), "Flow server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
