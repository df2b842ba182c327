// event recommendation api

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use shuttle_runtime::SecretStore;
use tracing::info;

use eventpilot::api::{build_router, SessionRegistry};
use eventpilot::config::{self, AppConfig};
use eventpilot::reasoning::OpenAiReasoningService;
use eventpilot::store::HttpEventStore;

// shuttle entry point
#[shuttle_runtime::main]
async fn axum(#[shuttle_runtime::Secrets] secret_store: SecretStore) -> ShuttleAxum {
    info!("Starting event recommendation API v1.0");

    configure_from_secrets(&secret_store);

    let registry = build_registry().map_err(|e| {
        tracing::error!("Configuration validation failed: {:#}", e);
        shuttle_runtime::Error::Custom(e)
    })?;
    info!("All required configuration validated");

    let router = build_router(registry);
    Ok(router.into())
}

// load secrets into env vars
fn configure_from_secrets(secret_store: &SecretStore) {
    for key in config::SECRET_KEYS {
        if let Some(value) = secret_store.get(key) {
            std::env::set_var(key, value);
            info!("{} configured from secrets", key);
        } else if config::REQUIRED_KEYS.contains(&key) {
            tracing::warn!("{} not found in secrets - API calls will fail", key);
        }
    }
}

// check required env vars and wire collaborators
fn build_registry() -> anyhow::Result<SessionRegistry> {
    let missing = config::missing_required_keys();
    if !missing.is_empty() {
        anyhow::bail!(
            "Missing required configuration: {}. Please set it in Secrets.toml",
            missing.join(", ")
        );
    }

    let app_config = AppConfig::from_env()?;
    let event_store =
        HttpEventStore::new(&app_config.events_api_url, app_config.api_timeout_seconds)
            .context("Failed to set up event store client")?;
    let reasoning = OpenAiReasoningService::from_env(&app_config.reasoning)
        .context("Failed to initialize AI service")?;

    info!(
        max_distance_km = app_config.selector.max_distance_km,
        max_candidates = app_config.selector.max_candidates,
        "Candidate selection configured"
    );

    Ok(SessionRegistry::new(
        Arc::new(event_store),
        Arc::new(reasoning),
        app_config.selector,
    )
    .with_max_sessions(app_config.max_sessions))
}
