use std::sync::Arc;

use api_router::{api_routes, api_state::ApiState, asset_routes};
use axum::{extract::FromRef, Router};
use common::{
    error::AppError,
    provider::{FalClient, GenerationProvider},
    storage::store::{StorageManager, UnconfiguredPublisher},
    utils::config::{get_config, AppConfig},
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    // Fail fast without a provider credential
    let provider = FalClient::new(&config)?;
    provider.ensure_configured()?;
    info!(
        model = %config.fal_model_id,
        base_url = %config.fal_base_url,
        "Generation provider configured"
    );

    let app = build_app(&config, Arc::new(provider)).await?;

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wires storage and routes. Object storage problems downgrade to provider
/// URLs with a warning rather than stopping the server.
async fn build_app(
    config: &AppConfig,
    provider: Arc<dyn GenerationProvider>,
) -> Result<Router, AppError> {
    let api_state = match StorageManager::new(config).await {
        Ok(storage) => ApiState::new(config, provider, storage)?,
        Err(err) => {
            warn!(
                error = %err,
                "Object storage unavailable, completed jobs will use provider URLs"
            );
            ApiState::with_publisher(
                config,
                provider,
                Arc::new(UnconfiguredPublisher::new(err.to_string())),
            )?
        }
    };

    Ok(Router::new()
        .nest("/api", api_routes(&api_state))
        .merge(asset_routes())
        .with_state(AppState { api_state }))
}

#[derive(Clone, FromRef)]
struct AppState {
    api_state: ApiState,
}
