use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use routes::{
    assets::serve_asset,
    generate::generate_model,
    liveness::live,
    proxy::{proxy_model, proxy_preflight},
    readiness::ready,
    status::job_status,
};
use tower_http::compression::CompressionLayer;

pub mod api_state;
pub mod error;
mod routes;

#[cfg(test)]
mod tests;

/// Router for the generation API, meant to be nested under `/api`.
pub fn api_routes<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Probes for k8s/systemd
    let probes = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let generation = Router::new()
        .route(
            "/generate",
            post(generate_model).layer(DefaultBodyLimit::max(
                app_state.config.intake_max_body_bytes,
            )),
        )
        .route("/status/{job_id}", get(job_status))
        .route("/proxy-model", get(proxy_model).options(proxy_preflight));

    // Negotiated from the request's `Accept-Encoding`
    probes.merge(generation).layer(CompressionLayer::new())
}

/// Serves objects published to local or in-memory storage under `/assets`.
pub fn asset_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new().route("/assets/{*key}", get(serve_asset))
}
