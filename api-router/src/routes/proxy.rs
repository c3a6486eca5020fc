use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use common::storage::store::ASSET_CACHE_CONTROL;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::{api_state::ApiState, error::ApiError};

const DEFAULT_MODEL_CONTENT_TYPE: &str = "model/gltf-binary";

#[derive(Debug, Deserialize)]
pub struct ProxyParams {
    pub url: Option<String>,
}

/// Re-serves an object-store asset with permissive CORS headers.
pub async fn proxy_model(
    State(state): State<ApiState>,
    Query(params): Query<ProxyParams>,
) -> Result<Response, ApiError> {
    let Some(raw_url) = params.url.filter(|url| !url.trim().is_empty()) else {
        return Err(ApiError::ValidationError(
            "URL parameter is required".to_string(),
        ));
    };

    let target = Url::parse(&raw_url)
        .map_err(|_| ApiError::ValidationError("Invalid URL".to_string()))?;
    let patterns = state.config.proxy_host_patterns();
    if !host_allowed(&target, &patterns) {
        warn!(url = %raw_url, "Rejected proxy request for foreign host");
        return Err(ApiError::ValidationError(
            "Invalid URL - must be from object storage".to_string(),
        ));
    }

    let upstream = state
        .http
        .get(target)
        .send()
        .await
        .map_err(|err| ApiError::InternalError(format!("Failed to proxy model: {err}")))?;

    let status = upstream.status();
    if status.is_redirection() {
        warn!(url = %raw_url, status = status.as_u16(), "Refused to follow upstream redirect");
        return Err(ApiError::Upstream {
            status: StatusCode::BAD_GATEWAY.as_u16(),
            message: format!("Failed to fetch model: {}", status.as_u16()),
        });
    }
    if !status.is_success() {
        return Err(ApiError::Upstream {
            status: status.as_u16(),
            message: format!("Failed to fetch model: {}", status.as_u16()),
        });
    }

    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| HeaderValue::from_bytes(value.as_bytes()).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_MODEL_CONTENT_TYPE));

    let body = upstream
        .bytes()
        .await
        .map_err(|err| ApiError::InternalError(format!("Failed to proxy model: {err}")))?;
    info!(url = %raw_url, bytes = body.len(), "Proxied model");

    let mut headers = cors_headers();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(ASSET_CACHE_CONTROL),
    );

    Ok((StatusCode::OK, headers, body).into_response())
}

/// CORS preflight for the proxy.
pub async fn proxy_preflight() -> impl IntoResponse {
    (StatusCode::OK, cors_headers())
}

fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers
}

/// A host matches a pattern when it equals it or is a subdomain of it.
fn host_allowed(target: &Url, patterns: &[String]) -> bool {
    if !matches!(target.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = target.host_str().map(str::to_ascii_lowercase) else {
        return false;
    };

    patterns.iter().any(|pattern| {
        let pattern = pattern.trim().trim_start_matches('.').to_ascii_lowercase();
        !pattern.is_empty()
            && (host == pattern || host.ends_with(&format!(".{pattern}")))
    })
}
