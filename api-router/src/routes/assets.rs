use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use common::storage::store::ASSET_CACHE_CONTROL;
use tracing::warn;

use crate::{api_state::ApiState, error::ApiError};

/// Streams a stored asset. Only reachable when a storage backend is wired in,
/// which is how local and in-memory backends expose their public URLs.
pub async fn serve_asset(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let Some(storage) = state.storage.as_ref() else {
        return Err(ApiError::NotFound("Asset storage is not available".to_string()));
    };

    if key.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return Err(ApiError::NotFound(format!("Asset {key} not found")));
    }

    let stream = match storage.get_stream(&key).await {
        Ok(stream) => stream,
        Err(object_store::Error::NotFound { .. }) => {
            return Err(ApiError::NotFound(format!("Asset {key} not found")));
        }
        Err(err) => {
            warn!(%key, error = %err, "Failed to open stored asset");
            return Err(ApiError::InternalError(err.to_string()));
        }
    };

    let content_type = mime_guess::from_path(&key)
        .first_raw()
        .map(HeaderValue::from_static)
        .unwrap_or_else(|| model_content_type(&key));

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(ASSET_CACHE_CONTROL),
    );

    Ok(response)
}

fn model_content_type(key: &str) -> HeaderValue {
    if key.to_ascii_lowercase().ends_with(".gltf") {
        HeaderValue::from_static("model/gltf+json")
    } else if key.to_ascii_lowercase().ends_with(".glb") {
        HeaderValue::from_static("model/gltf-binary")
    } else {
        HeaderValue::from_static("application/octet-stream")
    }
}
