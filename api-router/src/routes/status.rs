use axum::{
    extract::{Path, State},
    Json,
};
use common::types::job::{AssetReference, JobStatus, StatusResponse};
use tracing::{debug, info, warn};

use crate::{api_state::ApiState, error::ApiError};

const FALLBACK_WARNING: &str = "Failed to upload to object storage, using temporary URL";

/// Reports a job's status. Completed jobs have their asset copied into the
/// object store once; later calls reuse the published copy.
pub async fn job_status(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    validate_job_id(&job_id)?;

    let status = state.provider.fetch_status(&job_id).await?;
    debug!(
        %job_id,
        status = %status.status,
        progress = ?status.progress,
        "Fetched job status"
    );

    if status.status != JobStatus::Completed {
        return Ok(Json(StatusResponse::in_flight(status)));
    }

    match state.publisher.find_published(&job_id).await {
        Ok(Some(url)) => {
            debug!(%job_id, %url, "Reusing published asset");
            return Ok(Json(StatusResponse::completed(url, None)));
        }
        Ok(None) => {}
        Err(err) => warn!(%job_id, error = %err, "Published asset lookup failed"),
    }

    let asset = state.provider.fetch_result(&job_id).await?;
    Ok(Json(publish_or_fallback(&state, &job_id, asset).await))
}

async fn publish_or_fallback(
    state: &ApiState,
    job_id: &str,
    asset: AssetReference,
) -> StatusResponse {
    let published = async {
        let data = state.provider.download_asset(&asset.url).await?;
        state
            .publisher
            .publish(job_id, data, &asset.file_name, &asset.content_type)
            .await
    }
    .await;

    match published {
        Ok(url) => {
            info!(%job_id, %url, "Asset published");
            StatusResponse::completed(url, None)
        }
        Err(err) => {
            warn!(
                %job_id,
                error = %err,
                provider_url = %asset.url,
                "Falling back to provider URL"
            );
            StatusResponse::completed(asset.url, Some(FALLBACK_WARNING.to_string()))
        }
    }
}

fn validate_job_id(job_id: &str) -> Result<(), ApiError> {
    let well_formed = !job_id.is_empty()
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if well_formed {
        Ok(())
    } else {
        Err(ApiError::ValidationError("Invalid job ID".to_string()))
    }
}
