use axum::{extract::State, Json};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart, TypedMultipartError};
use bytes::Bytes;
use common::{
    types::{job::GenerateResponse, upload::UploadRequest},
    utils::upload_limits::{validate_image_upload, SERVER_IMAGE_TYPES},
};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, TryFromMultipart)]
pub struct GenerateParams {
    // Size is enforced by the route's body limit and upload validation.
    #[form_data(limit = "unlimited")]
    pub image: Option<FieldData<Bytes>>,
}

/// Validates the uploaded image and submits it to the generation provider.
pub async fn generate_model(
    State(state): State<ApiState>,
    form: Result<TypedMultipart<GenerateParams>, TypedMultipartError>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let TypedMultipart(input) = form?;
    let Some(image) = input.image else {
        return Err(ApiError::ValidationError(
            "No image file provided".to_string(),
        ));
    };

    let upload = UploadRequest::new(
        image.contents,
        image.metadata.content_type.unwrap_or_default(),
        image.metadata.file_name.unwrap_or_else(|| "image".to_string()),
    );

    info!(
        file_name = %upload.file_name,
        content_type = %upload.content_type,
        bytes = upload.len(),
        "Received generation request"
    );

    validate_image_upload(&upload, SERVER_IMAGE_TYPES, state.config.intake_max_image_bytes)?;

    let job_id = state.provider.submit(&upload).await?;
    info!(%job_id, "Generation job submitted");

    Ok(Json(GenerateResponse { job_id }))
}
