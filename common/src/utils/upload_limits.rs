use crate::{error::AppError, types::upload::UploadRequest};

/// Image types the service forwards to the provider.
pub const SERVER_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

/// Image types the client accepts before upload. The server set is narrower.
pub const CLIENT_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/avif",
];

pub fn validate_image_upload(
    upload: &UploadRequest,
    allowed_types: &[&str],
    max_bytes: usize,
) -> Result<(), AppError> {
    let declared = upload
        .content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if !allowed_types.contains(&declared.as_str()) {
        return Err(AppError::Validation(format!(
            "Invalid file type '{}'. Please upload one of: {}",
            upload.content_type,
            allowed_types.join(", ")
        )));
    }

    if upload.is_empty() {
        return Err(AppError::Validation("Image file is empty".to_string()));
    }

    if upload.len() > max_bytes {
        return Err(AppError::Validation(format!(
            "File size must be less than {}MB",
            max_bytes / (1024 * 1024)
        )));
    }

    Ok(())
}
