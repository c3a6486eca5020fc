pub mod fal;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::AppError,
    types::{
        job::{AssetReference, ProviderJobStatus},
        upload::UploadRequest,
    },
};

pub use fal::FalClient;

/// Stateless proxy to an image-to-3D generation service, keyed by job id.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Submits an image and returns the provider-assigned job id.
    async fn submit(&self, upload: &UploadRequest) -> Result<String, AppError>;

    /// Current status of a job, mapped onto the canonical vocabulary.
    async fn fetch_status(&self, job_id: &str) -> Result<ProviderJobStatus, AppError>;

    /// Generated asset of a completed job.
    async fn fetch_result(&self, job_id: &str) -> Result<AssetReference, AppError>;

    /// Downloads the bytes behind an asset URL.
    async fn download_asset(&self, url: &str) -> Result<Bytes, AppError>;

    /// Whether a credential is available for outbound calls.
    fn is_configured(&self) -> bool;
}
