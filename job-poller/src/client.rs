use async_trait::async_trait;
use common::types::{
    job::{GenerateResponse, StatusResponse},
    upload::UploadRequest,
};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::error::PollerError;

/// The two calls a session makes against the generation service.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    async fn submit(&self, upload: &UploadRequest) -> Result<String, PollerError>;

    async fn status(&self, job_id: &str) -> Result<StatusResponse, PollerError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// `reqwest` client for `/api/generate` and `/api/status/{jobId}`.
#[derive(Clone)]
pub struct HttpGenerationApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGenerationApi {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn server_error(response: reqwest::Response, fallback: &str) -> PollerError {
        let status = response.status().as_u16();
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string());
        PollerError::Server { status, message }
    }
}

#[async_trait]
impl GenerationApi for HttpGenerationApi {
    async fn submit(&self, upload: &UploadRequest) -> Result<String, PollerError> {
        let part = Part::bytes(upload.data.to_vec())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)?;
        let form = Form::new().part("image", part);

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::server_error(response, "Failed to start generation").await);
        }

        let body: GenerateResponse = response.json().await?;
        debug!(job_id = %body.job_id, "Generation job accepted");
        Ok(body.job_id)
    }

    async fn status(&self, job_id: &str) -> Result<StatusResponse, PollerError> {
        let response = self
            .http
            .get(format!("{}/api/status/{job_id}", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::server_error(response, "Failed to check job status").await);
        }

        Ok(response.json().await?)
    }
}
