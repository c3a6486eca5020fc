//! fal.ai queue API client for the Hyper3D Rodin image-to-3D model.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::GenerationProvider;
use crate::{
    error::AppError,
    types::{
        job::{AssetReference, JobStatus, ProviderJobStatus},
        upload::UploadRequest,
    },
    utils::config::AppConfig,
};

const GEOMETRY_FILE_FORMAT: &str = "glb";
const MATERIAL: &str = "All";
const QUALITY_MESH_OPTION: &str = "500K Triangle";

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    input_image_urls: Vec<String>,
    geometry_file_format: &'a str,
    material: &'a str,
    quality_mesh_option: &'a str,
    preview_render: bool,
}

#[derive(Debug, Deserialize)]
struct SubmitReply {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    status: String,
    #[serde(default)]
    progress: Option<f32>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FileReply {
    url: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultReply {
    model_mesh: FileReply,
}

/// Maps the provider's queue states onto [`JobStatus`]. Unknown states are
/// reported as pending.
pub fn map_provider_status(raw: &str) -> JobStatus {
    match raw.trim().to_ascii_uppercase().as_str() {
        "IN_PROGRESS" | "PROCESSING" | "RUNNING" => JobStatus::Processing,
        "COMPLETED" | "OK" | "SUCCEEDED" => JobStatus::Completed,
        "FAILED" | "ERROR" | "CANCELLED" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(message) if message.trim().is_empty() => None,
        Value::String(message) => Some(message.clone()),
        Value::Object(fields) => fields
            .get("message")
            .or_else(|| fields.get("detail"))
            .and_then(error_message)
            .or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}

pub struct FalClient {
    http: reqwest::Client,
    base_url: String,
    model_id: String,
    api_key: Option<String>,
}

impl FalClient {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.fal_base_url.trim_end_matches('/').to_string(),
            model_id: config.fal_model_id.trim_matches('/').to_string(),
            api_key: config
                .fal_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_owned),
        })
    }

    /// Fails with a configuration error when no credential is set, so the
    /// server can refuse to start instead of failing on the first request.
    pub fn ensure_configured(&self) -> Result<(), AppError> {
        self.credential().map(|_| ())
    }

    fn credential(&self) -> Result<&str, AppError> {
        self.api_key.as_deref().ok_or_else(|| {
            AppError::Config("FAL_KEY environment variable is not set".to_string())
        })
    }

    /// Queue status and result URLs are addressed by the application id,
    /// i.e. the owner and alias without the model sub-path.
    fn app_id(&self) -> &str {
        let mut boundaries = self.model_id.match_indices('/').map(|(idx, _)| idx);
        match (boundaries.next(), boundaries.next()) {
            (Some(_), Some(second)) => self.model_id.get(..second).unwrap_or(&self.model_id),
            _ => &self.model_id,
        }
    }

    fn request_url(&self, job_id: &str) -> String {
        format!("{}/{}/requests/{}", self.base_url, self.app_id(), job_id)
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
        action: &str,
    ) -> Result<T, AppError> {
        let key = self.credential()?;
        let response = request
            .header(reqwest::header::AUTHORIZATION, format!("Key {key}"))
            .send()
            .await
            .map_err(|e| AppError::provider(None, format!("{action} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::provider(
                Some(status.as_u16()),
                format!("{action} failed with HTTP {status}: {body}"),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| {
                AppError::provider(
                    Some(status.as_u16()),
                    format!("{action} returned an unreadable body: {e}"),
                )
            })
    }
}

#[async_trait]
impl GenerationProvider for FalClient {
    async fn submit(&self, upload: &UploadRequest) -> Result<String, AppError> {
        self.credential()?;

        let data_uri = format!(
            "data:{};base64,{}",
            upload.content_type,
            STANDARD.encode(&upload.data)
        );
        let body = SubmitBody {
            input_image_urls: vec![data_uri],
            geometry_file_format: GEOMETRY_FILE_FORMAT,
            material: MATERIAL,
            quality_mesh_option: QUALITY_MESH_OPTION,
            preview_render: false,
        };

        let url = format!("{}/{}", self.base_url, self.model_id);
        let reply: SubmitReply = self
            .send_json(self.http.post(url).json(&body), "job submission")
            .await?;

        info!(
            job_id = %reply.request_id,
            file_name = %upload.file_name,
            bytes = upload.len(),
            "submitted generation job"
        );

        Ok(reply.request_id)
    }

    async fn fetch_status(&self, job_id: &str) -> Result<ProviderJobStatus, AppError> {
        let url = format!("{}/status", self.request_url(job_id));
        let reply: StatusReply = self
            .send_json(self.http.get(url).query(&[("logs", "1")]), "status check")
            .await?;

        let error = reply.error.as_ref().and_then(error_message);
        let mut status = map_provider_status(&reply.status);
        if status == JobStatus::Completed && error.is_some() {
            status = JobStatus::Failed;
        }

        debug!(%job_id, provider_status = %reply.status, %status, "fetched job status");

        Ok(ProviderJobStatus {
            status,
            progress: reply.progress,
            error,
        })
    }

    async fn fetch_result(&self, job_id: &str) -> Result<AssetReference, AppError> {
        let reply: ResultReply = self
            .send_json(self.http.get(self.request_url(job_id)), "result fetch")
            .await?;

        let mesh = reply.model_mesh;
        Ok(AssetReference::from_url(mesh.url, mesh.content_type, mesh.file_name))
    }

    async fn download_asset(&self, url: &str) -> Result<Bytes, AppError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "asset download rejected");
            return Err(AppError::Download(format!(
                "Failed to download model: {status}"
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| AppError::Download(e.to_string()))
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
