use serde::{Deserialize, Serialize};

/// Canonical job status, independent of the provider's own vocabulary.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Human-readable phase label shown while a job is still running.
    pub fn display_message(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Job queued, waiting to start...",
            JobStatus::Processing => "Generating 3D model...",
            JobStatus::Completed => "Model ready",
            JobStatus::Failed => "Generation failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a job as reported by the generation provider, already mapped
/// onto [`JobStatus`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderJobStatus {
    pub status: JobStatus,
    pub progress: Option<f32>,
    pub error: Option<String>,
}

/// Location and metadata of a generated mesh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetReference {
    pub url: String,
    pub content_type: String,
    pub file_name: String,
}

impl AssetReference {
    /// Builds a reference, filling missing metadata from the URL's extension.
    pub fn from_url(
        url: impl Into<String>,
        content_type: Option<String>,
        file_name: Option<String>,
    ) -> Self {
        let url = url.into();
        let is_gltf = url
            .split(['?', '#'])
            .next()
            .is_some_and(|path| path.to_ascii_lowercase().ends_with(".gltf"));
        let (default_name, default_type) = if is_gltf {
            ("model.gltf", "model/gltf+json")
        } else {
            ("model.glb", "model/gltf-binary")
        };

        Self {
            url,
            content_type: content_type
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default_type.to_string()),
            file_name: file_name
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default_name.to_string()),
        }
    }
}

/// Body returned by the intake endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub job_id: String,
}

/// Body returned by the status endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl StatusResponse {
    pub fn in_flight(status: ProviderJobStatus) -> Self {
        Self {
            status: status.status,
            progress: status.progress,
            error: status.error,
            model_url: None,
            warning: None,
        }
    }

    pub fn completed(model_url: impl Into<String>, warning: Option<String>) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: None,
            error: None,
            model_url: Some(model_url.into()),
            warning,
        }
    }
}
