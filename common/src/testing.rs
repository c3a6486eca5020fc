//! Test doubles for the provider and publisher seams.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    provider::GenerationProvider,
    storage::store::AssetPublisher,
    types::{
        job::{AssetReference, JobStatus, ProviderJobStatus},
        upload::UploadRequest,
    },
};

/// Scripted provider that records every call it receives.
pub struct MockProvider {
    pub job_id: String,
    pub asset: AssetReference,
    pub asset_bytes: Bytes,
    statuses: Mutex<VecDeque<ProviderJobStatus>>,
    fail_submit: Option<String>,
    fail_status: bool,
    fail_result: bool,
    fail_download: bool,
    configured: bool,
    calls: Mutex<Vec<&'static str>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            job_id: "req-mock".to_string(),
            asset: AssetReference::from_url(
                "https://v3.fal.media/files/mock/model.glb",
                Some("model/gltf-binary".to_string()),
                Some("model.glb".to_string()),
            ),
            asset_bytes: Bytes::from_static(b"glTF-binary"),
            statuses: Mutex::new(VecDeque::new()),
            fail_submit: None,
            fail_status: false,
            fail_result: false,
            fail_download: false,
            configured: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Statuses returned by successive `fetch_status` calls. The last one
    /// repeats once the script is exhausted.
    #[must_use]
    pub fn with_statuses(self, statuses: Vec<JobStatus>) -> Self {
        let scripted = statuses
            .into_iter()
            .map(|status| ProviderJobStatus {
                status,
                progress: None,
                error: None,
            })
            .collect();
        Self {
            statuses: Mutex::new(scripted),
            ..self
        }
    }

    #[must_use]
    pub fn with_status_details(self, statuses: Vec<ProviderJobStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..self
        }
    }

    #[must_use]
    pub fn failing_submit(self, message: &str) -> Self {
        Self {
            fail_submit: Some(message.to_string()),
            ..self
        }
    }

    #[must_use]
    pub fn failing_status(self) -> Self {
        Self {
            fail_status: true,
            ..self
        }
    }

    #[must_use]
    pub fn failing_result(self) -> Self {
        Self {
            fail_result: true,
            ..self
        }
    }

    #[must_use]
    pub fn failing_download(self) -> Self {
        Self {
            fail_download: true,
            ..self
        }
    }

    #[must_use]
    pub fn unconfigured(self) -> Self {
        Self {
            configured: false,
            ..self
        }
    }

    pub async fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: &'static str) {
        self.calls.lock().await.push(call);
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    async fn submit(&self, _upload: &UploadRequest) -> Result<String, AppError> {
        self.record("submit").await;
        if !self.configured {
            return Err(AppError::Config(
                "FAL_KEY environment variable is not set".to_string(),
            ));
        }
        match &self.fail_submit {
            Some(message) => Err(AppError::provider(Some(502), message.clone())),
            None => Ok(self.job_id.clone()),
        }
    }

    async fn fetch_status(&self, _job_id: &str) -> Result<ProviderJobStatus, AppError> {
        self.record("status").await;
        if self.fail_status {
            return Err(AppError::provider(Some(503), "Service Unavailable"));
        }
        let mut statuses = self.statuses.lock().await;
        let next = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(next.unwrap_or(ProviderJobStatus {
            status: JobStatus::Pending,
            progress: None,
            error: None,
        }))
    }

    async fn fetch_result(&self, _job_id: &str) -> Result<AssetReference, AppError> {
        self.record("result").await;
        if self.fail_result {
            return Err(AppError::provider(Some(400), "Request is still in progress"));
        }
        Ok(self.asset.clone())
    }

    async fn download_asset(&self, _url: &str) -> Result<Bytes, AppError> {
        self.record("download").await;
        if self.fail_download {
            return Err(AppError::Download(
                "Failed to download model: 404 Not Found".into(),
            ));
        }
        Ok(self.asset_bytes.clone())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

/// Publisher that counts calls and fails on demand.
pub struct RecordingPublisher<P> {
    inner: P,
    fail_publish: bool,
    publishes: Mutex<usize>,
}

impl<P: AssetPublisher> RecordingPublisher<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            fail_publish: false,
            publishes: Mutex::new(0),
        }
    }

    #[must_use]
    pub fn failing(self) -> Self {
        Self {
            fail_publish: true,
            ..self
        }
    }

    pub async fn publish_count(&self) -> usize {
        *self.publishes.lock().await
    }
}

#[async_trait]
impl<P: AssetPublisher> AssetPublisher for RecordingPublisher<P> {
    async fn publish(
        &self,
        job_id: &str,
        data: Bytes,
        file_name: &str,
        content_type: &str,
    ) -> Result<String, AppError> {
        *self.publishes.lock().await += 1;
        if self.fail_publish {
            return Err(AppError::Storage("simulated bucket outage".to_string()));
        }
        self.inner
            .publish(job_id, data, file_name, content_type)
            .await
    }

    async fn find_published(&self, job_id: &str) -> Result<Option<String>, AppError> {
        self.inner.find_published(job_id).await
    }
}
