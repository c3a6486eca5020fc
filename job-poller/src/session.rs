use std::{sync::Arc, time::Duration};

use common::{
    types::{
        job::{JobStatus, StatusResponse},
        upload::UploadRequest,
    },
    utils::upload_limits::{validate_image_upload, CLIENT_IMAGE_TYPES},
};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::GenerationApi,
    error::PollerError,
    progress::{clamp_reported, estimate_progress, ProgressTracker},
    state::{compute_next_state, SessionState, SessionTransition},
};

pub const INITIAL_STATUS_MESSAGE: &str = "Initializing...";
pub const TIMEOUT_MESSAGE: &str = "Generation timeout - please try again";
pub const FAILED_MESSAGE: &str = "Generation failed";
pub const STATUS_CHECK_FAILED_MESSAGE: &str = "Failed to check job status";
const START_FAILED_MESSAGE: &str = "Failed to start generation";

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Status checks allowed before the session gives up.
    pub max_attempts: u32,
    pub max_image_bytes: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Everything an observer needs to render the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub job_id: Option<String>,
    pub model_url: Option<String>,
    pub warning: Option<String>,
    pub error: Option<String>,
    pub progress: f32,
    pub status_message: String,
    pub attempts: u32,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Upload,
            job_id: None,
            model_url: None,
            warning: None,
            error: None,
            progress: 0.0,
            status_message: INITIAL_STATUS_MESSAGE.to_string(),
            attempts: 0,
        }
    }
}

/// One client session: upload an image, poll its job, land in `viewer` or
/// `error`. Polling runs on the caller's task and stops at the next await
/// point once the session's token is cancelled.
pub struct GenerationSession {
    api: Arc<dyn GenerationApi>,
    config: PollerConfig,
    snapshot: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
}

impl GenerationSession {
    pub fn new(api: Arc<dyn GenerationApi>, config: PollerConfig) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        Self {
            api,
            config,
            snapshot,
            cancel: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Token that stops the current upload or polling loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads an image and polls until the job reaches a terminal state.
    /// Returns the model URL.
    pub async fn run(&mut self, upload: UploadRequest) -> Result<String, PollerError> {
        let job_id = self.upload(upload).await?;
        self.poll(&job_id).await
    }

    /// Validates and submits an image, moving the session to `loading`.
    /// Validation failures leave the session in `upload`.
    pub async fn upload(&mut self, upload: UploadRequest) -> Result<String, PollerError> {
        validate_image_upload(&upload, CLIENT_IMAGE_TYPES, self.config.max_image_bytes)?;

        self.transition(SessionTransition::Start, |snapshot| {
            snapshot.error = None;
            snapshot.warning = None;
            snapshot.model_url = None;
        })?;
        info!(
            file_name = %upload.file_name,
            content_type = %upload.content_type,
            bytes = upload.len(),
            "Uploading image"
        );

        let token = self.cancel.clone();
        let submitted = tokio::select! {
            () = token.cancelled() => return Err(PollerError::Cancelled),
            result = self.api.submit(&upload) => result,
        };

        match submitted {
            Ok(job_id) => {
                info!(%job_id, "Generation job started");
                self.snapshot
                    .send_modify(|snapshot| snapshot.job_id = Some(job_id.clone()));
                Ok(job_id)
            }
            Err(err) => {
                let message = match &err {
                    PollerError::Server { message, .. } => message.clone(),
                    PollerError::Transport(_) => START_FAILED_MESSAGE.to_string(),
                    other => other.to_string(),
                };
                warn!(error = %err, "Generation request failed");
                self.fail(message)?;
                Err(err)
            }
        }
    }

    /// Polls `job_id` until it completes, fails or exhausts the attempt
    /// ceiling. The first check is immediate; at most one request is in
    /// flight.
    pub async fn poll(&mut self, job_id: &str) -> Result<String, PollerError> {
        let token = self.cancel.clone();
        let mut attempts: u32 = 0;
        let mut tracker = ProgressTracker::default();

        loop {
            let response = tokio::select! {
                () = token.cancelled() => return Err(PollerError::Cancelled),
                response = self.api.status(job_id) => response,
            };

            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    warn!(%job_id, error = %err, "Status check failed");
                    self.fail(STATUS_CHECK_FAILED_MESSAGE.to_string())?;
                    return Err(err);
                }
            };

            if let Some(model_url) = self.settle(job_id, &response, &mut tracker)? {
                return Ok(model_url);
            }

            if attempts >= self.config.max_attempts {
                warn!(%job_id, attempts, "Generation timed out");
                self.fail(TIMEOUT_MESSAGE.to_string())?;
                return Err(PollerError::Timeout { attempts });
            }

            attempts = attempts.saturating_add(1);
            let progress = tracker.advance(response.progress.map_or_else(
                || estimate_progress(attempts, self.config.max_attempts),
                clamp_reported,
            ));
            debug!(%job_id, status = %response.status, attempts, progress, "Job still running");
            self.snapshot.send_modify(|snapshot| {
                snapshot.attempts = attempts;
                snapshot.progress = progress;
                snapshot.status_message = response.status.display_message().to_string();
            });

            tokio::select! {
                () = token.cancelled() => return Err(PollerError::Cancelled),
                () = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    /// Applies a terminal response. Returns the model URL on completion.
    fn settle(
        &self,
        job_id: &str,
        response: &StatusResponse,
        tracker: &mut ProgressTracker,
    ) -> Result<Option<String>, PollerError> {
        match (&response.status, &response.model_url) {
            (JobStatus::Completed, Some(model_url)) => {
                let progress = tracker.complete();
                self.transition(SessionTransition::Complete, |snapshot| {
                    snapshot.model_url = Some(model_url.clone());
                    snapshot.warning.clone_from(&response.warning);
                    snapshot.progress = progress;
                    snapshot.status_message = JobStatus::Completed.display_message().to_string();
                })?;
                if let Some(warning) = &response.warning {
                    warn!(%job_id, %warning, "Model served from fallback location");
                }
                info!(%job_id, %model_url, "Model ready");
                Ok(Some(model_url.clone()))
            }
            (JobStatus::Failed, _) => {
                let message = response
                    .error
                    .clone()
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| FAILED_MESSAGE.to_string());
                warn!(%job_id, error = %message, "Generation failed");
                self.fail(message.clone())?;
                Err(PollerError::JobFailed(message))
            }
            _ => Ok(None),
        }
    }

    /// "Try again": stops any running loop and returns to `upload` with a
    /// cleared snapshot.
    pub fn reset(&mut self) -> Result<(), PollerError> {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();

        let state = self.snapshot.borrow().state;
        if state != SessionState::Upload {
            compute_next_state(state, SessionTransition::Reset)?;
        }
        self.snapshot.send_replace(SessionSnapshot::default());
        debug!("Session reset");
        Ok(())
    }

    fn fail(&self, message: String) -> Result<(), PollerError> {
        self.transition(SessionTransition::Fail, |snapshot| {
            snapshot.error = Some(message);
        })
    }

    fn transition(
        &self,
        event: SessionTransition,
        update: impl FnOnce(&mut SessionSnapshot),
    ) -> Result<(), PollerError> {
        let current = self.snapshot.borrow().state;
        let next = compute_next_state(current, event)?;
        self.snapshot.send_modify(|snapshot| {
            snapshot.state = next;
            update(snapshot);
        });
        Ok(())
    }
}
