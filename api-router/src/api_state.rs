use std::{sync::Arc, time::Duration};

use common::{
    error::AppError,
    provider::GenerationProvider,
    storage::store::{AssetPublisher, StorageManager},
    utils::config::AppConfig,
};
use reqwest::redirect::Policy;

#[derive(Clone)]
pub struct ApiState {
    pub config: AppConfig,
    pub provider: Arc<dyn GenerationProvider>,
    pub publisher: Arc<dyn AssetPublisher>,
    /// Present when the object store was configured; backs `/assets`.
    pub storage: Option<StorageManager>,
    /// Outbound client for the asset proxy.
    pub http: reqwest::Client,
}

impl ApiState {
    /// State backed by a configured object store, which doubles as the
    /// publisher.
    pub fn new(
        config: &AppConfig,
        provider: Arc<dyn GenerationProvider>,
        storage: StorageManager,
    ) -> Result<Self, AppError> {
        Ok(Self {
            config: config.clone(),
            provider,
            publisher: Arc::new(storage.clone()),
            storage: Some(storage),
            http: proxy_client(config)?,
        })
    }

    /// State with an explicit publisher and no servable storage.
    pub fn with_publisher(
        config: &AppConfig,
        provider: Arc<dyn GenerationProvider>,
        publisher: Arc<dyn AssetPublisher>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            config: config.clone(),
            provider,
            publisher,
            storage: None,
            http: proxy_client(config)?,
        })
    }
}

/// Client for the asset proxy. Redirects are never followed, since the
/// allow-list is only checked against the requested URL.
pub fn proxy_client(config: &AppConfig) -> Result<reqwest::Client, AppError> {
    Ok(reqwest::Client::builder()
        .redirect(Policy::none())
        .timeout(Duration::from_secs(config.provider_timeout_secs))
        .build()?)
}
