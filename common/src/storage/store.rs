use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, Attribute, Attributes, ObjectStore, PutOptions};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

pub const ASSET_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
const MODELS_PREFIX: &str = "models";
const LOCAL_ASSETS_ROUTE: &str = "/assets";

/// Persists generated assets and hands back a URL the viewer can load.
#[async_trait]
pub trait AssetPublisher: Send + Sync {
    /// Uploads `data` under a fresh key scoped to `job_id` and returns its
    /// public URL.
    async fn publish(
        &self,
        job_id: &str,
        data: Bytes,
        file_name: &str,
        content_type: &str,
    ) -> Result<String, AppError>;

    /// Public URL of an asset previously published for `job_id`, if any.
    async fn find_published(&self, job_id: &str) -> Result<Option<String>, AppError>;
}

/// Storage manager over an `object_store` backend.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    backend_kind: StorageKind,
    public_base: String,
}

impl StorageManager {
    /// Create a new StorageManager with the specified configuration.
    ///
    /// Missing S3 settings are reported as a configuration error naming
    /// every absent variable.
    pub async fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let backend_kind = cfg.storage.clone();
        let (store, default_base) = create_storage_backend(cfg).await?;
        let public_base = cfg
            .storage_public_base_url
            .as_deref()
            .map(str::trim)
            .filter(|base| !base.is_empty())
            .map_or(default_base, str::to_owned)
            .trim_end_matches('/')
            .to_string();

        info!(backend = ?backend_kind, %public_base, "storage backend initialized");

        Ok(Self {
            store,
            backend_kind,
            public_base,
        })
    }

    /// Create a StorageManager with a custom storage backend.
    pub fn with_backend(
        store: DynStore,
        backend_kind: StorageKind,
        public_base: impl Into<String>,
    ) -> Self {
        Self {
            store,
            backend_kind,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Public URL for an object key.
    pub fn public_url(&self, location: &str) -> String {
        format!("{}/{}", self.public_base, location)
    }

    /// Store bytes at the specified location.
    ///
    /// Content type and cache headers are attached as object attributes on
    /// backends that support them; the local filesystem does not.
    pub async fn put(
        &self,
        location: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), AppError> {
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);

        let mut opts = PutOptions::default();
        if !matches!(self.backend_kind, StorageKind::Local) {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            attributes.insert(Attribute::CacheControl, ASSET_CACHE_CONTROL.into());
            opts.attributes = attributes;
        }

        self.store.put_opts(&path, payload, opts).await?;
        Ok(())
    }

    /// Get a streaming handle for large objects.
    pub async fn get_stream(
        &self,
        location: &str,
    ) -> object_store::Result<BoxStream<'static, object_store::Result<Bytes>>> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        Ok(result.into_stream())
    }

    /// List all objects below the specified prefix.
    pub async fn list(
        &self,
        prefix: Option<&str>,
    ) -> object_store::Result<Vec<object_store::ObjectMeta>> {
        let prefix_path = prefix.map(ObjPath::from);
        self.store.list(prefix_path.as_ref()).try_collect().await
    }
}

#[async_trait]
impl AssetPublisher for StorageManager {
    async fn publish(
        &self,
        job_id: &str,
        data: Bytes,
        file_name: &str,
        content_type: &str,
    ) -> Result<String, AppError> {
        let key = asset_key(job_id, file_name);
        let size = data.len();
        self.put(&key, data, content_type).await?;

        info!(%job_id, %key, bytes = size, %content_type, "published asset");
        Ok(self.public_url(&key))
    }

    async fn find_published(&self, job_id: &str) -> Result<Option<String>, AppError> {
        let prefix = job_prefix(job_id);
        let mut objects = self.list(Some(&prefix)).await?;
        objects.sort_by(|a, b| a.last_modified.cmp(&b.last_modified));

        Ok(objects
            .first()
            .map(|meta| self.public_url(meta.location.as_ref())))
    }
}

/// Publisher used when the object store cannot be configured; every publish
/// fails so callers fall back to the provider URL.
pub struct UnconfiguredPublisher {
    reason: String,
}

impl UnconfiguredPublisher {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl AssetPublisher for UnconfiguredPublisher {
    async fn publish(
        &self,
        job_id: &str,
        _data: Bytes,
        _file_name: &str,
        _content_type: &str,
    ) -> Result<String, AppError> {
        debug!(%job_id, reason = %self.reason, "publish skipped, storage unavailable");
        Err(AppError::Storage(format!(
            "Object storage is not configured: {}",
            self.reason
        )))
    }

    async fn find_published(&self, _job_id: &str) -> Result<Option<String>, AppError> {
        Ok(None)
    }
}

/// Sanitizes a name for use as a single object key segment.
/// Replaces any non-alphanumeric characters (excluding '.', '-' and '_') with underscores.
pub fn sanitize_key_segment(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = sanitized.trim_start_matches('.');
    if trimmed.is_empty() {
        "asset".to_string()
    } else {
        trimmed.to_string()
    }
}

fn job_prefix(job_id: &str) -> String {
    format!("{MODELS_PREFIX}/{}/", sanitize_key_segment(job_id))
}

/// `models/{job}/{unix-millis}-{token}-{file}`; the timestamp and random
/// token keep concurrent publishes from overwriting each other.
fn asset_key(job_id: &str, file_name: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let token: String = Uuid::new_v4().simple().to_string().chars().take(13).collect();
    format!(
        "{}{timestamp}-{token}-{}",
        job_prefix(job_id),
        sanitize_key_segment(file_name)
    )
}

/// Create a storage backend based on configuration, along with the public
/// base URL it implies when none is configured.
async fn create_storage_backend(cfg: &AppConfig) -> Result<(DynStore, String), AppError> {
    match cfg.storage {
        StorageKind::S3 => {
            let missing: Vec<&str> = [
                ("S3_ENDPOINT", &cfg.s3_endpoint),
                ("S3_BUCKET", &cfg.s3_bucket),
                ("S3_ACCESS_KEY_ID", &cfg.s3_access_key_id),
                ("S3_SECRET_ACCESS_KEY", &cfg.s3_secret_access_key),
            ]
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();

            let missing_settings = || {
                AppError::Config(format!(
                    "Missing object storage settings: {}",
                    missing.join(", ")
                ))
            };
            if !missing.is_empty() {
                return Err(missing_settings());
            }
            let (Some(endpoint), Some(bucket), Some(key_id), Some(secret)) = (
                cfg.s3_endpoint.as_deref(),
                cfg.s3_bucket.as_deref(),
                cfg.s3_access_key_id.as_deref(),
                cfg.s3_secret_access_key.as_deref(),
            ) else {
                return Err(missing_settings());
            };

            let endpoint = endpoint.trim_end_matches('/');
            let store = AmazonS3Builder::new()
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"))
                .with_region(&cfg.s3_region)
                .with_bucket_name(bucket)
                .with_access_key_id(key_id)
                .with_secret_access_key(secret)
                .build()?;

            Ok((Arc::new(store), format!("{endpoint}/{bucket}")))
        }
        StorageKind::Local => {
            let base = resolve_base_dir(cfg);
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await?;
            }
            let store = LocalFileSystem::new_with_prefix(base)?;
            Ok((Arc::new(store), LOCAL_ASSETS_ROUTE.to_string()))
        }
        StorageKind::Memory => Ok((Arc::new(InMemory::new()), LOCAL_ASSETS_ROUTE.to_string())),
    }
}

/// Resolve the absolute base directory used for local storage from config.
///
/// If `data_dir` is relative, it is resolved against the current working directory.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}
