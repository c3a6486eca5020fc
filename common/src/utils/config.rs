use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    S3,
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::S3
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    pub fal_key: Option<String>,
    #[serde(default = "default_fal_base_url")]
    pub fal_base_url: String,
    #[serde(default = "default_fal_model_id")]
    pub fal_model_id: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    pub s3_endpoint: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    #[serde(default = "default_s3_region")]
    pub s3_region: String,
    pub storage_public_base_url: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_intake_max_image_bytes")]
    pub intake_max_image_bytes: usize,
    #[serde(default = "default_intake_max_body_bytes")]
    pub intake_max_body_bytes: usize,
    #[serde(default = "default_proxy_allowed_hosts")]
    pub proxy_allowed_hosts: Vec<String>,
}

fn default_http_port() -> u16 {
    3000
}

fn default_fal_base_url() -> String {
    "https://queue.fal.run".to_string()
}

fn default_fal_model_id() -> String {
    "fal-ai/hyper3d/rodin/v2".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_s3_region() -> String {
    "auto".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

pub fn default_intake_max_image_bytes() -> usize {
    10 * 1024 * 1024
}

// Leaves headroom for multipart framing so oversized images still reach
// validation and get a 400 instead of a bare 413.
fn default_intake_max_body_bytes() -> usize {
    12 * 1024 * 1024
}

fn default_proxy_allowed_hosts() -> Vec<String> {
    vec!["r2.dev".to_string(), "r2.cloudflarestorage.com".to_string()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            fal_key: None,
            fal_base_url: default_fal_base_url(),
            fal_model_id: default_fal_model_id(),
            provider_timeout_secs: default_provider_timeout_secs(),
            storage: default_storage_kind(),
            s3_endpoint: None,
            s3_bucket: None,
            s3_access_key_id: None,
            s3_secret_access_key: None,
            s3_region: default_s3_region(),
            storage_public_base_url: None,
            data_dir: default_data_dir(),
            intake_max_image_bytes: default_intake_max_image_bytes(),
            intake_max_body_bytes: default_intake_max_body_bytes(),
            proxy_allowed_hosts: default_proxy_allowed_hosts(),
        }
    }
}

impl AppConfig {
    /// Hosts the asset proxy may fetch from: the configured patterns plus the
    /// host of the public base URL, when one is set.
    pub fn proxy_host_patterns(&self) -> Vec<String> {
        let mut patterns = self.proxy_allowed_hosts.clone();
        if let Some(host) = self
            .storage_public_base_url
            .as_deref()
            .and_then(|base| url::Url::parse(base).ok())
            .and_then(|parsed| parsed.host_str().map(str::to_owned))
        {
            if !patterns.contains(&host) {
                patterns.push(host);
            }
        }
        patterns
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::default()
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("proxy_allowed_hosts"),
        )
        .build()?;

    config.try_deserialize()
}
