use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::{IntoResponse, Redirect},
    routing::get,
    Router,
};
use common::{
    provider::GenerationProvider,
    storage::store::{AssetPublisher, StorageManager, UnconfiguredPublisher},
    testing::{MockProvider, RecordingPublisher},
    types::job::{JobStatus, ProviderJobStatus},
    utils::config::{AppConfig, StorageKind},
};
use object_store::memory::InMemory;
use serde_json::Value;
use tower::ServiceExt;

use crate::{api_routes, api_state::ApiState, asset_routes};

const BOUNDARY: &str = "X-GEN3D-BOUNDARY";
const PUBLIC_BASE: &str = "https://pub-models.r2.dev";

fn memory_storage(public_base: &str) -> StorageManager {
    StorageManager::with_backend(Arc::new(InMemory::new()), StorageKind::Memory, public_base)
}

fn state_with(
    config: AppConfig,
    provider: Arc<MockProvider>,
    publisher: Arc<RecordingPublisher<StorageManager>>,
    storage: StorageManager,
) -> ApiState {
    ApiState {
        provider: provider as Arc<dyn GenerationProvider>,
        publisher,
        http: crate::api_state::proxy_client(&config).unwrap(),
        config,
        storage: Some(storage),
    }
}

fn app(state: ApiState) -> Router {
    Router::new()
        .nest("/api", api_routes(&state))
        .merge(asset_routes())
        .with_state(state)
}

fn finish_body(mut body: Vec<u8>) -> Vec<u8> {
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn image_body(content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"image\"; filename=\"photo.png\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    finish_body(body)
}

fn text_body(field: &str, value: &str) -> Vec<u8> {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}"
    )
    .into_bytes();
    finish_body(body)
}

fn generate_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/generate")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

struct Harness {
    provider: Arc<MockProvider>,
    publisher: Arc<RecordingPublisher<StorageManager>>,
    router: Router,
}

fn harness(provider: MockProvider) -> Harness {
    harness_with(provider, AppConfig::default(), PUBLIC_BASE, false)
}

fn harness_with(
    provider: MockProvider,
    config: AppConfig,
    public_base: &str,
    failing_publish: bool,
) -> Harness {
    let provider = Arc::new(provider);
    let storage = memory_storage(public_base);
    let mut publisher = RecordingPublisher::new(storage.clone());
    if failing_publish {
        publisher = publisher.failing();
    }
    let publisher = Arc::new(publisher);
    let router = app(state_with(config, provider.clone(), publisher.clone(), storage));
    Harness {
        provider,
        publisher,
        router,
    }
}

#[tokio::test]
async fn generate_returns_provider_job_id() {
    let h = harness(MockProvider::new());

    let response = h
        .router
        .oneshot(generate_request(image_body("image/png", b"\x89PNG fake image")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["jobId"], "req-mock");
    assert_eq!(h.provider.calls().await, vec!["submit"]);
}

#[tokio::test]
async fn generate_without_image_is_rejected() {
    let h = harness(MockProvider::new());

    let response = h
        .router
        .oneshot(generate_request(text_body("note", "hello")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "No image file provided");
    assert_eq!(json["status"], "error");
    assert!(h.provider.calls().await.is_empty());
}

#[tokio::test]
async fn generate_rejects_unsupported_type_without_provider_call() {
    let h = harness(MockProvider::new());

    let response = h
        .router
        .oneshot(generate_request(image_body("image/gif", b"GIF89a")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.provider.calls().await.is_empty());
}

#[tokio::test]
async fn generate_rejects_oversized_image() {
    let config = AppConfig {
        intake_max_image_bytes: 16,
        ..AppConfig::default()
    };
    let h = harness_with(MockProvider::new(), config, PUBLIC_BASE, false);

    let response = h
        .router
        .oneshot(generate_request(image_body("image/jpeg", &[7u8; 64])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.provider.calls().await.is_empty());
}

#[tokio::test]
async fn generate_over_body_limit_is_json_payload_error() {
    let config = AppConfig {
        intake_max_body_bytes: 256,
        ..AppConfig::default()
    };
    let h = harness_with(MockProvider::new(), config, PUBLIC_BASE, false);

    let response = h
        .router
        .oneshot(generate_request(image_body("image/png", &[1u8; 1024])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let json = json_body(response).await;
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"], "Request payload is too large");
    assert!(h.provider.calls().await.is_empty());
}

#[tokio::test]
async fn generate_surfaces_provider_failure() {
    let h = harness(MockProvider::new().failing_submit("Unprocessable image"));

    let response = h
        .router
        .oneshot(generate_request(image_body("image/png", b"png")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["status"], "error");
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("Unprocessable image"));
}

#[tokio::test]
async fn generate_reports_missing_credential() {
    let h = harness(MockProvider::new().unconfigured());

    let response = h
        .router
        .oneshot(generate_request(image_body("image/png", b"png")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("FAL_KEY"));
}

#[tokio::test]
async fn status_passes_through_in_flight_jobs() {
    let h = harness(MockProvider::new().with_status_details(vec![ProviderJobStatus {
        status: JobStatus::Processing,
        progress: Some(42.0),
        error: None,
    }]));

    let response = h
        .router
        .oneshot(get_request("/api/status/req-mock"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "processing");
    assert_eq!(json["progress"], 42.0);
    assert!(json.get("modelUrl").is_none());
    assert_eq!(h.provider.calls().await, vec!["status"]);
    assert_eq!(h.publisher.publish_count().await, 0);
}

#[tokio::test]
async fn status_passes_through_failure_reason() {
    let h = harness(MockProvider::new().with_status_details(vec![ProviderJobStatus {
        status: JobStatus::Failed,
        progress: None,
        error: Some("mesh failed".to_string()),
    }]));

    let json = json_body(
        h.router
            .oneshot(get_request("/api/status/req-mock"))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(json["status"], "failed");
    assert_eq!(json["error"], "mesh failed");
}

#[tokio::test]
async fn completed_job_is_published_to_object_store() {
    let h = harness(MockProvider::new().with_statuses(vec![JobStatus::Completed]));

    let response = h
        .router
        .oneshot(get_request("/api/status/req-mock"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "completed");
    let url = json["modelUrl"].as_str().unwrap();
    assert!(url.starts_with("https://pub-models.r2.dev/models/req-mock/"), "{url}");
    assert!(url.ends_with("-model.glb"), "{url}");
    assert!(json.get("warning").is_none());
    assert_eq!(
        h.provider.calls().await,
        vec!["status", "result", "download"]
    );
}

#[tokio::test]
async fn repeated_status_reuses_published_asset() {
    let h = harness(MockProvider::new().with_statuses(vec![JobStatus::Completed]));

    let first = json_body(
        h.router
            .clone()
            .oneshot(get_request("/api/status/req-mock"))
            .await
            .unwrap(),
    )
    .await;
    let second = json_body(
        h.router
            .oneshot(get_request("/api/status/req-mock"))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(first["modelUrl"], second["modelUrl"]);
    assert_eq!(h.publisher.publish_count().await, 1);
    let downloads = h
        .provider
        .calls()
        .await
        .into_iter()
        .filter(|call| *call == "download")
        .count();
    assert_eq!(downloads, 1);
}

#[tokio::test]
async fn unconfigured_storage_falls_back_to_provider_url() {
    let provider = Arc::new(MockProvider::new().with_statuses(vec![JobStatus::Completed]));
    let state = ApiState::with_publisher(
        &AppConfig::default(),
        provider.clone(),
        Arc::new(UnconfiguredPublisher::new("S3_BUCKET missing")),
    )
    .unwrap();

    let response = app(state)
        .oneshot(get_request("/api/status/req-mock"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["modelUrl"], provider.asset.url.as_str());
    assert!(json["warning"].as_str().is_some());
}

#[tokio::test]
async fn publish_failure_falls_back_to_provider_url() {
    let h = harness_with(
        MockProvider::new().with_statuses(vec![JobStatus::Completed]),
        AppConfig::default(),
        PUBLIC_BASE,
        true,
    );

    let json = json_body(
        h.router
            .oneshot(get_request("/api/status/req-mock"))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(json["status"], "completed");
    assert_eq!(json["modelUrl"], h.provider.asset.url.as_str());
    assert!(json["warning"].as_str().is_some());
}

#[tokio::test]
async fn download_failure_falls_back_to_provider_url() {
    let h = harness(
        MockProvider::new()
            .with_statuses(vec![JobStatus::Completed])
            .failing_download(),
    );

    let json = json_body(
        h.router
            .oneshot(get_request("/api/status/req-mock"))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(json["modelUrl"], h.provider.asset.url.as_str());
    assert!(json["warning"].as_str().is_some());
    assert_eq!(h.publisher.publish_count().await, 0);
}

#[tokio::test]
async fn result_failure_is_server_error() {
    let h = harness(
        MockProvider::new()
            .with_statuses(vec![JobStatus::Completed])
            .failing_result(),
    );

    let response = h
        .router
        .oneshot(get_request("/api/status/req-mock"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["status"], "error");
    assert!(json["error"].as_str().unwrap().contains("still in progress"));
}

#[tokio::test]
async fn published_job_skips_result_fetch() {
    let h = harness(
        MockProvider::new()
            .with_statuses(vec![JobStatus::Completed])
            .failing_result(),
    );
    let published = h
        .publisher
        .publish(
            "req-mock",
            bytes::Bytes::from_static(b"glTF-binary"),
            "model.glb",
            "model/gltf-binary",
        )
        .await
        .unwrap();

    let response = h
        .router
        .oneshot(get_request("/api/status/req-mock"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["modelUrl"], published.as_str());
    assert!(json.get("warning").is_none());
    assert_eq!(h.provider.calls().await, vec!["status"]);
}

#[tokio::test]
async fn status_lookup_failure_is_server_error() {
    let h = harness(MockProvider::new().failing_status());

    let response = h
        .router
        .oneshot(get_request("/api/status/req-mock"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["status"], "error");
    assert!(json["error"].as_str().unwrap().contains("Service Unavailable"));
    assert_eq!(h.publisher.publish_count().await, 0);
}

#[tokio::test]
async fn malformed_job_id_is_rejected() {
    let h = harness(MockProvider::new());

    let response = h
        .router
        .oneshot(get_request("/api/status/bad.id"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.provider.calls().await.is_empty());
}

#[tokio::test]
async fn published_asset_is_served_from_local_route() {
    let h = harness_with(
        MockProvider::new().with_statuses(vec![JobStatus::Completed]),
        AppConfig::default(),
        "/assets",
        false,
    );

    let json = json_body(
        h.router
            .clone()
            .oneshot(get_request("/api/status/req-mock"))
            .await
            .unwrap(),
    )
    .await;
    let url = json["modelUrl"].as_str().unwrap().to_string();
    assert!(url.starts_with("/assets/models/req-mock/"), "{url}");

    let response = h.router.oneshot(get_request(&url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=31536000, immutable"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"glTF-binary");
}

#[tokio::test]
async fn missing_asset_is_not_found() {
    let h = harness(MockProvider::new());

    let response = h
        .router
        .oneshot(get_request("/assets/models/nope/model.glb"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn proxy_requires_url() {
    let h = harness(MockProvider::new());

    let response = h
        .router
        .oneshot(get_request("/api/proxy-model"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proxy_rejects_foreign_hosts() {
    let h = harness(MockProvider::new());

    let response = h
        .router
        .oneshot(get_request(
            "/api/proxy-model?url=https%3A%2F%2Fexample.com%2Fmodel.glb",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proxy_preflight_returns_cors_headers() {
    let h = harness(MockProvider::new());

    let response = h
        .router
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/proxy-model")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
        "GET, HEAD, OPTIONS"
    );
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
        "Content-Type"
    );
}

async fn spawn_upstream() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let addr = listener.local_addr().expect("local addr");
    // `localhost` is outside the loopback allow-list used below.
    let off_list = format!("http://localhost:{}/secret", addr.port());

    let upstream = Router::new()
        .route(
            "/models/model.glb",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "model/gltf-binary")],
                    b"glb-bytes".to_vec(),
                )
                    .into_response()
            }),
        )
        .route(
            "/models/moved.glb",
            get(move || {
                let target = off_list.clone();
                async move { Redirect::temporary(&target) }
            }),
        )
        .route("/secret", get(|| async { "internal-secret" }))
        .route(
            "/models/stalled.glb",
            get(|| async {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                "too late"
            }),
        );

    tokio::spawn(async move {
        axum::serve(listener, upstream).await.expect("upstream");
    });
    format!("http://{addr}")
}

fn loopback_config() -> AppConfig {
    AppConfig {
        proxy_allowed_hosts: vec!["127.0.0.1".to_string()],
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn proxy_relays_asset_with_cors_and_cache_headers() {
    let base = spawn_upstream().await;
    let h = harness_with(MockProvider::new(), loopback_config(), PUBLIC_BASE, false);

    let response = h
        .router
        .oneshot(get_request(&format!(
            "/api/proxy-model?url={base}/models/model.glb"
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "model/gltf-binary");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        headers[header::CACHE_CONTROL],
        "public, max-age=31536000, immutable"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"glb-bytes");
}

#[tokio::test]
async fn proxy_relays_upstream_status() {
    let base = spawn_upstream().await;
    let h = harness_with(MockProvider::new(), loopback_config(), PUBLIC_BASE, false);

    let response = h
        .router
        .oneshot(get_request(&format!(
            "/api/proxy-model?url={base}/models/missing.glb"
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["error"], "Failed to fetch model: 404");
}

#[tokio::test]
async fn proxy_does_not_follow_redirects() {
    let base = spawn_upstream().await;
    let h = harness_with(MockProvider::new(), loopback_config(), PUBLIC_BASE, false);

    let response = h
        .router
        .oneshot(get_request(&format!(
            "/api/proxy-model?url={base}/models/moved.glb"
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["error"], "Failed to fetch model: 307");
    assert!(!String::from_utf8_lossy(&bytes).contains("internal-secret"));
}

#[tokio::test]
async fn proxy_gives_up_on_stalled_upstream() {
    let base = spawn_upstream().await;
    let config = AppConfig {
        provider_timeout_secs: 1,
        ..loopback_config()
    };
    let h = harness_with(MockProvider::new(), config, PUBLIC_BASE, false);
    let started = std::time::Instant::now();

    let response = h
        .router
        .oneshot(get_request(&format!(
            "/api/proxy-model?url={base}/models/stalled.glb"
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    let json = json_body(response).await;
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to proxy model"));
}

#[tokio::test]
async fn probes_report_provider_configuration() {
    let h = harness(MockProvider::new());
    let live = h.router.clone().oneshot(get_request("/api/live")).await.unwrap();
    assert_eq!(live.status(), StatusCode::OK);
    let ready = h.router.oneshot(get_request("/api/ready")).await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    let h = harness(MockProvider::new().unconfigured());
    let ready = h.router.oneshot(get_request("/api/ready")).await.unwrap();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = json_body(ready).await;
    assert_eq!(json["checks"]["provider"], "fail");
}
