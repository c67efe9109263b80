//! HTTP server for image cache endpoints
//!
//! Provides /health, /image, /prefetch, /cache and /config endpoints.

use crate::types::{
    ConfigUpdate, EvictionResponse, HealthResponse, ImageQuery, PrefetchQuery, PrefetchResponse,
    RemoveResponse, SizeResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use image_blob_cache::{CacheError, CompletionCallback, ImageCache};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: ImageCache,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: ImageCache) -> Self {
        Self {
            cache,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/image", get(get_image).delete(remove_image))
        .route("/prefetch", post(prefetch))
        .route("/cache", delete(clear_cache))
        .route("/cache/size", get(cache_size))
        .route("/cache/sweep", post(sweep_cache))
        .route("/cache/{key}", delete(remove_key))
        .route("/config", put(update_config))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

fn error_response(status: StatusCode, err: &CacheError) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn status_for(err: &CacheError) -> StatusCode {
    match err {
        CacheError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        CacheError::NotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_network() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Guess an image content type from its leading bytes
fn sniff_content_type(data: &[u8]) -> &'static str {
    match data {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache_stats = state.cache.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: cache_stats,
    })
}

/// Serve an image, fetching it on a miss
async fn get_image(
    State(state): State<SharedState>,
    Query(query): Query<ImageQuery>,
) -> Response {
    match state.cache.fetch_image_with_source(&query.url).await {
        Ok((data, from_cache)) => {
            let cache_header = if from_cache { "HIT" } else { "MISS" };

            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, sniff_content_type(&data)),
                    (header::CACHE_CONTROL, "public, max-age=86400"),
                    (HeaderName::from_static("x-cache"), cache_header),
                ],
                data,
            )
                .into_response()
        }
        Err(e) => {
            warn!(url = %query.url, error = %e, "Failed to fetch image");
            error_response(status_for(&e), &e)
        }
    }
}

/// Start caching an image without waiting for it
async fn prefetch(
    State(state): State<SharedState>,
    Query(query): Query<PrefetchQuery>,
) -> Json<PrefetchResponse> {
    let url = query.url.clone();
    let on_complete: CompletionCallback =
        Box::new(move |result: image_blob_cache::Result<Vec<u8>>| {
            if let Ok(data) = result {
                info!(url = %url, size = data.len(), "Prefetched image");
            }
        });

    let started = state
        .cache
        .cache_in_background(
            &query.url,
            query.timeout_ms.map(Duration::from_millis),
            Some(on_complete),
        )
        .await;

    Json(PrefetchResponse { started })
}

async fn remove_image(
    State(state): State<SharedState>,
    Query(query): Query<ImageQuery>,
) -> Response {
    match state.cache.remove_by_url(&query.url).await {
        Ok(removed) => Json(RemoveResponse { removed }).into_response(),
        Err(e) => {
            warn!(url = %query.url, error = %e, "Failed to remove image");
            error_response(status_for(&e), &e)
        }
    }
}

async fn remove_key(State(state): State<SharedState>, Path(key): Path<String>) -> Response {
    match state.cache.remove_by_key(&key).await {
        Ok(removed) => Json(RemoveResponse { removed }).into_response(),
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to remove cache entry");
            error_response(status_for(&e), &e)
        }
    }
}

async fn clear_cache(State(state): State<SharedState>) -> Json<EvictionResponse> {
    let removed = state.cache.clear().await;
    info!(removed, "Cache cleared");
    Json(EvictionResponse { removed })
}

async fn sweep_cache(State(state): State<SharedState>) -> Json<EvictionResponse> {
    let removed = state.cache.sweep_expired().await;
    Json(EvictionResponse { removed })
}

async fn cache_size(State(state): State<SharedState>) -> Json<SizeResponse> {
    Json(SizeResponse {
        total_size: state.cache.total_cache_size().await,
    })
}

async fn update_config(
    State(state): State<SharedState>,
    Json(update): Json<ConfigUpdate>,
) -> Response {
    if update.sets_root_folder() {
        warn!("Rejected attempt to move the cache root over HTTP");
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "root_folder cannot be changed at runtime".to_string(),
            }),
        )
            .into_response();
    }

    let config = state.cache.configure(update.into_options()).await;
    info!(config = ?config, "Cache configuration updated");
    Json(config).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use async_trait::async_trait;
    use image_blob_cache::{derive_key, CacheConfiguration, Fetcher, MemoryEntryStore};
    use std::path::Path as FsPath;
    use tempfile::tempdir;
    use tower::ServiceExt;

    const CAT_URL: &str = "https://example.com/cat.png";
    const CAT_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A];

    /// Answers CAT_URL with a PNG header and everything else with a 404
    struct CatFetcher;

    #[async_trait]
    impl Fetcher for CatFetcher {
        async fn fetch(
            &self,
            url: &str,
            _timeout: Duration,
        ) -> image_blob_cache::Result<Vec<u8>> {
            if url == CAT_URL {
                Ok(CAT_PNG.to_vec())
            } else {
                Err(CacheError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            }
        }
    }

    async fn create_test_state(cache_dir: &FsPath) -> SharedState {
        let config = CacheConfiguration {
            root_folder: cache_dir.to_path_buf(),
            ..Default::default()
        };
        let cache = ImageCache::open(
            config,
            Arc::new(MemoryEntryStore::new()),
            Arc::new(CatFetcher),
        )
        .await;
        Arc::new(ServerState::new(cache))
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Body) -> Response {
        router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn image_uri(url: &str) -> String {
        format!("/image?url={}", url)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path()).await);

        let response = send(&router, Method::GET, "/health", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].as_u64().is_some());
        assert_eq!(json["cache"]["entries"], 0);
    }

    #[tokio::test]
    async fn test_image_miss_then_hit() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path()).await);

        let response = send(&router, Method::GET, &image_uri(CAT_URL), Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "MISS");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], CAT_PNG);

        let response = send(&router, Method::GET, &image_uri(CAT_URL), Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "HIT");
    }

    #[tokio::test]
    async fn test_image_refetched_after_file_loss_is_miss() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path()).await);

        let response = send(&router, Method::GET, &image_uri(CAT_URL), Body::empty()).await;
        assert_eq!(response.headers()["x-cache"], "MISS");

        std::fs::remove_file(dir.path().join(derive_key(CAT_URL))).unwrap();

        let response = send(&router, Method::GET, &image_uri(CAT_URL), Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "MISS");

        let response = send(&router, Method::GET, &image_uri(CAT_URL), Body::empty()).await;
        assert_eq!(response.headers()["x-cache"], "HIT");
    }

    #[tokio::test]
    async fn test_image_fetch_failure_is_bad_gateway() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path()).await);

        let response = send(
            &router,
            Method::GET,
            &image_uri("https://example.com/nope.png"),
            Body::empty(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_image_requires_url() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path()).await);

        let response = send(&router, Method::GET, "/image", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_prefetch_reports_already_cached() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        let router = create_router(state.clone());

        state.cache.fetch_image(CAT_URL).await.unwrap();

        let uri = format!("/prefetch?url={}&timeout_ms=500", CAT_URL);
        let response = send(&router, Method::POST, &uri, Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["started"], false);
    }

    #[tokio::test]
    async fn test_prefetch_starts_fetch() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        let router = create_router(state.clone());

        let uri = format!("/prefetch?url={}", CAT_URL);
        let response = send(&router, Method::POST, &uri, Body::empty()).await;
        assert_eq!(json_body(response).await["started"], true);
    }

    #[tokio::test]
    async fn test_remove_endpoints() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        let router = create_router(state.clone());

        state.cache.fetch_image(CAT_URL).await.unwrap();
        let uri = format!("/cache/{}", derive_key(CAT_URL));

        let response = send(&router, Method::DELETE, &uri, Body::empty()).await;
        assert_eq!(json_body(response).await["removed"], true);

        let response = send(&router, Method::DELETE, &uri, Body::empty()).await;
        assert_eq!(json_body(response).await["removed"], false);

        state.cache.fetch_image(CAT_URL).await.unwrap();
        let response = send(&router, Method::DELETE, &image_uri(CAT_URL), Body::empty()).await;
        assert_eq!(json_body(response).await["removed"], true);
        assert!(!state.cache.contains_url(CAT_URL).await);
    }

    #[tokio::test]
    async fn test_size_sweep_and_clear() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        let router = create_router(state.clone());

        state.cache.fetch_image(CAT_URL).await.unwrap();

        let response = send(&router, Method::GET, "/cache/size", Body::empty()).await;
        assert_eq!(json_body(response).await["total_size"], CAT_PNG.len() as u64);

        let response = send(&router, Method::POST, "/cache/sweep", Body::empty()).await;
        assert_eq!(json_body(response).await["removed"], 0);

        let response = send(&router, Method::DELETE, "/cache", Body::empty()).await;
        assert_eq!(json_body(response).await["removed"], 1);
        assert_eq!(state.cache.total_cache_size().await, 0);
    }

    #[tokio::test]
    async fn test_update_config() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path()).await);

        let body = Body::from(r#"{"default_ttl_seconds": 60, "unknown": 1}"#);
        let response = send(&router, Method::PUT, "/config", body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["default_ttl_seconds"], 60);
        assert_eq!(json["remote_backup_enabled"], true);
    }

    #[tokio::test]
    async fn test_update_config_rejects_root_folder() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;
        let router = create_router(state.clone());
        let elsewhere = dir.path().join("elsewhere");

        let body = Body::from(format!(
            r#"{{"root_folder": "{}", "default_ttl_seconds": 60}}"#,
            elsewhere.display()
        ));
        let response = send(&router, Method::PUT, "/config", body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let config = state.cache.config().await;
        assert_eq!(config.root_folder, dir.path());
        assert_eq!(config.default_ttl_seconds, 43200);

        state.cache.fetch_image(CAT_URL).await.unwrap();
        assert!(!elsewhere.exists());
        assert!(dir.path().join(derive_key(CAT_URL)).exists());
    }

    #[test]
    fn test_sniff_content_type() {
        assert_eq!(sniff_content_type(CAT_PNG), "image/png");
        assert_eq!(sniff_content_type(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_content_type(b"GIF89a"), "image/gif");
        assert_eq!(sniff_content_type(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_content_type(b"hello"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_server_state_new() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path()).await;

        // started_at should be close to now
        let diff = (Utc::now() - state.started_at).num_seconds();
        assert!((0..5).contains(&diff));
    }
}
