use crate::auth::AuthVerifier;
use crate::config::ApiConfig;
use crate::gallery_store::RecordStore;
use crate::instagram::InstagramImageExtractor;
use crate::link_metadata::{MetadataFetcher, MetadataResult};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, HeaderName, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub metadata_fetcher: Arc<MetadataFetcher>,
    pub extractor: Arc<InstagramImageExtractor>,
    pub auth: Arc<dyn AuthVerifier>,
    pub record_store: Arc<dyn RecordStore>,
}

/// Body of `POST /fetch-link-metadata`
#[derive(Debug, Deserialize)]
pub struct FetchMetadataRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// Body of `POST /download-instagram-images`
#[derive(Debug, Deserialize)]
pub struct DownloadImagesRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "linkId")]
    pub link_id: Option<String>,
}

/// Error response for rejected requests
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error response of the metadata endpoint
#[derive(Debug, Serialize)]
pub struct MetadataErrorResponse {
    pub error: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Error response of the image download endpoint
#[derive(Debug, Serialize)]
pub struct DownloadErrorResponse {
    pub error: String,
    pub success: bool,
    pub downloaded: usize,
}

impl DownloadErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            success: false,
            downloaded: 0,
        }
    }
}

/// Headers browsers may send on cross-origin calls
const ALLOWED_HEADERS: [HeaderName; 4] = [
    AUTHORIZATION,
    HeaderName::from_static("x-client-info"),
    HeaderName::from_static("apikey"),
    CONTENT_TYPE,
];

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(ALLOWED_HEADERS);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/fetch-link-metadata", post(fetch_link_metadata))
        .route("/download-instagram-images", post(download_instagram_images))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "linkkeeper-functions"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.record_store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Resolve title and thumbnail for a pasted URL
#[instrument(skip_all)]
async fn fetch_link_metadata(
    State(state): State<AppState>,
    payload: Result<Json<FetchMetadataRequest>, JsonRejection>,
) -> Response {
    let url = match payload {
        Ok(Json(request)) => non_empty(request.url),
        Err(rejection) => {
            warn!(error = %rejection, "Rejected metadata request body");
            None
        }
    };

    let Some(url) = url else {
        return bad_request("URL is required");
    };

    info!(url = %url, "Fetching metadata");

    let outcome = state.metadata_fetcher.fetch_metadata(&url).await;
    match outcome.error {
        None => Json::<MetadataResult>(outcome.result).into_response(),
        Some(error) => {
            error!(url = %url, error = %error, "Error fetching metadata");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MetadataErrorResponse {
                    error,
                    title: None,
                    thumbnail_url: None,
                }),
            )
                .into_response()
        }
    }
}

/// Mirror the images of an Instagram post into the caller's gallery
#[instrument(skip_all)]
async fn download_instagram_images(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DownloadImagesRequest>, JsonRejection>,
) -> Response {
    let (url, link_id) = match payload {
        Ok(Json(request)) => (non_empty(request.url), non_empty(request.link_id)),
        Err(rejection) => {
            warn!(error = %rejection, "Rejected download request body");
            (None, None)
        }
    };

    let (Some(url), Some(link_id)) = (url, link_id) else {
        return bad_request("URL and linkId are required");
    };

    let Some(credential) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    else {
        return download_failure("No authorization header");
    };

    let user_id = match state.auth.verify(credential).await {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!(error = %e, "Credential rejected");
            return download_failure("Unauthorized");
        }
    };

    match state
        .extractor
        .extract_and_store(&url, &link_id, &user_id)
        .await
    {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            error!(url = %url, error = %e, "Error in download-instagram-images");
            download_failure(e.to_string())
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn download_failure(message: impl Into<String>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(DownloadErrorResponse::new(message)),
    )
        .into_response()
}

/// Start the functions API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting functions API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
