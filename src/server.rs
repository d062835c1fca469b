use crate::config::ServerConfig;
use crate::error::GrabError;
use crate::models::{ChapterRange, DownloadRequest, DownloadResult};
use crate::orchestrator::Orchestrator;
use crate::registry::AdapterRegistry;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AdapterRegistry>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(registry: AdapterRegistry, orchestrator: Orchestrator) -> Self {
        Self {
            registry: Arc::new(registry),
            orchestrator: Arc::new(orchestrator),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeBody {
    pub url: Option<String>,
    pub site: Option<String>,
    pub title: Option<String>,
    pub chapter_start: Option<u32>,
    pub chapter_end: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ScrapeCounts {
    pub count: usize,
    pub candidates: usize,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("No images found")]
    NoContent,
    #[error("{0}")]
    Failed(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NoContent | ApiError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        let body = match self {
            ApiError::NoContent => {
                let counts = ScrapeCounts {
                    count: 0,
                    candidates: 0,
                };
                json!({ "status": "error", "message": message, "result": counts })
            }
            _ => json!({ "status": "error", "message": message }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<GrabError> for ApiError {
    fn from(error: GrabError) -> Self {
        match error {
            GrabError::SiteNotSupported(site) => {
                ApiError::BadRequest(format!("Scraper for {} is not available yet", site))
            }
            e if e.is_validation() => ApiError::BadRequest(e.to_string()),
            e => ApiError::Failed(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/scrape", post(scrape))
        .route("/api/download", post(scrape))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "scrapers": state.registry.identifiers(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn scrape(
    State(state): State<AppState>,
    body: Result<Json<ScrapeBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = body?;

    let (url, site) = match (non_empty(body.url.as_deref()), non_empty(body.site.as_deref())) {
        (Some(url), Some(site)) => (url, site),
        _ => return Err(ApiError::BadRequest("URL and site are required".to_string())),
    };

    // Validation happens before any browser is launched.
    let adapter = state.registry.lookup(site)?;
    let chapters = ChapterRange::from_bounds(body.chapter_start, body.chapter_end)?;
    let request = DownloadRequest::new(url, adapter.site(), body.title.as_deref())?
        .with_chapters(chapters);

    info!("Starting scrape for {}: {}", adapter.site(), request.source_url);
    let result = state.orchestrator.run(&request, adapter.as_ref()).await;

    into_response_body(result).map(Json)
}

fn into_response_body(result: DownloadResult) -> Result<serde_json::Value, ApiError> {
    if result.success {
        let counts = ScrapeCounts {
            count: result.count,
            candidates: result.candidates,
        };
        return Ok(json!({
            "status": "success",
            "message": "Download completed",
            "result": counts,
        }));
    }

    match result.error {
        Some(message) => Err(ApiError::Failed(message)),
        None => Err(ApiError::NoContent),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub async fn run(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let address: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(address).await?;
    info!(%address, "MangaGrab API listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
