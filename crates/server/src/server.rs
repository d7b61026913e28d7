//! HTTP surface of the file access service.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::map_response_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use impview_common::{
    FileQuery, HEALTH_ROUTE, IMAGE_ROUTE, ImageQuery, LOGS_ROUTE, LogsResponse, STATUS_ROUTE,
    StatusResponse,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{AccessError, Result};
use crate::files::FileAccess;

const ALLOW_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    files: Arc<FileAccess>,
}

/// Build the router serving `files`, sending `allow_origin` as CORS origin.
pub fn router(files: FileAccess, allow_origin: &str) -> std::result::Result<Router, String> {
    let origin = HeaderValue::from_str(allow_origin)
        .map_err(|e| format!("Invalid allow-origin '{allow_origin}': {e}"))?;
    let state = AppState {
        files: Arc::new(files),
    };

    Ok(Router::new()
        .route(LOGS_ROUTE, get(logs))
        .route(STATUS_ROUTE, get(status))
        .route(IMAGE_ROUTE, get(image))
        .route(HEALTH_ROUTE, get(health_check))
        .with_state(state)
        .layer(map_response_with_state(origin, add_cors_headers)))
}

/// Run the file access service until Ctrl+C.
pub async fn run_server(config: ServerConfig) -> std::result::Result<(), String> {
    let files = FileAccess::new(&config)?;
    let log_root = files.log_root().to_path_buf();
    let app = router(files, &config.allow_origin)?;

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind to {addr}: {e}"))?;

    info!(
        %addr,
        log_root = %log_root.display(),
        containment = ?config.containment,
        "API server running on http://{addr}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {e}"))?;

    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => debug!("Received Ctrl+C, shutting down server."),
        Err(err) => {
            warn!(error = %err, "Failed to listen for Ctrl+C; running until killed.");
            std::future::pending::<()>().await;
        }
    }
}

async fn add_cors_headers(State(origin): State<HeaderValue>, mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    response
}

/// Query parameters of a request, or a JSON 400 when they do not parse.
fn params<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| AccessError::InvalidQuery(rejection.body_text()))
}

fn required(value: Option<String>, name: &'static str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AccessError::MissingParameter(name)),
    }
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn logs(
    State(state): State<AppState>,
    query: std::result::Result<Query<FileQuery>, QueryRejection>,
) -> Result<Json<LogsResponse>> {
    let file = required(params(query)?.file, "file")?;
    let snapshot = state.files.logs(&file).await?;
    Ok(Json(LogsResponse {
        records: snapshot.records,
        last_modified: snapshot.last_modified,
    }))
}

async fn status(
    State(state): State<AppState>,
    query: std::result::Result<Query<FileQuery>, QueryRejection>,
) -> Result<Json<StatusResponse>> {
    let file = required(params(query)?.file, "file")?;
    let last_modified = state.files.status(&file).await?;
    Ok(Json(StatusResponse { last_modified }))
}

async fn image(
    State(state): State<AppState>,
    query: std::result::Result<Query<ImageQuery>, QueryRejection>,
) -> Result<Response> {
    let reference = required(params(query)?.path, "path")?;
    let image = state.files.image(&reference).await?;
    debug!(path = %image.path.display(), bytes = image.bytes.len(), "Serving image.");
    Ok(([(header::CONTENT_TYPE, image.content_type)], image.bytes).into_response())
}
