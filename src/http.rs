//! HTTP surface: chat, upload, file listing and deletion.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::ChatTurn;
use crate::context::AppContext;
use crate::rebuild::RebuildStatus;

/// Extensions accepted by `/upload`. Only txt, md and pdf are indexed.
pub const UPLOAD_EXTENSIONS: &[&str] = &[
    "txt", "pdf", "png", "jpg", "jpeg", "gif", "docx", "pptx", "xlsx", "md",
];

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize, PartialEq)]
struct FileItem {
    id: String,
    name: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn server_error(details: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Server error", "details": details.to_string() })),
    )
        .into_response()
}

fn too_large(max_bytes: usize) -> Response {
    error_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        &format!("File too large. Max size: {}MB.", max_bytes / (1024 * 1024)),
    )
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Non-ASCII characters are dropped, path separators and whitespace become
/// `_`, anything outside `[A-Za-z0-9._-]` is removed, and leading or trailing
/// dots and underscores are trimmed. May return an empty string.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

pub fn is_allowed_upload(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => UPLOAD_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    let allowed_origins = &ctx.config.http_server.allowed_origins;
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };
    let max_upload = ctx.config.http_server.max_upload_bytes;

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/upload", post(handle_upload))
        .route("/files", get(handle_list_files))
        .route("/files/:filename", delete(handle_delete_file))
        .route("/health", get(handle_health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(max_upload)),
        )
        .with_state(ctx)
}

/// Bind `0.0.0.0:{port}` and serve until the context is cancelled.
pub async fn serve(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", ctx.config.http_server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;
    log::info!("Listening on http://{}", addr);

    let cancel = ctx.cancel.clone();
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
}

async fn handle_chat(State(ctx): State<Arc<AppContext>>, Json(body): Json<ChatBody>) -> Response {
    let cancel = ctx.cancel.child_token();
    match ctx.agent.chat(&body.history, &body.message, &cancel).await {
        Ok(outcome) => Json(json!({ "response": outcome.answer })).into_response(),
        Err(e) => {
            log::error!("Chat request failed: {}", e);
            server_error(e)
        }
    }
}

async fn handle_upload(State(ctx): State<Arc<AppContext>>, mut multipart: Multipart) -> Response {
    let max_upload = ctx.config.http_server.max_upload_bytes;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return error_response(StatusCode::BAD_REQUEST, "No file part"),
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return too_large(max_upload),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.body_text()),
        };
        if field.name() != Some("file") {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() || !is_allowed_upload(&original) {
            return error_response(StatusCode::BAD_REQUEST, "File type not allowed or empty");
        }
        let filename = secure_filename(&original);
        if filename.is_empty() || !is_allowed_upload(&filename) {
            return error_response(StatusCode::BAD_REQUEST, "File type not allowed or empty");
        }

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return too_large(max_upload),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.body_text()),
        };

        let target = ctx.config.watch_folder().join(&filename);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            log::info!("Upload {} already exists, keeping the stored copy", filename);
        } else if let Err(e) = tokio::fs::write(&target, &bytes).await {
            log::error!("Failed to save upload {}: {}", filename, e);
            return server_error(e);
        } else {
            log::info!("Saved upload {} ({} bytes)", filename, bytes.len());
        }

        // The pass runs in the background; the ticket is not awaited.
        drop(ctx.rebuild.request(format!("upload {}", filename)));
        return Json(json!({ "message": "File uploaded successfully", "filename": filename }))
            .into_response();
    }
}

async fn handle_list_files(State(ctx): State<Arc<AppContext>>) -> Response {
    match list_files(ctx.config.watch_folder()).await {
        Ok(items) => Json(items).into_response(),
        Err(e) => server_error(e),
    }
}

async fn list_files(folder: &Path) -> std::io::Result<Vec<FileItem>> {
    let mut entries = tokio::fs::read_dir(folder).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names
        .into_iter()
        .map(|name| FileItem {
            id: name.clone(),
            name,
        })
        .collect())
}

async fn handle_delete_file(
    State(ctx): State<Arc<AppContext>>,
    UrlPath(filename): UrlPath<String>,
) -> Response {
    // Only bare names inside the watched folder can be addressed
    if secure_filename(&filename) != filename {
        return error_response(StatusCode::NOT_FOUND, "File not found");
    }
    let target = ctx.config.watch_folder().join(&filename);
    if !tokio::fs::metadata(&target).await.map(|m| m.is_file()).unwrap_or(false) {
        return error_response(StatusCode::NOT_FOUND, "File not found");
    }
    if let Err(e) = tokio::fs::remove_file(&target).await {
        return server_error(e);
    }

    log::info!("Deleted {}", filename);
    drop(ctx.rebuild.request(format!("delete {}", filename)));
    Json(json!({ "message": format!("File '{}' deleted successfully", filename) })).into_response()
}

async fn handle_health(State(ctx): State<Arc<AppContext>>) -> Response {
    let rebuild = match ctx.rebuild.status() {
        RebuildStatus::Idle => "idle".to_string(),
        RebuildStatus::Running => "running".to_string(),
        RebuildStatus::Succeeded(_) => "ok".to_string(),
        RebuildStatus::Failed(message) => format!("failed: {}", message),
    };
    Json(json!({
        "status": "ok",
        "generation": ctx.guard.generation(),
        "rebuild": rebuild,
    }))
    .into_response()
}
