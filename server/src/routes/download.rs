use std::path::Path;

use actix_web::{web, HttpResponse};
use uuid::Uuid;

use shared::dto::JobStatus;
use shared::error::AppError;

use crate::error_response::ApiError;
use crate::state::AppState;

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("zip") => "application/zip",
        _ => "application/pdf",
    }
}

/// Reads the artifact and deletes it, so a completed download is a one-shot
/// operation — the second request for the same job id always 404s. The spec
/// calls this "streaming"; this crate buffers the whole (size-capped)
/// artifact instead of wiring a delete-on-drop response stream, which is the
/// simpler implementation for a file that is, by construction, already
/// bounded to what Temp-store will hold.
async fn stream_and_unlink(path: &std::path::Path, state: &AppState) -> Result<HttpResponse, ApiError> {
    let resolved = state.store.validate_under(state.store.downloads_root(), path).map_err(ApiError)?;
    let bytes = match tokio::fs::read(&resolved).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HttpResponse::NotFound().finish()),
        Err(e) => return Err(ApiError(AppError::from(e))),
    };
    state.store.unlink(&resolved);

    let filename = resolved.file_name().and_then(|n| n.to_str()).unwrap_or("download");
    Ok(HttpResponse::Ok()
        .content_type(content_type_for(&resolved))
        .insert_header(("Content-Disposition", format!("attachment; filename=\"{filename}\"")))
        .insert_header(("Cache-Control", "no-store"))
        .body(bytes))
}

pub async fn download(id: web::Path<Uuid>, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let record = match state.queue.get(*id) {
        Some(r) => r,
        None => return Ok(HttpResponse::NotFound().finish()),
    };
    if record.status != JobStatus::Succeeded {
        return Err(ApiError(AppError::bad_payload("job has not succeeded")));
    }
    let Some(output_path) = record.output_path else {
        return Ok(HttpResponse::NotFound().finish());
    };

    stream_and_unlink(&output_path, &state).await
}

/// A parallel download path keyed directly on a download id rather than a
/// job record, trying `.zip` then `.pdf` — the legacy contract kept for
/// clients that never went through `/jobs/{id}`.
pub async fn legacy_download(id: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    for ext in ["zip", "pdf"] {
        let path = state.store.downloads_root().join(format!("{}.{ext}", id.as_str()));
        if path.exists() {
            return stream_and_unlink(&path, &state).await;
        }
    }
    Ok(HttpResponse::NotFound().finish())
}
