use actix_web::{web, HttpResponse};
use uuid::Uuid;

use shared::dto::{JobStatus, JobStatusResponse};

use crate::error_response::ApiError;
use crate::state::AppState;

pub async fn status(id: web::Path<Uuid>, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let record = match state.queue.get(*id) {
        Some(r) => r,
        None => return Ok(HttpResponse::NotFound().finish()),
    };

    let download_url = match record.status {
        JobStatus::Succeeded => Some(format!("/jobs/download/{}", record.id)),
        _ => None,
    };

    Ok(HttpResponse::Ok().json(JobStatusResponse {
        status: record.status,
        progress: record.progress,
        error: record.error,
        error_code: record.error_code.map(|c| c.as_str()),
        download_url,
        created_at: record.created_at_wall,
        started_at: record.started_at_wall,
        finished_at: record.finished_at_wall,
    }))
}
