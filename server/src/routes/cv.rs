use actix_web::{web, HttpRequest, HttpResponse};

use shared::dto::{CvGeneratePayload, EnqueueResponse, JobKind, JobPayload};

use crate::error_response::ApiError;
use crate::state::AppState;

fn client_key(req: &HttpRequest) -> String {
    req.headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or("anon")
        .to_string()
}

/// `cv-generate` has no uploaded file, so it goes through the queue like
/// every other job kind instead of rendering synchronously on the request
/// thread — consistent with the `protect`/`unlock` uniformity choice.
pub async fn generate(req: HttpRequest, body: web::Json<CvGeneratePayload>, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let record = state.queue.enqueue(JobKind::CvGenerate, client_key(&req), JobPayload::CvGenerate { cv: body.into_inner() }, vec![]);
    Ok(HttpResponse::Accepted().json(EnqueueResponse { job_id: record.id }))
}
