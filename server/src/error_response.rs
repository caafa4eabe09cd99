//! Maps [`shared::error::AppError`] onto an HTTP response. A thin local
//! newtype is required here only because of the orphan rule — neither
//! `actix_web::ResponseError` nor `AppError` is defined in this crate.

use actix_web::{HttpResponse, ResponseError};
use shared::dto::ErrorResponse;
use shared::error::AppError;

#[derive(Debug)]
pub struct ApiError(pub AppError);

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError(e)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::from_u16(self.0.code.http_status()).unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.0.message.clone(),
            code: self.0.code.as_str(),
        })
    }
}
