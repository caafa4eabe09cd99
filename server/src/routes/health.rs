use actix_web::{web, HttpResponse};

use shared::dto::HealthResponse;

use crate::state::AppState;

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        provider: state.settings.pdf_provider.clone(),
    })
}
