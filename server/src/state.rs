use std::sync::Arc;

use shared::config::Settings;
use shared::handlers::HandlerCtx;
use shared::queue::Queue;
use shared::rate_limit::RateLimiter;
use shared::temp_store::TempStore;

/// Shared handles every route needs, mirroring the `AppState`-holds-shared-
/// handles pattern `upload-api`/`api-gateway` use for their own request
/// context.
#[derive(Clone)]
pub struct AppState {
    pub queue: Queue,
    pub store: TempStore,
    pub settings: Arc<Settings>,
    pub ctx: Arc<HandlerCtx>,
    pub rate_limiter: Arc<RateLimiter>,
}
