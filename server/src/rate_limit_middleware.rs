//! `actix_web` `Transform`/`Service` middleware wrapping
//! [`shared::rate_limit::RateLimiter`], applied before the upload validator
//! and before the handler sees the request at all — matching the spec's
//! "enforced before validation; on exhaustion respond 429 and do not touch
//! the queue" requirement.

use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpResponse};

use shared::dto::ErrorResponse;
use shared::error::ErrorCode;
use shared::rate_limit::RateLimiter;

pub struct RateLimit {
    pub limiter: Arc<RateLimiter>,
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let client_key = req
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .unwrap_or("anon")
            .to_string();
        let limiter = self.limiter.clone();
        let service = self.service.clone();

        Box::pin(async move {
            if limiter.check(&client_key).await {
                let res = service.call(req).await?;
                Ok(res.map_into_left_body())
            } else {
                let response = HttpResponse::TooManyRequests().json(ErrorResponse {
                    error: "rate limit exceeded".to_string(),
                    code: ErrorCode::RateLimited.as_str(),
                });
                Ok(req.into_response(response).map_into_right_body())
            }
        })
    }
}
