//! HTTP surface for the PDF pipeline: enqueue/status/download/health routes
//! over the `shared` crate's queue, worker pool, and handlers. Wiring
//! mirrors `upload-api`'s `AppState` + `HttpServer::new(move || App::new()...)`
//! shape, generalized from one upload endpoint to the full job-kind set.

mod error_response;
mod multipart;
mod rate_limit_middleware;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use shared::config::Settings;
use shared::dto::JobStatus;
use shared::handlers::HandlerCtx;
use shared::queue::Queue;
use shared::rate_limit::RateLimiter;
use shared::temp_store::TempStore;

use crate::rate_limit_middleware::RateLimit;
use crate::state::AppState;

/// Runs the reaper every 60s, per the spec's periodic-reap cadence.
fn spawn_reaper(queue: Queue, store: TempStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            queue.reap(&store);
        }
    });
}

/// Waits up to `grace` for every running job to leave the `running` state,
/// polling the queue rather than a dedicated channel since the queue is
/// already the single source of truth for job state.
async fn wait_for_workers_to_drain(queue: &Queue, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        let still_running = queue.list().iter().any(|r| r.status == JobStatus::Running);
        if !still_running || tokio::time::Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let settings = Arc::new(Settings::new().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load settings from environment, using defaults");
        Settings::default()
    }));

    let store = TempStore::new(settings.uploads_dir.clone(), settings.downloads_dir.clone())?;
    let queue = Queue::new(settings.queue_concurrency, settings.queue_max_per_user, settings.job_ttl(), settings.output_ttl());
    let ctx = Arc::new(HandlerCtx {
        store: store.clone(),
        settings: settings.clone(),
    });
    let rate_limiter = Arc::new(RateLimiter::new(settings.rate_limit_window(), settings.rate_limit_max));

    spawn_reaper(queue.clone(), store.clone());

    let worker_handles = shared::worker::spawn_pool(settings.worker_count(), queue.clone(), store.clone(), ctx.clone(), settings.job_timeout(), |payload, ctx| {
        shared::handlers::dispatch(payload, ctx)
    });

    let app_state = web::Data::new(AppState {
        queue: queue.clone(),
        store,
        settings: settings.clone(),
        ctx,
        rate_limiter,
    });

    tracing::info!(
        concurrency = settings.queue_concurrency,
        max_per_user = settings.queue_max_per_user,
        "starting pdf pipeline server"
    );

    let shutdown_grace_secs = settings.shutdown_grace_ms / 1000;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Cors::permissive())
            .wrap(RateLimit {
                limiter: app_state.rate_limiter.clone(),
            })
            .route("/pdf/{op}", web::post().to(routes::enqueue::enqueue))
            .route("/cv/generate", web::post().to(routes::cv::generate))
            .route("/jobs/{id}", web::get().to(routes::status::status))
            .route("/jobs/download/{id}", web::get().to(routes::download::download))
            .route("/downloads/{id}", web::get().to(routes::download::legacy_download))
            .route("/health", web::get().to(routes::health::health))
    })
    .bind(("0.0.0.0", 8080))?
    .shutdown_timeout(shutdown_grace_secs)
    .run();

    server.await?;

    tracing::info!("http server stopped, draining in-flight jobs");
    wait_for_workers_to_drain(&queue, settings.shutdown_grace()).await;
    for handle in worker_handles {
        handle.abort();
    }

    Ok(())
}

/// HTTP surface tests, grounded on `api-gateway`'s/`pdf-ingest`'s
/// `test::init_service(App::new().route(...))` + `test::call_service` shape.
/// No worker pool is spawned here: these tests only exercise the routes
/// (enqueue/validate/status/download/health/rate-limit), not job execution.
#[cfg(test)]
mod tests {
    use actix_web::{test, web, App};
    use shared::config::Settings;
    use shared::dto::JobStatus;
    use shared::handlers::HandlerCtx;
    use shared::queue::Queue;
    use shared::rate_limit::RateLimiter;
    use shared::temp_store::TempStore;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::rate_limit_middleware::RateLimit;
    use crate::routes;
    use crate::state::AppState;

    fn test_state(rate_limit_max: u32) -> (web::Data<AppState>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Arc::new(Settings {
            uploads_dir: tmp.path().join("uploads").to_string_lossy().into_owned(),
            downloads_dir: tmp.path().join("downloads").to_string_lossy().into_owned(),
            rate_limit_max,
            ..Settings::default()
        });
        let store = TempStore::new(settings.uploads_dir.clone(), settings.downloads_dir.clone()).unwrap();
        let queue = Queue::new(settings.queue_concurrency, settings.queue_max_per_user, settings.job_ttl(), settings.output_ttl());
        let ctx = Arc::new(HandlerCtx {
            store: store.clone(),
            settings: settings.clone(),
        });
        let rate_limiter = Arc::new(RateLimiter::new(settings.rate_limit_window(), settings.rate_limit_max));
        let state = web::Data::new(AppState {
            queue,
            store,
            settings,
            ctx,
            rate_limiter,
        });
        (state, tmp)
    }

    fn multipart_body(boundary: &str, files: &[(&str, &str, &[u8])], fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field_name, filename, content) in files {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\n").as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        for (name, value) in fields {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }

    const TINY_PDF: &[u8] = b"%PDF-1.4\ncontent";

    #[actix_web::test]
    async fn health_reports_ok_and_configured_provider() {
        let (state, _tmp) = test_state(1000);
        let app = test::init_service(App::new().app_data(state).route("/health", web::get().to(routes::health::health))).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn unknown_job_id_is_404() {
        let (state, _tmp) = test_state(1000);
        let app = test::init_service(App::new().app_data(state).route("/jobs/{id}", web::get().to(routes::status::status))).await;
        let req = test::TestRequest::get().uri(&format!("/jobs/{}", uuid::Uuid::new_v4())).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[actix_web::test]
    async fn merge_enqueues_and_is_visible_as_queued() {
        let (state, _tmp) = test_state(1000);
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/pdf/{op}", web::post().to(routes::enqueue::enqueue))
                .route("/jobs/{id}", web::get().to(routes::status::status)),
        )
        .await;

        let boundary = "X-BOUNDARY-1";
        let body = multipart_body(boundary, &[("file", "a.pdf", TINY_PDF), ("file", "b.pdf", TINY_PDF)], &[]);
        let req = test::TestRequest::post()
            .uri("/pdf/merge")
            .insert_header(("content-type", format!("multipart/form-data; boundary={boundary}")))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 202);

        let parsed: serde_json::Value = test::read_body_json(resp).await;
        let job_id = parsed["jobId"].as_str().expect("jobId field present");

        let status_req = test::TestRequest::get().uri(&format!("/jobs/{job_id}")).to_request();
        let status_resp = test::call_service(&app, status_req).await;
        assert!(status_resp.status().is_success());
        let status_body: serde_json::Value = test::read_body_json(status_resp).await;
        assert_eq!(status_body["status"], serde_json::json!(JobStatus::Queued));
        assert!(status_body.get("downloadUrl").is_none());
    }

    #[actix_web::test]
    async fn unknown_op_is_bad_payload() {
        let (state, _tmp) = test_state(1000);
        let app = test::init_service(App::new().app_data(state).route("/pdf/{op}", web::post().to(routes::enqueue::enqueue))).await;

        let boundary = "X-BOUNDARY-2";
        let body = multipart_body(boundary, &[("file", "a.pdf", TINY_PDF)], &[]);
        let req = test::TestRequest::post()
            .uri("/pdf/not-a-real-op")
            .insert_header(("content-type", format!("multipart/form-data; boundary={boundary}")))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[actix_web::test]
    async fn wrong_magic_bytes_are_rejected_as_bad_type() {
        let (state, _tmp) = test_state(1000);
        let app = test::init_service(App::new().app_data(state).route("/pdf/{op}", web::post().to(routes::enqueue::enqueue))).await;

        let boundary = "X-BOUNDARY-3";
        let body = multipart_body(boundary, &[("file", "a.pdf", b"not a pdf at all")], &[]);
        let req = test::TestRequest::post()
            .uri("/pdf/compress")
            .insert_header(("content-type", format!("multipart/form-data; boundary={boundary}")))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[actix_web::test]
    async fn downloading_a_job_that_has_not_succeeded_fails() {
        let (state, _tmp) = test_state(1000);
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/pdf/{op}", web::post().to(routes::enqueue::enqueue))
                .route("/jobs/download/{id}", web::get().to(routes::download::download)),
        )
        .await;

        let boundary = "X-BOUNDARY-4";
        let body = multipart_body(boundary, &[("file", "a.pdf", TINY_PDF)], &[("preset", "balanced")]);
        let req = test::TestRequest::post()
            .uri("/pdf/compress")
            .insert_header(("content-type", format!("multipart/form-data; boundary={boundary}")))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 202);
        let parsed: serde_json::Value = test::read_body_json(resp).await;
        let job_id = parsed["jobId"].as_str().unwrap();

        let dl_req = test::TestRequest::get().uri(&format!("/jobs/download/{job_id}")).to_request();
        let dl_resp = test::call_service(&app, dl_req).await;
        assert_eq!(dl_resp.status().as_u16(), 400);
    }

    /// Scenario S6: the third request within a window over the configured
    /// max trips the rate limiter with 429, without ever reaching the route.
    #[actix_web::test]
    async fn third_request_within_the_window_is_rate_limited() {
        let (state, _tmp) = test_state(2);
        let limiter = state.rate_limiter.clone();
        let app = test::init_service(
            App::new()
                .app_data(state)
                .wrap(RateLimit { limiter })
                .route("/health", web::get().to(routes::health::health)),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::get().uri("/health").to_request();
            let resp = test::call_service(&app, req).await;
            assert!(resp.status().is_success());
        }

        let third = test::TestRequest::get().uri("/health").to_request();
        let third_resp = test::call_service(&app, third).await;
        assert_eq!(third_resp.status().as_u16(), 429);
    }

    #[actix_web::test]
    async fn rate_limiter_resets_after_the_window_elapses() {
        let (state, _tmp) = test_state(1);
        let limiter = state.rate_limiter.clone();
        let app = test::init_service(
            App::new()
                .app_data(state)
                .wrap(RateLimit { limiter })
                .route("/health", web::get().to(routes::health::health)),
        )
        .await;

        let first = test::TestRequest::get().uri("/health").to_request();
        assert!(test::call_service(&app, first).await.status().is_success());

        let second = test::TestRequest::get().uri("/health").to_request();
        assert_eq!(test::call_service(&app, second).await.status().as_u16(), 429);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let third = test::TestRequest::get().uri("/health").to_request();
        assert!(test::call_service(&app, third).await.status().is_success());
    }
}
