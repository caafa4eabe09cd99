//! Fixed worker pool draining the queue. Each worker loop mirrors the
//! `tokio::spawn` + `Arc<Semaphore>::acquire_owned` shape of
//! `sharepoint-ingest::spawn_job_worker`, generalized from one task per job to
//! a small number of long-lived loops so the pool size is exactly
//! `concurrency` rather than unbounded.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{AppError, ErrorCode};
use crate::handlers::HandlerCtx;
use crate::queue::{Outcome, Queue};
use crate::temp_store::TempStore;

/// Runs `pool_size` worker loops, each pulling the next dispatchable record
/// and invoking `dispatch` (the handler table in `crate::handlers`) under
/// `job_timeout`. Returns the loops' join handles so the caller can await
/// graceful shutdown.
pub fn spawn_pool<F, Fut>(
    pool_size: usize,
    queue: Queue,
    store: TempStore,
    ctx: Arc<HandlerCtx>,
    job_timeout: Duration,
    dispatch: F,
) -> Vec<JoinHandle<()>>
where
    F: Fn(crate::dto::JobPayload, Arc<HandlerCtx>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<crate::dto::HandlerOutput, AppError>> + Send + 'static,
{
    // A semaphore mirrors the concurrency cap redundantly with the queue's
    // own `global_running` bookkeeping; kept because it is also the handle
    // graceful shutdown uses to know when the last worker has gone idle.
    let semaphore = Arc::new(Semaphore::new(pool_size));

    (0..pool_size)
        .map(|worker_id| {
            let queue = queue.clone();
            let store = store.clone();
            let ctx = ctx.clone();
            let dispatch = dispatch.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                loop {
                    let record = queue.dispatch_next().await;
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return, // semaphore closed: shutting down
                    };
                    tracing::info!(job_id = %record.id, kind = record.kind.as_str(), worker_id, "job started");

                    let outcome = run_with_deadline(dispatch(record.payload.clone(), ctx.clone()), job_timeout).await;
                    drop(permit);

                    match outcome {
                        DeadlineOutcome::Completed(Ok(output)) => {
                            match write_artifact(&store, record.id, output) {
                                Ok(output_path) => {
                                    tracing::info!(job_id = %record.id, "job succeeded");
                                    queue.finish(record.id, Outcome::Success { output_path }, &store);
                                }
                                Err(err) => {
                                    tracing::warn!(job_id = %record.id, error = %err, "failed to persist job artifact");
                                    queue.finish(
                                        record.id,
                                        Outcome::Failure {
                                            code: err.code,
                                            message: err.message,
                                        },
                                        &store,
                                    );
                                }
                            }
                        }
                        DeadlineOutcome::Completed(Err(err)) => {
                            tracing::warn!(job_id = %record.id, code = err.code.as_str(), "job failed");
                            queue.finish(
                                record.id,
                                Outcome::Failure {
                                    code: err.code,
                                    message: err.message,
                                },
                                &store,
                            );
                        }
                        DeadlineOutcome::TimedOut => {
                            tracing::warn!(job_id = %record.id, "job exceeded its deadline");
                            queue.finish_timed_out(record.id, &store);
                        }
                        DeadlineOutcome::Panicked => {
                            tracing::error!(job_id = %record.id, "handler panicked");
                            queue.finish(
                                record.id,
                                Outcome::Failure {
                                    code: ErrorCode::Internal,
                                    message: "internal error".to_string(),
                                },
                                &store,
                            );
                        }
                    }
                }
            })
        })
        .collect()
}

enum DeadlineOutcome {
    Completed(Result<crate::dto::HandlerOutput, AppError>),
    TimedOut,
    Panicked,
}

async fn run_with_deadline<Fut>(fut: Fut, deadline: Duration) -> DeadlineOutcome
where
    Fut: Future<Output = Result<crate::dto::HandlerOutput, AppError>> + Send + 'static,
{
    let guarded = AssertUnwindSafe(fut).catch_unwind();
    match tokio::time::timeout(deadline, guarded).await {
        Ok(Ok(result)) => DeadlineOutcome::Completed(result),
        Ok(Err(_panic)) => DeadlineOutcome::Panicked,
        Err(_elapsed) => DeadlineOutcome::TimedOut,
    }
}

fn write_artifact(store: &TempStore, job_id: uuid::Uuid, output: crate::dto::HandlerOutput) -> Result<std::path::PathBuf, AppError> {
    match output {
        crate::dto::HandlerOutput::SingleFile { bytes, ext } => {
            let path = store.allocate_download_path(job_id, ext);
            store.write_buffer(&path, &bytes)?;
            Ok(path)
        }
        crate::dto::HandlerOutput::MultiFile { files } => {
            let path = store.allocate_download_path(job_id, "zip");
            store.write_zip(&path, &files)?;
            Ok(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{JobKind, JobPayload};

    fn ctx() -> (Arc<HandlerCtx>, TempStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path().join("u"), dir.path().join("d")).unwrap();
        let ctx = Arc::new(HandlerCtx {
            store: store.clone(),
            settings: Arc::new(crate::config::Settings::default()),
        });
        (ctx, store, dir)
    }

    #[tokio::test]
    async fn successful_job_produces_a_downloadable_artifact() {
        let (ctx, store, _dir) = ctx();
        let queue = Queue::new(1, 10, Duration::from_secs(60), Duration::from_secs(60));
        let record = queue.enqueue(
            JobKind::Merge,
            "anon".into(),
            JobPayload::Merge { input_paths: vec![] },
            vec![],
        );

        let handles = spawn_pool(1, queue.clone(), store, ctx, Duration::from_secs(5), |_payload, _ctx| async move {
            Ok(crate::dto::HandlerOutput::SingleFile {
                bytes: b"%PDF-1.4".to_vec(),
                ext: "pdf",
            })
        });

        for _ in 0..200 {
            if let Some(r) = queue.get(record.id) {
                if r.status == crate::dto::JobStatus::Succeeded {
                    assert!(r.output_path.unwrap().exists());
                    for h in handles {
                        h.abort();
                    }
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached succeeded");
    }

    #[tokio::test]
    async fn timed_out_handler_marks_job_failed_with_job_timeout() {
        let (ctx, store, _dir) = ctx();
        let queue = Queue::new(1, 10, Duration::from_secs(60), Duration::from_secs(60));
        let record = queue.enqueue(
            JobKind::Merge,
            "anon".into(),
            JobPayload::Merge { input_paths: vec![] },
            vec![],
        );

        let handles = spawn_pool(
            1,
            queue.clone(),
            store,
            ctx,
            Duration::from_millis(20),
            |_payload, _ctx| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(crate::dto::HandlerOutput::SingleFile { bytes: vec![], ext: "pdf" })
            },
        );

        for _ in 0..200 {
            if let Some(r) = queue.get(record.id) {
                if r.status == crate::dto::JobStatus::Failed {
                    assert_eq!(r.error_code, Some(ErrorCode::JobTimeout));
                    for h in handles {
                        h.abort();
                    }
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached failed");
    }
}
