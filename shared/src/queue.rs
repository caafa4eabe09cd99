//! In-process bounded work queue: the single owner of job state. Every
//! mutation — enqueue, dispatch, finish, reap — runs under one
//! `parking_lot::Mutex`, mirroring the single-aggregate-guarded-by-one-lock
//! shape of `sharepoint-ingest::job::JobRegistry`, generalized from an
//! unbounded per-job task spawn to a fixed-size dispatch queue with
//! per-client admission control.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::dto::{JobKind, JobPayload, JobStatus};
use crate::error::ErrorCode;
use crate::temp_store::TempStore;

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub client_key: String,
    pub payload: JobPayload,
    pub cleanup_files: Vec<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub progress: Option<u8>,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub created_at_wall: chrono::DateTime<chrono::Utc>,
    pub started_at_wall: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at_wall: Option<chrono::DateTime<chrono::Utc>>,
}

impl JobRecord {
    fn new(id: Uuid, kind: JobKind, client_key: String, payload: JobPayload, cleanup_files: Vec<PathBuf>) -> Self {
        let now = Instant::now();
        let now_wall = chrono::Utc::now();
        Self {
            id,
            kind,
            status: JobStatus::Queued,
            client_key,
            payload,
            cleanup_files,
            output_path: None,
            error: None,
            error_code: None,
            progress: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            created_at_wall: now_wall,
            started_at_wall: None,
            finished_at_wall: None,
        }
    }
}

/// Outcome the worker reports back to the queue at the end of a run.
pub enum Outcome {
    Success { output_path: PathBuf },
    Failure { code: ErrorCode, message: String },
}

struct Inner {
    pending: VecDeque<Uuid>,
    records: HashMap<Uuid, JobRecord>,
    queued_by_key: HashMap<String, usize>,
    running_by_key: HashMap<String, usize>,
    global_running: usize,
}

impl Inner {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            records: HashMap::new(),
            queued_by_key: HashMap::new(),
            running_by_key: HashMap::new(),
            global_running: 0,
        }
    }
}

/// Shared queue handle. Cheap to clone; clones refer to the same aggregate.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    pub concurrency: usize,
    pub max_per_user: usize,
    pub job_ttl: Duration,
    pub output_ttl: Duration,
}

impl Queue {
    pub fn new(concurrency: usize, max_per_user: usize, job_ttl: Duration, output_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
            notify: Arc::new(Notify::new()),
            concurrency,
            max_per_user,
            job_ttl,
            output_ttl,
        }
    }

    /// Allocates an id, inserts the record as `queued`, appends to the tail,
    /// and wakes a waiting worker. Always succeeds — admission happens at
    /// dispatch time, not here.
    pub fn enqueue(&self, kind: JobKind, client_key: String, payload: JobPayload, cleanup_files: Vec<PathBuf>) -> JobRecord {
        let id = Uuid::new_v4();
        let record = JobRecord::new(id, kind, client_key.clone(), payload, cleanup_files);
        {
            let mut inner = self.inner.lock();
            inner.pending.push_back(id);
            *inner.queued_by_key.entry(client_key).or_insert(0) += 1;
            inner.records.insert(id, record.clone());
        }
        self.notify.notify_one();
        record
    }

    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.inner.lock().records.get(&id).cloned()
    }

    pub fn list(&self) -> Vec<JobRecord> {
        self.inner.lock().records.values().cloned().collect()
    }

    /// Waits until a record can be dispatched, applying the fairness rule
    /// from the dispatch algorithm: a record whose key is already at
    /// `max_per_user` running jobs is re-appended to the tail rather than
    /// dropped, and the next candidate is tried. Returns the now-`running`
    /// record.
    pub async fn dispatch_next(&self) -> JobRecord {
        loop {
            if let Some(record) = self.try_dispatch_once() {
                return record;
            }
            self.notify.notified().await;
        }
    }

    fn try_dispatch_once(&self) -> Option<JobRecord> {
        let mut inner = self.inner.lock();
        if inner.global_running >= self.concurrency {
            return None;
        }
        // Bound the rotation to the queue's current length: every saturated
        // job gets exactly one re-append attempt per call, never an infinite
        // spin when every pending job shares a saturated key.
        let attempts = inner.pending.len();
        for _ in 0..attempts {
            let id = match inner.pending.pop_front() {
                Some(id) => id,
                None => return None,
            };
            let key = inner.records.get(&id).map(|r| r.client_key.clone())?;
            if let Some(count) = inner.queued_by_key.get_mut(&key) {
                *count = count.saturating_sub(1);
            }

            let saturated = inner.running_by_key.get(&key).copied().unwrap_or(0) >= self.max_per_user;
            if saturated {
                inner.pending.push_back(id);
                *inner.queued_by_key.entry(key).or_insert(0) += 1;
                continue;
            }

            *inner.running_by_key.entry(key.clone()).or_insert(0) += 1;
            inner.global_running += 1;
            let record = inner.records.get_mut(&id).expect("record exists for a pending id");
            record.status = JobStatus::Running;
            let now = Instant::now();
            record.started_at = Some(now);
            record.started_at_wall = Some(chrono::Utc::now());
            return Some(record.clone());
        }
        None
    }

    /// Records a run's outcome, decrements the admission counters, unlinks
    /// every path in `cleanup_files`, and wakes any worker waiting on freed
    /// capacity.
    pub fn finish(&self, id: Uuid, outcome: Outcome, store: &TempStore) {
        let cleanup_files = {
            let mut inner = self.inner.lock();
            let Some(record) = inner.records.get_mut(&id) else {
                return;
            };
            let key = record.client_key.clone();
            match outcome {
                Outcome::Success { output_path } => {
                    record.status = JobStatus::Succeeded;
                    record.output_path = Some(output_path);
                }
                Outcome::Failure { code, message } => {
                    record.status = JobStatus::Failed;
                    record.error = Some(message);
                    record.error_code = Some(code);
                }
            }
            record.finished_at = Some(Instant::now());
            record.finished_at_wall = Some(chrono::Utc::now());
            let cleanup_files = record.cleanup_files.clone();

            if let Some(count) = inner.running_by_key.get_mut(&key) {
                *count = count.saturating_sub(1);
            }
            inner.global_running = inner.global_running.saturating_sub(1);
            cleanup_files
        };
        for path in cleanup_files {
            store.unlink(&path);
        }
        self.notify.notify_waiters();
    }

    /// Marks a record cancelled (used for deadline-expiry bookkeeping that
    /// predates a handler outcome, e.g. the worker times out waiting on the
    /// handler future itself).
    pub fn finish_timed_out(&self, id: Uuid, store: &TempStore) {
        self.finish(
            id,
            Outcome::Failure {
                code: ErrorCode::JobTimeout,
                message: "job exceeded its deadline".to_string(),
            },
            store,
        );
    }

    /// Runs the reaper once: deletes terminal records older than `job_ttl`
    /// and their artifacts, and sweeps orphaned/expired files under the
    /// downloads root. Filesystem errors are logged and swallowed, never
    /// propagated.
    pub fn reap(&self, store: &TempStore) {
        let now = Instant::now();
        let expired_ids: Vec<Uuid> = {
            let inner = self.inner.lock();
            inner
                .records
                .values()
                .filter(|r| is_terminal(r.status) && r.finished_at.map(|f| now.duration_since(f) > self.job_ttl).unwrap_or(false))
                .map(|r| r.id)
                .collect()
        };

        for id in expired_ids {
            let mut inner = self.inner.lock();
            if let Some(record) = inner.records.remove(&id) {
                drop(inner);
                if let Some(path) = &record.output_path {
                    store.unlink(path);
                }
            }
        }

        self.sweep_orphaned_artifacts(store);
    }

    fn sweep_orphaned_artifacts(&self, store: &TempStore) {
        let known_ids: std::collections::HashSet<Uuid> = self.inner.lock().records.keys().copied().collect();
        let Ok(entries) = std::fs::read_dir(store.downloads_root()) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let stem = path.file_stem().and_then(|s| s.to_str()).and_then(|s| Uuid::parse_str(s).ok());
            let is_orphan = match stem {
                Some(id) => !known_ids.contains(&id),
                None => true,
            };
            let is_expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|m| m.elapsed().map(|e| e > self.output_ttl).unwrap_or(false))
                .unwrap_or(false);
            if is_orphan && is_expired {
                store.unlink(&path);
            }
        }
    }
}

fn is_terminal(status: JobStatus) -> bool {
    matches!(status, JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(concurrency: usize, max_per_user: usize) -> Queue {
        Queue::new(concurrency, max_per_user, Duration::from_secs(3600), Duration::from_secs(3600))
    }

    fn payload() -> JobPayload {
        JobPayload::Merge {
            input_paths: vec!["a".into()],
        }
    }

    #[tokio::test]
    async fn dispatch_respects_global_concurrency() {
        let q = queue(1, 10);
        q.enqueue(JobKind::Merge, "a".into(), payload(), vec![]);
        q.enqueue(JobKind::Merge, "b".into(), payload(), vec![]);

        let first = q.dispatch_next().await;
        assert_eq!(first.status, JobStatus::Running);
        assert!(q.try_dispatch_once().is_none(), "second job must wait for capacity");
    }

    #[tokio::test]
    async fn saturated_key_is_requeued_not_dropped() {
        let q = queue(10, 1);
        let a = q.enqueue(JobKind::Merge, "same-key".into(), payload(), vec![]);
        let b = q.enqueue(JobKind::Merge, "same-key".into(), payload(), vec![]);

        let first = q.dispatch_next().await;
        assert_eq!(first.id, a.id);
        // b's key is now saturated (max_per_user=1); it must still exist,
        // re-queued, not silently dropped.
        assert!(q.try_dispatch_once().is_none());
        assert_eq!(q.get(b.id).unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn finish_frees_capacity_for_the_next_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path().join("u"), dir.path().join("d")).unwrap();
        let q = queue(1, 10);
        let a = q.enqueue(JobKind::Merge, "a".into(), payload(), vec![]);
        q.enqueue(JobKind::Merge, "b".into(), payload(), vec![]);

        let running = q.dispatch_next().await;
        assert_eq!(running.id, a.id);
        assert!(q.try_dispatch_once().is_none());

        q.finish(
            a.id,
            Outcome::Failure {
                code: ErrorCode::Internal,
                message: "boom".into(),
            },
            &store,
        );
        let next = q.dispatch_next().await;
        assert_ne!(next.id, a.id);
    }

    #[tokio::test]
    async fn invariant_global_running_never_exceeds_concurrency() {
        let q = queue(2, 10);
        for i in 0..5 {
            q.enqueue(JobKind::Merge, format!("k{i}"), payload(), vec![]);
        }
        let mut running = vec![];
        while let Some(r) = q.try_dispatch_once() {
            running.push(r);
        }
        assert!(running.len() <= 2);
        assert_eq!(q.inner.lock().global_running, running.len());
    }

    #[test]
    fn reap_removes_expired_terminal_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path().join("u"), dir.path().join("d")).unwrap();
        let q = Queue::new(10, 10, Duration::from_millis(0), Duration::from_secs(3600));
        let a = q.enqueue(JobKind::Merge, "a".into(), payload(), vec![]);
        q.finish(
            a.id,
            Outcome::Failure {
                code: ErrorCode::Internal,
                message: "boom".into(),
            },
            &store,
        );
        std::thread::sleep(Duration::from_millis(5));
        q.reap(&store);
        assert!(q.get(a.id).is_none());
    }
}
