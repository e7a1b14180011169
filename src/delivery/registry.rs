//! Process-wide tables of delivery jobs and scheduled artifact deletions.
//!
//! Three kinds of writers touch these tables concurrently: packager
//! workers, the retention tasks, and HTTP handlers. All mutation goes
//! through closure-based `update` calls under the write lock, so a
//! read-modify-write on one job is atomic and partial updates are never
//! observable. Jobs are independent; there are no multi-row transactions.

use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;

use super::models::{DeliveryJob, DeliveryStatus, ScheduledDeletion};

/// How long after completion a job remains eligible for lenient id
/// matching.
const LENIENT_MATCH_WINDOW_SECS: i64 = 600;

/// Result of a registry lookup, recording whether the requested id was
/// matched exactly or substituted leniently.
#[derive(Debug, Clone)]
pub struct ResolvedJob {
    pub job: DeliveryJob,
    pub exact: bool,
}

/// Keyed table of in-flight and recently completed delivery jobs.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, DeliveryJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a fresh job id: album id, epoch seconds, and a salt to
    /// keep concurrent requests for the same album apart.
    pub fn new_job_id(album_id: i64) -> String {
        let salt: u16 = rand::rng().random_range(0..10_000);
        format!(
            "album_{}_{}_{:04}",
            album_id,
            Utc::now().timestamp(),
            salt
        )
    }

    pub fn insert(&self, job: DeliveryJob) {
        self.jobs.write().unwrap().insert(job.id.clone(), job);
    }

    pub fn get(&self, id: &str) -> Option<DeliveryJob> {
        self.jobs.read().unwrap().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.read().unwrap().contains_key(id)
    }

    /// Atomically mutate one job row. Returns `None` if the row is gone,
    /// which workers treat as a cooperative cancellation signal.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut DeliveryJob) -> R) -> Option<R> {
        self.jobs.write().unwrap().get_mut(id).map(f)
    }

    pub fn remove(&self, id: &str) -> Option<DeliveryJob> {
        self.jobs.write().unwrap().remove(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().unwrap().is_empty()
    }

    /// Snapshot of every live job row.
    pub fn all(&self) -> HashMap<String, DeliveryJob> {
        self.jobs.read().unwrap().clone()
    }

    /// Look up a job id, falling back to a lenient match.
    ///
    /// The fallback rides through browser reload races: if the exact id
    /// misses, the trailing salt segment is dropped and the most recently
    /// completed job sharing the remaining `album_<id>_<epoch>` prefix
    /// wins, provided it completed within the last ten minutes.
    pub fn resolve(&self, requested: &str) -> Option<ResolvedJob> {
        if let Some(job) = self.get(requested) {
            return Some(ResolvedJob { job, exact: true });
        }

        let (prefix, _salt) = requested.rsplit_once('_')?;
        let now = Utc::now().timestamp();
        let jobs = self.jobs.read().unwrap();
        jobs.values()
            .filter(|j| j.status == DeliveryStatus::Completed)
            .filter(|j| {
                j.id.rsplit_once('_')
                    .is_some_and(|(candidate_prefix, _)| candidate_prefix == prefix)
            })
            .filter(|j| {
                j.completed_at
                    .is_some_and(|t| now - t <= LENIENT_MATCH_WINDOW_SECS)
            })
            .max_by_key(|j| j.completed_at)
            .map(|j| ResolvedJob {
                job: j.clone(),
                exact: false,
            })
    }

    /// Remove and return every job whose `started_at` is older than
    /// `cutoff` (epoch seconds), regardless of status.
    pub fn purge_started_before(&self, cutoff: i64) -> Vec<DeliveryJob> {
        let mut jobs = self.jobs.write().unwrap();
        let expired: Vec<String> = jobs
            .values()
            .filter(|j| j.started_at < cutoff)
            .map(|j| j.id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| jobs.remove(&id))
            .collect()
    }
}

/// Keyed table of pending timed artifact deletions.
#[derive(Default)]
pub struct DeletionSchedule {
    entries: RwLock<HashMap<String, ScheduledDeletion>>,
}

impl DeletionSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a deletion unless one is already pending for the job.
    /// Returns true if the entry was inserted.
    pub fn schedule_once(&self, entry: ScheduledDeletion) -> bool {
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(&entry.job_id) {
            return false;
        }
        entries.insert(entry.job_id.clone(), entry);
        true
    }

    pub fn get(&self, job_id: &str) -> Option<ScheduledDeletion> {
        self.entries.read().unwrap().get(job_id).cloned()
    }

    pub fn cancel(&self, job_id: &str) -> Option<ScheduledDeletion> {
        self.entries.write().unwrap().remove(job_id)
    }

    /// Remove and return every entry whose `delete_at` has passed.
    pub fn take_due(&self, now: i64) -> Vec<ScheduledDeletion> {
        let mut entries = self.entries.write().unwrap();
        let due: Vec<String> = entries
            .values()
            .filter(|e| e.delete_at <= now)
            .map(|e| e.job_id.clone())
            .collect();
        due.into_iter()
            .filter_map(|id| entries.remove(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}
