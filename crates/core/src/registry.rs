//! Concurrent in-memory job table.
//!
//! [`JobRegistry`] is the only shared mutable state of the tracker. The
//! job map and the active-job pointer live behind one `RwLock` so that a
//! snapshot always sees both at the same point in time, and so that
//! [`JobRegistry::mutate`] is atomic against other mutations and removals.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::job::Job;
use crate::types::JobId;

/// Outcome of [`JobRegistry::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A job with the same id is already tracked; nothing changed.
    AlreadyExists,
}

/// Point-in-time copy of the registry, including the active pointer.
#[derive(Debug, Clone)]
pub struct RegistryView {
    /// Jobs ordered newest first.
    pub jobs: Vec<Job>,
    pub active: Option<JobId>,
}

#[derive(Default)]
struct RegistryInner {
    jobs: HashMap<JobId, Job>,
    /// Job presumed to own the next anonymous progress/payload frame.
    active: Option<JobId>,
    next_seq: u64,
}

/// Thread-safe job table shared by the HTTP handlers, the stream
/// consumer and the finalization timers.
///
/// Designed to be wrapped in `Arc` and cloned into every task.
#[derive(Default)]
pub struct JobRegistry {
    inner: RwLock<RegistryInner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new `pending` job. Duplicate ids are ignored.
    ///
    /// An idle engine can report `execution_start` before the submitter
    /// gets here; when the active pointer already names `id`, the job is
    /// inserted as `processing`.
    pub async fn insert(&self, id: impl Into<JobId>, metadata: serde_json::Value) -> InsertOutcome {
        let id = id.into();
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&id) {
            return InsertOutcome::AlreadyExists;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let mut job = Job::new(id.clone(), metadata, seq);
        if inner.active.as_deref() == Some(id.as_str()) {
            job.start();
        }
        inner.jobs.insert(id, job);
        InsertOutcome::Inserted
    }

    pub async fn get(&self, id: &str) -> Option<Job> {
        self.inner.read().await.jobs.get(id).cloned()
    }

    /// Atomically read-modify-write one job.
    ///
    /// Returns `None` without calling `f` when the job is not tracked
    /// (never inserted, or already removed).
    pub async fn mutate<R>(&self, id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let mut inner = self.inner.write().await;
        inner.jobs.get_mut(id).map(f)
    }

    /// All jobs, newest submission first.
    pub async fn snapshot(&self) -> Vec<Job> {
        self.view().await.jobs
    }

    /// Jobs plus the active pointer, read under one lock.
    pub async fn view(&self) -> RegistryView {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
        RegistryView {
            jobs,
            active: inner.active.clone(),
        }
    }

    /// Stop tracking a job. Clears the active pointer if it named the job.
    pub async fn remove(&self, id: &str) -> Option<Job> {
        let mut inner = self.inner.write().await;
        if inner.active.as_deref() == Some(id) {
            inner.active = None;
        }
        inner.jobs.remove(id)
    }

    /// Remove every job matching `predicate` in one critical section.
    pub async fn remove_where(&self, mut predicate: impl FnMut(&Job) -> bool) -> Vec<Job> {
        let mut inner = self.inner.write().await;
        let doomed: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|job| predicate(job))
            .map(|job| job.id.clone())
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for id in doomed {
            if inner.active.as_deref() == Some(id.as_str()) {
                inner.active = None;
            }
            if let Some(job) = inner.jobs.remove(&id) {
                removed.push(job);
            }
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.jobs.is_empty()
    }

    // ---- active-job pointer ----

    /// Point anonymous frames at `id`, whether or not it is tracked.
    pub async fn set_active(&self, id: impl Into<JobId>) {
        self.inner.write().await.active = Some(id.into());
    }

    pub async fn active(&self) -> Option<JobId> {
        self.inner.read().await.active.clone()
    }

    /// Clear the pointer only if it currently names `id`.
    pub async fn clear_active_if(&self, id: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.active.as_deref() == Some(id) {
            inner.active = None;
            true
        } else {
            false
        }
    }
}
