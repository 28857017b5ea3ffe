//! The tracked [`Job`] record and its forward-only transitions.
//!
//! A job moves `pending -> processing -> completed` and never back.
//! "Completed" is split into sub-conditions by the auxiliary fields:
//! an output bound (success), `forced_at` set (gave up waiting for the
//! payload, still rescuable), or `error` set (the engine reported a
//! failure).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::artifact::ArtifactRef;
use crate::types::{JobId, Timestamp};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
}

/// Result of trying to attach an artifact to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The job had no output and was not yet forced.
    Bound,
    /// The job had been force-completed; the late payload upgraded it.
    Rescued,
    /// The job already carries an output or ended in failure.
    Rejected,
}

/// One generation request tracked from submission to a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Completion percentage, 0-100.
    pub progress: u8,
    pub submitted_at: Timestamp,
    /// Set when the job was completed without a confirmed output.
    pub forced_at: Option<Timestamp>,
    pub output: Option<ArtifactRef>,
    /// Caller-supplied attributes, passed through untouched.
    pub metadata: serde_json::Value,
    pub error: Option<String>,

    #[serde(skip)]
    pub(crate) seq: u64,
    #[serde(skip)]
    submitted_instant: Instant,
    #[serde(skip)]
    forced_instant: Option<Instant>,
}

impl Job {
    /// Create a fresh `pending` job.
    ///
    /// `seq` is the registry's insertion counter, used to order jobs that
    /// share the same submission instant.
    pub fn new(id: impl Into<JobId>, metadata: serde_json::Value, seq: u64) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            progress: 0,
            submitted_at: chrono::Utc::now(),
            forced_at: None,
            output: None,
            metadata,
            error: None,
            seq,
            submitted_instant: Instant::now(),
            forced_instant: None,
        }
    }

    /// Monotonic instant the job was forced, if it was.
    pub fn forced_instant(&self) -> Option<Instant> {
        self.forced_instant
    }

    /// Time elapsed since submission, measured against `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.submitted_instant)
    }

    /// Ordering key for "most recently submitted": instant, then insertion order.
    pub fn recency_key(&self) -> (Instant, u64) {
        (self.submitted_instant, self.seq)
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Completed without output because the grace period ran out.
    pub fn is_forced(&self) -> bool {
        self.is_completed() && self.output.is_none() && self.error.is_none() && self.forced_at.is_some()
    }

    /// Whether a payload may still be attached to this job.
    pub fn awaiting_output(&self) -> bool {
        self.output.is_none() && self.error.is_none()
    }

    /// `pending -> processing`. Returns `false` if the job already moved on.
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Processing;
        self.progress = 0;
        true
    }

    /// Record step progress. Only applies while `processing`, and never
    /// moves the value backward (multi-pass workflows restart their
    /// sampler counter).
    pub fn set_progress(&mut self, percent: u8) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        self.progress = self.progress.max(percent.min(100));
        true
    }

    /// Attach the produced artifact. The output is written at most once.
    pub fn bind_output(&mut self, artifact: ArtifactRef) -> BindOutcome {
        if !self.awaiting_output() {
            return BindOutcome::Rejected;
        }
        let rescued = self.is_forced();
        self.output = Some(artifact);
        self.status = JobStatus::Completed;
        self.progress = 100;
        if rescued {
            BindOutcome::Rescued
        } else {
            BindOutcome::Bound
        }
    }

    /// Give up waiting for a payload: complete without output.
    ///
    /// No-op (returns `false`) when the job already finished.
    pub fn force(&mut self, now: Instant) -> bool {
        if self.is_completed() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.forced_at = Some(chrono::Utc::now());
        self.forced_instant = Some(now);
        true
    }

    /// Complete without output because of a reported failure.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_completed() && !self.is_forced() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.error = Some(message.into());
        true
    }
}

/// Convert a `value / max` step counter into a clamped percentage.
///
/// Returns `None` when `max` is not positive.
pub fn percent_of(value: i64, max: i64) -> Option<u8> {
    if max <= 0 {
        return None;
    }
    let pct = (value as f64 / max as f64 * 100.0).round();
    Some(pct.clamp(0.0, 100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn artifact(name: &str) -> ArtifactRef {
        ArtifactRef {
            filename: name.to_string(),
            url: format!("/gallery/{name}"),
        }
    }

    #[tokio::test]
    async fn new_job_is_pending_at_zero() {
        let job = Job::new("p1", serde_json::json!({"seed": 7}), 0);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.awaiting_output());
        assert_eq!(job.metadata["seed"], 7);
    }

    #[tokio::test]
    async fn start_only_from_pending() {
        let mut job = Job::new("p1", serde_json::Value::Null, 0);
        assert!(job.start());
        job.set_progress(40);
        assert!(!job.start());
        assert_eq!(job.progress, 40);
    }

    #[tokio::test]
    async fn progress_ignored_unless_processing() {
        let mut job = Job::new("p1", serde_json::Value::Null, 0);
        assert!(!job.set_progress(50));
        assert_eq!(job.progress, 0);
    }

    #[tokio::test]
    async fn progress_never_moves_backward() {
        let mut job = Job::new("p1", serde_json::Value::Null, 0);
        job.start();
        assert!(job.set_progress(80));
        assert!(job.set_progress(10));
        assert_eq!(job.progress, 80);

        job.set_progress(250);
        assert_eq!(job.progress, 100);
    }

    #[tokio::test]
    async fn output_is_never_overwritten() {
        let mut job = Job::new("p1", serde_json::Value::Null, 0);
        job.start();
        assert_matches!(job.bind_output(artifact("a.png")), BindOutcome::Bound);
        assert_matches!(job.bind_output(artifact("b.png")), BindOutcome::Rejected);
        assert_eq!(job.output.as_ref().unwrap().filename, "a.png");
        assert_eq!(job.progress, 100);
    }

    #[tokio::test]
    async fn forced_job_can_be_rescued_once() {
        let mut job = Job::new("p1", serde_json::Value::Null, 0);
        job.start();
        assert!(job.force(Instant::now()));
        assert!(job.is_forced());
        assert!(!job.force(Instant::now()));

        assert_matches!(job.bind_output(artifact("late.png")), BindOutcome::Rescued);
        assert!(!job.is_forced());
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn failed_job_rejects_payload() {
        let mut job = Job::new("p1", serde_json::Value::Null, 0);
        job.start();
        assert!(job.fail("out of memory"));
        assert!(!job.awaiting_output());
        assert_matches!(job.bind_output(artifact("x.png")), BindOutcome::Rejected);
        assert!(!job.fail("again"));
    }

    #[tokio::test]
    async fn status_never_regresses() {
        let mut job = Job::new("p1", serde_json::Value::Null, 0);
        job.start();
        job.bind_output(artifact("a.png"));
        assert!(!job.start());
        assert!(!job.set_progress(10));
        assert!(!job.force(Instant::now()));
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn percent_rounds_and_clamps() {
        assert_eq!(percent_of(50, 100), Some(50));
        assert_eq!(percent_of(1, 3), Some(33));
        assert_eq!(percent_of(2, 3), Some(67));
        assert_eq!(percent_of(30, 20), Some(100));
        assert_eq!(percent_of(-1, 20), Some(0));
        assert_eq!(percent_of(5, 0), None);
    }

    #[tokio::test]
    async fn serializes_without_internal_fields() {
        let job = Job::new("p1", serde_json::json!({"prompt": "cat"}), 3);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["id"], "p1");
        assert_eq!(json["status"], "pending");
        assert!(json["forced_at"].is_null());
        assert!(json.get("seq").is_none());
    }
}
