//! Timer-driven finalization of tracked jobs.
//!
//! [`FinalizationSupervisor`] owns every delayed transition:
//!
//! - a **grace timer** started on `execution_success`, which forces the
//!   job to complete without output if no payload was bound in time;
//! - a **removal timer** per completed job, which drops it from the
//!   registry after the retention delay;
//! - the periodic **staleness sweep**, which retires jobs that never
//!   finished.
//!
//! Timers are keyed by job id and cancellable. Scheduling a new timer of
//! the same kind replaces the old one, and a timer that fires after its
//! job was removed does nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use atelier_core::job::Job;
use atelier_core::registry::JobRegistry;
use atelier_core::types::JobId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::TrackerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Grace,
    Removal,
}

/// A scheduled timer: its generation number and cancel handle.
struct TimerSlot {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct JobTimers {
    grace: Option<TimerSlot>,
    removal: Option<TimerSlot>,
}

impl JobTimers {
    fn slot_mut(&mut self, kind: TimerKind) -> &mut Option<TimerSlot> {
        match kind {
            TimerKind::Grace => &mut self.grace,
            TimerKind::Removal => &mut self.removal,
        }
    }

    fn is_empty(&self) -> bool {
        self.grace.is_none() && self.removal.is_none()
    }

    fn cancel_all(self) {
        for slot in [self.grace, self.removal].into_iter().flatten() {
            slot.cancel.cancel();
        }
    }
}

/// Schedules grace periods, retention removals and the staleness sweep.
pub struct FinalizationSupervisor {
    registry: Arc<JobRegistry>,
    config: TrackerConfig,
    timers: Mutex<HashMap<JobId, JobTimers>>,
    next_generation: AtomicU64,
    /// Parent of every timer token; cancelled on shutdown.
    cancel: CancellationToken,
}

impl FinalizationSupervisor {
    pub fn new(
        registry: Arc<JobRegistry>,
        config: TrackerConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            config,
            timers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            cancel,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Start (or restart) the grace period for `job_id`.
    pub fn start_grace(self: &Arc<Self>, job_id: &str) {
        self.schedule(job_id, TimerKind::Grace, self.config.grace_period);
    }

    /// Drop the pending grace timer, if any.
    pub fn cancel_grace(&self, job_id: &str) {
        self.cancel_timer(job_id, TimerKind::Grace);
    }

    /// Remove `job_id` from the registry after `delay`, replacing any
    /// previously scheduled removal.
    pub fn schedule_removal(self: &Arc<Self>, job_id: &str, delay: Duration) {
        self.schedule(job_id, TimerKind::Removal, delay);
    }

    /// Removal after a normal completion.
    pub fn schedule_retention(self: &Arc<Self>, job_id: &str) {
        self.schedule_removal(job_id, self.config.retention);
    }

    /// Number of jobs with at least one live timer.
    pub fn pending_timers(&self) -> usize {
        self.lock_timers().len()
    }

    /// Cancel every timer belonging to `job_id`.
    pub fn forget(&self, job_id: &str) {
        let removed = self.lock_timers().remove(job_id);
        if let Some(timers) = removed {
            timers.cancel_all();
        }
    }

    /// Retire unfinished jobs older than the maximum lifetime.
    ///
    /// Returns the removed jobs.
    pub async fn sweep_once(&self, now: Instant) -> Vec<Job> {
        let max_age = self.config.max_job_age;
        let removed = self
            .registry
            .remove_where(|job| !job.is_completed() && job.age(now) > max_age)
            .await;

        for job in &removed {
            self.forget(&job.id);
            tracing::warn!(
                prompt_id = %job.id,
                status = ?job.status,
                progress = job.progress,
                age_secs = job.age(now).as_secs(),
                "Stale job removed by sweep",
            );
        }
        removed
    }

    /// Run the staleness sweep on a fixed interval until shutdown.
    pub async fn run_sweep(self: Arc<Self>) {
        let period = self.config.sweep_interval;
        tracing::info!(
            interval_secs = period.as_secs(),
            max_job_age_secs = self.config.max_job_age.as_secs(),
            "Staleness sweep started",
        );

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Staleness sweep stopping");
                    break;
                }
                _ = interval.tick() => {
                    let removed = self.sweep_once(Instant::now()).await;
                    if removed.is_empty() {
                        tracing::trace!("Staleness sweep: nothing to retire");
                    }
                }
            }
        }
    }

    /// Cancel every timer. Called on shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.lock_timers().clear();
    }

    // ---- private helpers ----

    /// Timer bookkeeping sits behind a std mutex and never awaits, so
    /// scheduling stays synchronous and timer tasks can re-schedule.
    fn lock_timers(&self) -> MutexGuard<'_, HashMap<JobId, JobTimers>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(self: &Arc<Self>, job_id: &str, kind: TimerKind, delay: Duration) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = self.cancel.child_token();

        {
            let mut timers = self.lock_timers();
            let slot = timers.entry(job_id.to_string()).or_default().slot_mut(kind);
            if let Some(previous) = slot.replace(TimerSlot {
                generation,
                cancel: token.clone(),
            }) {
                previous.cancel.cancel();
            }
        }

        let this = Arc::clone(self);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if this.release(&job_id, kind, generation) {
                        match kind {
                            TimerKind::Grace => this.on_grace_expired(&job_id).await,
                            TimerKind::Removal => this.on_removal_due(&job_id).await,
                        }
                    }
                }
            }
        });
    }

    /// Clear a fired timer's slot. Returns `false` if it was superseded.
    fn release(&self, job_id: &str, kind: TimerKind, generation: u64) -> bool {
        let mut timers = self.lock_timers();
        let Some(entry) = timers.get_mut(job_id) else {
            return false;
        };
        let slot = entry.slot_mut(kind);
        if slot.as_ref().map(|s| s.generation) != Some(generation) {
            return false;
        }
        *slot = None;
        if entry.is_empty() {
            timers.remove(job_id);
        }
        true
    }

    fn cancel_timer(&self, job_id: &str, kind: TimerKind) {
        let mut timers = self.lock_timers();
        if let Some(entry) = timers.get_mut(job_id) {
            if let Some(slot) = entry.slot_mut(kind).take() {
                slot.cancel.cancel();
            }
            if entry.is_empty() {
                timers.remove(job_id);
            }
        }
    }

    async fn on_grace_expired(self: &Arc<Self>, job_id: &str) {
        let now = Instant::now();
        // The forced removal is scheduled under the registry lock, so a
        // rescue binding right after always replaces it with normal retention.
        let forced = self
            .registry
            .mutate(job_id, |job| {
                let forced = job.force(now);
                if forced {
                    self.schedule_removal(job_id, self.config.forced_retention);
                }
                forced
            })
            .await;
        match forced {
            None => {
                tracing::debug!(prompt_id = %job_id, "Grace period ended for a retired job");
                self.forget(job_id);
            }
            Some(false) => {
                tracing::debug!(prompt_id = %job_id, "Grace period ended, job already finished");
            }
            Some(true) => {
                self.registry.clear_active_if(job_id).await;
                tracing::warn!(
                    prompt_id = %job_id,
                    grace_ms = self.config.grace_period.as_millis() as u64,
                    "No payload within grace period, completed without output",
                );
            }
        }
    }

    async fn on_removal_due(&self, job_id: &str) {
        let removed = self
            .registry
            .remove_where(|job| job.id == job_id && job.is_completed())
            .await;
        if removed.is_empty() {
            return;
        }
        self.forget(job_id);
        tracing::debug!(prompt_id = %job_id, "Completed job removed from queue");
    }
}
