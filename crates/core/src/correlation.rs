//! Payload attribution rules.
//!
//! Binary payload frames carry no job id. Attribution walks [`RULES`]
//! in order over a registry snapshot and takes the first match:
//!
//! 1. the job named by the active pointer, if it is tracked and still
//!    awaiting output;
//! 2. the most recently submitted `processing` job (the pointer was
//!    cleared before the payload arrived);
//! 3. the most recently forced job whose `forced_at` is inside the
//!    rescue window (the payload was late).
//!
//! When nothing matches the payload is unattributable. The rules are
//! pure so they can be exercised without any I/O.

use std::time::Duration;

use tokio::time::Instant;

use crate::job::{Job, JobStatus};
use crate::types::JobId;

/// Which rule attributed a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    ActivePointer,
    MostRecentProcessing,
    RescueWindow,
}

impl MatchRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ActivePointer => "active_pointer",
            Self::MostRecentProcessing => "most_recent_processing",
            Self::RescueWindow => "rescue_window",
        }
    }
}

/// A successful attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMatch {
    pub job_id: JobId,
    pub rule: MatchRule,
}

/// Inputs shared by every rule.
pub struct CorrelationContext<'a> {
    pub jobs: &'a [Job],
    pub active: Option<&'a str>,
    pub now: Instant,
    pub rescue_window: Duration,
}

/// A single attribution rule.
pub type Rule = fn(&CorrelationContext<'_>) -> Option<JobId>;

/// Attribution rules, tried in order.
pub const RULES: [(MatchRule, Rule); 3] = [
    (MatchRule::ActivePointer, by_active_pointer as Rule),
    (MatchRule::MostRecentProcessing, by_most_recent_processing as Rule),
    (MatchRule::RescueWindow, by_rescue_window as Rule),
];

/// Decide which job owns an anonymous payload frame.
pub fn match_payload(ctx: &CorrelationContext<'_>) -> Option<PayloadMatch> {
    RULES.iter().find_map(|(rule, apply)| {
        apply(ctx).map(|job_id| PayloadMatch {
            job_id,
            rule: *rule,
        })
    })
}

fn by_active_pointer(ctx: &CorrelationContext<'_>) -> Option<JobId> {
    let active = ctx.active?;
    ctx.jobs
        .iter()
        .find(|job| job.id == active && job.awaiting_output())
        .map(|job| job.id.clone())
}

fn by_most_recent_processing(ctx: &CorrelationContext<'_>) -> Option<JobId> {
    ctx.jobs
        .iter()
        .filter(|job| job.status == JobStatus::Processing)
        .max_by_key(|job| job.recency_key())
        .map(|job| job.id.clone())
}

fn by_rescue_window(ctx: &CorrelationContext<'_>) -> Option<JobId> {
    ctx.jobs
        .iter()
        .filter(|job| job.is_forced())
        .filter_map(|job| job.forced_instant().map(|at| (job, at)))
        .filter(|(_, at)| ctx.now.saturating_duration_since(*at) <= ctx.rescue_window)
        .max_by_key(|(job, at)| (*at, job.recency_key()))
        .map(|(job, _)| job.id.clone())
}
