//! Timing parameters for job tracking.

use std::time::Duration;

/// Durations that drive finalization, rescue and reconnection.
///
/// The right values depend on the latency between this service and
/// the engine, so all of them are configurable.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Wait after `execution_success` before giving up on the payload.
    pub grace_period: Duration,
    /// How long after forced completion a late payload may still bind.
    pub rescue_window: Duration,
    /// Delay before a completed job leaves the registry.
    pub retention: Duration,
    /// Delay before a forced job leaves the registry.
    pub forced_retention: Duration,
    /// Age after which an unfinished job is considered abandoned.
    pub max_job_age: Duration,
    /// How often the staleness sweep runs.
    pub sweep_interval: Duration,
    /// Pause between event channel connection attempts.
    pub reconnect_delay: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            rescue_window: Duration::from_secs(30),
            retention: Duration::from_secs(3),
            forced_retention: Duration::from_secs(60),
            max_job_age: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl TrackerConfig {
    /// Fix up combinations that would defeat the rescue window.
    ///
    /// A forced job must stay in the registry at least as long as the
    /// rescue window, otherwise a late payload has nothing to bind to.
    pub fn normalized(mut self) -> Self {
        if self.forced_retention < self.rescue_window {
            tracing::warn!(
                forced_retention_ms = self.forced_retention.as_millis() as u64,
                rescue_window_ms = self.rescue_window.as_millis() as u64,
                "Forced retention shorter than rescue window, raising it",
            );
            self.forced_retention = self.rescue_window;
        }
        if self.forced_retention < self.retention {
            self.forced_retention = self.retention;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_raises_forced_retention() {
        let config = TrackerConfig {
            rescue_window: Duration::from_secs(45),
            forced_retention: Duration::from_secs(10),
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.forced_retention, Duration::from_secs(45));
    }

    #[test]
    fn defaults_are_already_normal() {
        let config = TrackerConfig::default().normalized();
        assert_eq!(config.forced_retention, Duration::from_secs(60));
        assert!(config.forced_retention > config.retention);
    }
}
