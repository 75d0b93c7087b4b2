use std::time::Duration;

use tokio::time::Instant;

use crate::core::config::PipelineSettings;

/// Extra slack past the hard limit before a stage is considered abandoned.
pub(crate) const STALE_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StageLimits {
    pub(crate) hard: Duration,
    pub(crate) soft: Duration,
}

impl StageLimits {
    pub(crate) fn new(hard: Duration, soft: Duration) -> Self {
        Self { hard, soft: soft.min(hard) }
    }

    pub(crate) fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.hard_limit(), settings.soft_limit())
    }

    /// How long a worker keeps its claim on an exam.
    pub(crate) fn lease(&self) -> Duration {
        self.hard + STALE_GRACE
    }

    pub(crate) fn start(&self) -> StageDeadline {
        StageDeadline { started: Instant::now(), soft: self.soft }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StageDeadline {
    started: Instant,
    soft: Duration,
}

impl StageDeadline {
    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Past the soft limit, stages stop issuing optional collaborator calls.
    pub(crate) fn soft_expired(&self) -> bool {
        self.elapsed() >= self.soft
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_limit_never_exceeds_hard_limit() {
        let limits = StageLimits::new(Duration::from_secs(10), Duration::from_secs(30));
        assert_eq!(limits.soft, Duration::from_secs(10));
        assert_eq!(limits.lease(), Duration::from_secs(70));
    }

    #[tokio::test]
    async fn deadline_tracks_soft_limit() {
        let relaxed = StageLimits::new(Duration::from_secs(300), Duration::from_secs(240)).start();
        assert!(!relaxed.soft_expired());

        let exhausted = StageLimits::new(Duration::from_secs(300), Duration::ZERO).start();
        assert!(exhausted.soft_expired());
    }
}
