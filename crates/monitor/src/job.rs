//! The unit of work the supervisor schedules.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use watchdesk_core::config::ScheduleConfig;

use crate::error::JobError;

/// When a job's ticks fire.
#[derive(Debug, Clone)]
pub enum JobSchedule {
    /// Fixed period. Ticks that would overlap a slow run are skipped.
    Interval(Duration),
    /// Cron expression evaluated in exchange-local time.
    Cron(cron::Schedule),
}

impl fmt::Display for JobSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSchedule::Interval(d) => write!(f, "every {}s", d.as_secs()),
            JobSchedule::Cron(s) => write!(f, "cron '{}'", s),
        }
    }
}

/// How a tick that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { processed: usize, alerts: usize },
    /// Upstream asked us to back off (e.g. request quota exhausted).
    /// Not a failure: the consecutive-error count is left alone.
    EndedEarly { reason: String },
}

/// Interval, warm-up and stale threshold for an interval job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTiming {
    pub interval: Duration,
    pub warm_up: Duration,
    /// A job is stalled once `interval * stale_multiple` passes without a tick.
    pub stale_multiple: u32,
}

impl JobTiming {
    pub fn disclosure(cfg: &ScheduleConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.disclosure_interval_secs),
            warm_up: Duration::from_secs(cfg.disclosure_warmup_secs),
            stale_multiple: cfg.disclosure_stale_multiple,
        }
    }

    pub fn price(cfg: &ScheduleConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.price_interval_secs),
            warm_up: Duration::from_secs(cfg.price_warmup_secs),
            stale_multiple: cfg.price_stale_multiple,
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.interval.saturating_mul(self.stale_multiple.max(1))
    }
}

/// A periodically executed monitoring job.
///
/// Implementations bound their own external calls with timeouts; the
/// supervisor never cancels a running tick.
#[async_trait::async_trait]
pub trait MonitorJob: Send + Sync {
    /// Stable name used in logs, alerts and [`crate::Supervisor::trigger`].
    fn name(&self) -> &str;

    fn schedule(&self) -> JobSchedule;

    /// Delay before the first tick after (re)start.
    fn warm_up(&self) -> Duration {
        Duration::ZERO
    }

    /// How long without a completed tick counts as stalled. `None` opts
    /// the job out of health checks.
    fn stale_after(&self) -> Option<Duration> {
        None
    }

    /// When the job's persistent state was last written, for status output.
    async fn state_saved_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Execute one tick.
    async fn run(&self) -> Result<JobOutcome, JobError>;
}
