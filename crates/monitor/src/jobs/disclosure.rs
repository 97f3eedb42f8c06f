use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{info, warn};
use watchdesk_connector::{FilingSource, RetryPolicy};
use watchdesk_core::{Clock, DateRange, FilingFilters};
use watchdesk_notify::AlertSink;
use watchdesk_rules::{DisclosureMatcher, RulesLoader};
use watchdesk_storage::ProcessedIdStore;

use crate::error::JobError;
use crate::job::{JobOutcome, JobSchedule, JobTiming, MonitorJob};

pub const DISCLOSURE_JOB: &str = "disclosure";

/// Fetch today's filings, match them against the watch rules, and deliver
/// the resulting alerts highest priority first.
pub struct DisclosureJob {
    source: Arc<dyn FilingSource>,
    retry: RetryPolicy,
    rules: Arc<RulesLoader>,
    registry: Arc<ProcessedIdStore>,
    matcher: DisclosureMatcher,
    sink: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    timing: JobTiming,
    filters: FilingFilters,
    lookback_days: u32,
}

impl DisclosureJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn FilingSource>,
        retry: RetryPolicy,
        rules: Arc<RulesLoader>,
        registry: Arc<ProcessedIdStore>,
        sink: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
        timing: JobTiming,
    ) -> Self {
        Self {
            source,
            retry,
            rules,
            registry,
            matcher: DisclosureMatcher::new(),
            sink,
            clock,
            offset,
            timing,
            filters: FilingFilters::default(),
            lookback_days: 0,
        }
    }

    pub fn with_filters(mut self, filters: FilingFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Also fetch this many days before today (exchange-local).
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }
}

#[async_trait::async_trait]
impl MonitorJob for DisclosureJob {
    fn name(&self) -> &str {
        DISCLOSURE_JOB
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.timing.interval)
    }

    fn warm_up(&self) -> Duration {
        self.timing.warm_up
    }

    fn stale_after(&self) -> Option<Duration> {
        Some(self.timing.stale_after())
    }

    async fn state_saved_at(&self) -> Option<DateTime<Utc>> {
        self.registry.last_saved().await
    }

    async fn run(&self) -> Result<JobOutcome, JobError> {
        let now = self.clock.now();
        let today = now.with_timezone(&self.offset).date_naive();
        let range = DateRange {
            from: today - chrono::Duration::days(i64::from(self.lookback_days)),
            to: today,
        };
        // One snapshot per tick: an edit mid-tick applies from the next tick.
        let rules = self.rules.current();

        let batch = match self
            .retry
            .run("disclosure.fetch", || self.source.fetch(range, &self.filters))
            .await
        {
            Ok(batch) => batch,
            Err(e) if e.is_quota_exceeded() => {
                warn!(
                    job = DISCLOSURE_JOB,
                    source = self.source.name(),
                    error_class = e.class(),
                    error = %e,
                    "filing quota exhausted, ending tick early"
                );
                return Ok(JobOutcome::EndedEarly { reason: e.to_string() });
            }
            Err(e) => return Err(e.into()),
        };

        let (alerts, summary) = self
            .registry
            .update(|registry| {
                Ok::<_, JobError>(self.matcher.evaluate_with_summary(&batch, &rules, registry, now))
            })
            .await?;

        info!(
            job = DISCLOSURE_JOB,
            received = summary.received,
            duplicate = summary.duplicate,
            matched = summary.matched,
            excluded = summary.excluded,
            "disclosure batch evaluated"
        );

        let fired = alerts.len();
        super::deliver_all(self.sink.as_ref(), DISCLOSURE_JOB, alerts).await;
        Ok(JobOutcome::Completed {
            processed: summary.received,
            alerts: fired,
        })
    }
}
