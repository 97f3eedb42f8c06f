use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use watchdesk_connector::{PriceSource, RetryPolicy};
use watchdesk_core::Clock;
use watchdesk_notify::AlertSink;
use watchdesk_rules::ThresholdEngine;
use watchdesk_storage::SecurityStore;

use crate::error::JobError;
use crate::job::{JobOutcome, JobSchedule, JobTiming, MonitorJob};

pub const PRICE_JOB: &str = "price";

/// Poll a quote for every active security during market hours and run
/// the threshold engine over the stored records.
pub struct PriceJob {
    source: Arc<dyn PriceSource>,
    retry: RetryPolicy,
    store: Arc<SecurityStore>,
    engine: ThresholdEngine,
    sink: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    timing: JobTiming,
}

impl PriceJob {
    pub fn new(
        source: Arc<dyn PriceSource>,
        retry: RetryPolicy,
        store: Arc<SecurityStore>,
        engine: ThresholdEngine,
        sink: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        timing: JobTiming,
    ) -> Self {
        Self {
            source,
            retry,
            store,
            engine,
            sink,
            clock,
            timing,
        }
    }
}

#[async_trait::async_trait]
impl MonitorJob for PriceJob {
    fn name(&self) -> &str {
        PRICE_JOB
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
        self.store.last_saved().await
    }

    async fn run(&self) -> Result<JobOutcome, JobError> {
        let now = self.clock.now();
        let market = self.engine.market();
        if !market.is_open(now) {
            debug!(
                job = PRICE_JOB,
                status = %market.status(now),
                next_open = ?market.next_open(now),
                "market closed, skipping quotes"
            );
            return Ok(JobOutcome::Completed { processed: 0, alerts: 0 });
        }

        // Re-read every tick so edits to the securities file apply without a restart.
        let codes = self.store.load().await?.active_codes();
        if codes.is_empty() {
            debug!(job = PRICE_JOB, "no active securities");
            return Ok(JobOutcome::Completed { processed: 0, alerts: 0 });
        }

        // Network calls happen outside the store lock.
        let mut quotes = Vec::with_capacity(codes.len());
        let mut failures: Vec<(String, String)> = Vec::new();
        for code in &codes {
            match self.retry.run("price.fetch", || self.source.fetch_price(code)).await {
                Ok(quote) => quotes.push(quote),
                Err(e) => {
                    warn!(
                        job = PRICE_JOB,
                        entity = %code,
                        source = self.source.name(),
                        error_class = e.class(),
                        error = %e,
                        "quote fetch failed"
                    );
                    failures.push((code.clone(), e.to_string()));
                }
            }
        }

        if quotes.is_empty() {
            let last = failures.last().map(|(_, e)| e.clone()).unwrap_or_default();
            return Err(JobError::QuotesUnavailable {
                failed: failures.len(),
                last,
            });
        }

        let evaluated_at = self.clock.now();
        let alerts = self
            .store
            .update(|book| {
                let mut alerts = Vec::new();
                for quote in &quotes {
                    // Removed between load and update.
                    let Some(security) = book.get_mut(&quote.code) else {
                        continue;
                    };
                    alerts.extend(self.engine.evaluate(security, quote, evaluated_at));
                }
                for (code, error) in &failures {
                    if let Some(security) = book.get_mut(code) {
                        security.last_error = Some(error.clone());
                    }
                }
                Ok::<_, JobError>(alerts)
            })
            .await?;

        let fired = alerts.len();
        if fired > 0 {
            info!(job = PRICE_JOB, alerts = fired, "price alerts fired");
        }
        super::deliver_all(self.sink.as_ref(), PRICE_JOB, alerts).await;
        Ok(JobOutcome::Completed {
            processed: quotes.len(),
            alerts: fired,
        })
    }
}
