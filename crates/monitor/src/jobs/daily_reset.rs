use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use watchdesk_core::Clock;
use watchdesk_rules::schedule::parse_cron;
use watchdesk_rules::ThresholdEngine;
use watchdesk_storage::SecurityStore;

use crate::error::JobError;
use crate::job::{JobOutcome, JobSchedule, MonitorJob};

pub const DAILY_RESET_JOB: &str = "daily_reset";

/// Re-arm the daily surge/drop bands of every security at the start of
/// the exchange-local day. Target, stop-loss and parity bands are kept.
pub struct DailyResetJob {
    store: Arc<SecurityStore>,
    engine: ThresholdEngine,
    clock: Arc<dyn Clock>,
    schedule: cron::Schedule,
}

impl DailyResetJob {
    /// `cron_expr` is a 5- or 6-field expression in exchange-local time.
    pub fn new(
        store: Arc<SecurityStore>,
        engine: ThresholdEngine,
        clock: Arc<dyn Clock>,
        cron_expr: &str,
    ) -> Result<Self, JobError> {
        Ok(Self {
            store,
            engine,
            clock,
            schedule: parse_cron(cron_expr)?,
        })
    }
}

#[async_trait::async_trait]
impl MonitorJob for DailyResetJob {
    fn name(&self) -> &str {
        DAILY_RESET_JOB
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Cron(self.schedule.clone())
    }

    async fn state_saved_at(&self) -> Option<DateTime<Utc>> {
        self.store.last_saved().await
    }

    async fn run(&self) -> Result<JobOutcome, JobError> {
        let day = self.engine.market().trading_day(self.clock.now());
        let (securities, cleared) = self
            .store
            .update(|book| {
                let mut cleared = 0;
                for security in book.iter_mut() {
                    cleared += self.engine.reset_daily(security, day);
                }
                Ok::<_, JobError>((book.len(), cleared))
            })
            .await?;
        info!(job = DAILY_RESET_JOB, %day, securities, cleared, "daily alert bands re-armed");
        Ok(JobOutcome::Completed {
            processed: securities,
            alerts: 0,
        })
    }
}
