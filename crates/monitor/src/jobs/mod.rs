//! The monitoring jobs wired into the supervisor.

mod daily_reset;
mod disclosure;
mod price;

pub use daily_reset::{DailyResetJob, DAILY_RESET_JOB};
pub use disclosure::{DisclosureJob, DISCLOSURE_JOB};
pub use price::{PriceJob, PRICE_JOB};

use tracing::warn;
use watchdesk_core::Alert;
use watchdesk_notify::AlertSink;

/// Hand alerts to the sink in order. Returns how many reached at least
/// one channel.
pub(crate) async fn deliver_all(sink: &dyn AlertSink, job: &str, alerts: Vec<Alert>) -> usize {
    let mut delivered = 0;
    for alert in alerts {
        let report = sink.deliver(alert).await;
        if report.delivered() {
            delivered += 1;
        } else if !report.results.is_empty() {
            warn!(
                job,
                entity = %report.alert.subject.id,
                error_class = "delivery",
                failed = ?report.failed_channels().collect::<Vec<_>>(),
                "alert not delivered on any channel"
            );
        }
    }
    delivered
}
