//! Live dashboard push channel.
//!
//! Alerts become typed [`PushEvent`]s on a bounded broadcast channel.
//! Whatever serves the dashboard subscribes; slow subscribers lag and
//! drop the oldest events rather than blocking monitoring.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use watchdesk_core::{Alert, AlertSource};

use crate::traits::{Notifier, NotifyError};

pub const DEFAULT_PUSH_CAPACITY: usize = 256;

/// One message for dashboard clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl PushEvent {
    pub fn for_alert(alert: &Alert) -> Result<Self, NotifyError> {
        let event_type = match alert.source {
            AlertSource::Disclosure => "dart_update",
            AlertSource::Price => "alert_triggered",
            AlertSource::System => "system_status",
        };
        let payload = serde_json::to_value(alert).map_err(|e| NotifyError::Push(e.to_string()))?;
        Ok(Self {
            event_type: event_type.to_string(),
            payload,
            timestamp: alert.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PushChannel {
    tx: broadcast::Sender<PushEvent>,
}

impl PushChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Broadcast an arbitrary event. Returns how many subscribers saw it.
    pub fn publish(&self, event: PushEvent) -> usize {
        // A send error only means nobody is listening.
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for PushChannel {
    fn default() -> Self {
        Self::new(DEFAULT_PUSH_CAPACITY)
    }
}

#[async_trait::async_trait]
impl Notifier for PushChannel {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let event = PushEvent::for_alert(alert)?;
        let event_type = event.event_type.clone();
        let receivers = self.publish(event);
        tracing::debug!(channel = "push", entity = %alert.subject.id, event_type, receivers, "alert pushed");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "push"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchdesk_core::{AlertKind, Severity};

    fn alert() -> Alert {
        Alert::system("disclosure", AlertKind::JobFailing { consecutive_errors: 5 }, "failing", "5 errors", Severity::Warning, Utc::now())
    }

    #[tokio::test]
    async fn no_subscribers_is_ok() {
        let push = PushChannel::new(4);
        assert_eq!(push.subscribers(), 0);
        push.send(&alert()).await.unwrap();
    }

    #[tokio::test]
    async fn subscriber_receives_typed_event() {
        let push = PushChannel::new(4);
        let mut rx = push.subscribe();
        let alert = alert();
        push.send(&alert).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "system_status");
        assert_eq!(event.timestamp, alert.created_at);
        assert_eq!(event.payload["kind"]["type"], "job_failing");
        assert_eq!(event.payload["subject"]["id"], "disclosure");
    }
}
