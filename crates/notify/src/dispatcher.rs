//! Fans alerts out to every configured channel.
//!
//! Channels run concurrently, each under its own timeout, so a hung SMTP
//! server cannot hold up the dashboard push (or the job that raised the
//! alert). Individual channel failures don't block other channels.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use watchdesk_core::{Alert, Clock, SystemClock};

use crate::traits::{AlertSink, DeliveryReport, DispatchResult, Notifier, NotifyError};

pub const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Dispatcher {
    channels: Vec<Arc<dyn Notifier>>,
    channel_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            channels,
            channel_timeout: DEFAULT_CHANNEL_TIMEOUT,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.channel_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn add_channel(&mut self, channel: Arc<dyn Notifier>) {
        self.channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel_name()).collect()
    }

    async fn send_one(&self, channel: &dyn Notifier, alert: &Alert) -> DispatchResult {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.channel_timeout, channel.send(alert)).await {
            Ok(r) => r,
            Err(_) => Err(NotifyError::Timeout(self.channel_timeout)),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let error = match result {
            Ok(()) => {
                tracing::info!(
                    channel = channel.channel_name(),
                    entity = %alert.subject.id,
                    duration_ms,
                    "alert delivered"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    channel = channel.channel_name(),
                    entity = %alert.subject.id,
                    error_class = e.class(),
                    error = %e,
                    duration_ms,
                    "alert delivery failed"
                );
                Some(e.to_string())
            }
        };

        DispatchResult {
            channel: channel.channel_name().to_string(),
            entity_key: alert.subject.id.clone(),
            success: error.is_none(),
            error,
            duration_ms,
        }
    }

    /// Deliver to every channel and report per-channel results.
    pub async fn dispatch(&self, alert: &Alert) -> Vec<DispatchResult> {
        if self.channels.is_empty() {
            tracing::debug!(entity = %alert.subject.id, "no notification channels configured");
            return Vec::new();
        }
        join_all(self.channels.iter().map(|c| self.send_one(c.as_ref(), alert))).await
    }

    /// Send a test alert through the channel at `channel_index`.
    pub async fn test_notify(&self, channel_index: usize) -> Result<(), NotifyError> {
        let channel = self
            .channels
            .get(channel_index)
            .ok_or_else(|| NotifyError::Config(format!("Channel index {channel_index} out of range")))?;
        channel.test().await
    }
}

#[async_trait::async_trait]
impl AlertSink for Dispatcher {
    async fn deliver(&self, alert: Alert) -> DeliveryReport {
        let results = self.dispatch(&alert).await;
        let alert = if results.iter().any(|r| r.success) {
            alert.mark_sent(self.clock.now())
        } else {
            alert
        };
        DeliveryReport { alert, results }
    }
}
