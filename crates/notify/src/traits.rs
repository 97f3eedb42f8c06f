//! Notifier trait definition and shared error types.

use std::time::Duration;

use chrono::Utc;
use watchdesk_core::{Alert, AlertKind, Severity};

/// Errors that can occur during alert delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Push channel failed: {0}")]
    Push(String),

    #[error("Channel timed out after {0:?}")]
    Timeout(Duration),
}

impl NotifyError {
    /// Short label used as the `error_class` log field.
    pub fn class(&self) -> &'static str {
        match self {
            NotifyError::Smtp(_) => "smtp",
            NotifyError::Template(_) => "template",
            NotifyError::Config(_) => "config",
            NotifyError::Push(_) => "push",
            NotifyError::Timeout(_) => "timeout",
        }
    }
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an alert through this channel.
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;

    /// Test connectivity with a sample alert.
    async fn test(&self) -> Result<(), NotifyError> {
        let alert = Alert::system(
            "notify-test",
            AlertKind::Lifecycle,
            "[TEST] watchdesk notification test",
            "This is a test notification from the watchdesk monitor.",
            Severity::Info,
            Utc::now(),
        );
        self.send(&alert).await
    }

    /// Human-readable name for this channel (e.g., "email", "push").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching an alert to a single channel.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub channel: String,
    /// Filing id, security code, or job name the alert is about.
    pub entity_key: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Outcome of fanning one alert out to every channel.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    /// The alert, stamped as sent when at least one channel succeeded.
    pub alert: Alert,
    pub results: Vec<DispatchResult>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> bool {
        self.results.iter().any(|r| r.success)
    }

    pub fn failed_channels(&self) -> impl Iterator<Item = &str> {
        self.results.iter().filter(|r| !r.success).map(|r| r.channel.as_str())
    }
}

/// Where evaluators and the supervisor hand finished alerts.
///
/// Delivery never fails as a whole: per-channel failures are reported in
/// the returned [`DeliveryReport`].
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: Alert) -> DeliveryReport;
}
