//! Alerts emitted by the evaluators and the supervisor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which part of the system produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    Disclosure,
    Price,
    System,
}

impl std::fmt::Display for AlertSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSource::Disclosure => write!(f, "disclosure"),
            AlertSource::Price => write!(f, "price"),
            AlertSource::System => write!(f, "system"),
        }
    }
}

/// Severity of an alert. Ordered: `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// What condition fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    /// A filing matched the watch rules.
    Filing {
        matched_keywords: Vec<String>,
        detail_url: String,
    },
    TargetReached { target: f64, price: f64 },
    StopLoss { stop_loss: f64, price: f64 },
    DailySurge { change_percent: f64, threshold: f64 },
    DailyDrop { change_percent: f64, threshold: f64 },
    Parity { band: u32, parity: f64, conversion_price: f64 },
    /// Lifecycle notice (job started/stopped).
    Lifecycle,
    /// Consecutive failures crossed the warning threshold.
    JobFailing { consecutive_errors: u32 },
    /// Circuit breaker disabled the job.
    JobDisabled { consecutive_errors: u32 },
    /// Health check found a job stale.
    MonitoringStalled { stale_secs: u64 },
}

impl AlertKind {
    /// Short machine label used for push event types and template branches.
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::Filing { .. } => "filing",
            AlertKind::TargetReached { .. } => "target_reached",
            AlertKind::StopLoss { .. } => "stop_loss",
            AlertKind::DailySurge { .. } => "daily_surge",
            AlertKind::DailyDrop { .. } => "daily_drop",
            AlertKind::Parity { .. } => "parity",
            AlertKind::Lifecycle => "lifecycle",
            AlertKind::JobFailing { .. } => "job_failing",
            AlertKind::JobDisabled { .. } => "job_disabled",
            AlertKind::MonitoringStalled { .. } => "monitoring_stalled",
        }
    }
}

/// The entity an alert is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSubject {
    /// Filing id, security code, or job name.
    pub id: String,
    /// Issuer or security display name.
    pub name: String,
}

/// A generated alert. Content is fixed at creation; only the delivery
/// stamp is added later through [`Alert::mark_sent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub source: AlertSource,
    pub kind: AlertKind,
    pub subject: AlertSubject,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    /// Matcher score for filings; 0 for other alerts.
    pub priority: u32,
    pub created_at: DateTime<Utc>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        source: AlertSource,
        kind: AlertKind,
        subject: AlertSubject,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            kind,
            subject,
            title: title.into(),
            message: message.into(),
            severity,
            priority: 0,
            created_at,
            sent: false,
            sent_at: None,
        }
    }

    /// Operator-facing alert about the monitoring system itself.
    pub fn system(
        job: &str,
        kind: AlertKind,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            AlertSource::System,
            kind,
            AlertSubject {
                id: job.to_string(),
                name: job.to_string(),
            },
            title,
            message,
            severity,
            created_at,
        )
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Return a copy stamped as delivered.
    pub fn mark_sent(self, at: DateTime<Utc>) -> Self {
        Self {
            sent: true,
            sent_at: Some(at),
            ..self
        }
    }
}
