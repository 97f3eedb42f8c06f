//! Errors returned by external data sources.

use std::time::Duration;

/// Failure talking to a filing or price source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source's daily request quota is used up. Ends a tick early
    /// without counting as a job failure.
    #[error("request quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Source answered with an application-level error code.
    #[error("upstream error {code}: {message}")]
    Upstream { code: String, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no quote available for {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SourceError {
    /// Short class label for structured logs.
    pub fn class(&self) -> &'static str {
        match self {
            SourceError::QuotaExceeded(_) => "quota_exceeded",
            SourceError::Timeout(_) => "timeout",
            SourceError::Http(_) => "network",
            SourceError::Status { .. } => "http_status",
            SourceError::RateLimited { .. } => "rate_limited",
            SourceError::Upstream { .. } => "upstream",
            SourceError::Malformed(_) => "malformed_response",
            SourceError::NotFound(_) => "not_found",
            SourceError::Config(_) => "configuration",
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Timeout(_) | SourceError::RateLimited { .. } => true,
            SourceError::Http(e) => !e.is_decode() && !e.is_builder(),
            SourceError::Status { status, .. } => *status >= 500,
            // 800: system maintenance, 900: unclassified server error
            SourceError::Upstream { code, .. } => code == "800" || code == "900",
            SourceError::QuotaExceeded(_)
            | SourceError::Malformed(_)
            | SourceError::NotFound(_)
            | SourceError::Config(_) => false,
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, SourceError::QuotaExceeded(_))
    }

    /// Map a non-success response to an error, keeping any `Retry-After`.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let retry_after = retry_after_secs(response.headers());
        let body = response.text().await.unwrap_or_default();
        Self::from_status(status, retry_after, body)
    }

    pub(crate) fn from_status(status: reqwest::StatusCode, retry_after_secs: Option<u64>, body: String) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            SourceError::RateLimited { retry_after_secs }
        } else {
            SourceError::Status {
                status: status.as_u16(),
                body,
            }
        }
    }
}

/// Delta-seconds form only; an HTTP-date falls back to normal backoff.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
