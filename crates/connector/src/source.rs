//! External source seams consumed by the monitoring jobs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use watchdesk_core::{DateRange, FilingFilters, FilingRecord, PriceQuote};

use crate::error::SourceError;

/// Regulatory filing feed.
#[async_trait]
pub trait FilingSource: Send + Sync {
    /// Fetch every filing in `range` matching `filters`.
    ///
    /// Must report an exhausted request quota as [`SourceError::QuotaExceeded`].
    async fn fetch(&self, range: DateRange, filters: &FilingFilters) -> Result<Vec<FilingRecord>, SourceError>;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

/// Price quote feed.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self, code: &str) -> Result<PriceQuote, SourceError>;

    fn name(&self) -> &str;
}

/// Tries `primary`, then `fallback` when the primary fails.
///
/// Callers see one quote and do not care which source produced it.
pub struct FallbackPriceSource {
    primary: Arc<dyn PriceSource>,
    fallback: Option<Arc<dyn PriceSource>>,
}

impl FallbackPriceSource {
    pub fn new(primary: Arc<dyn PriceSource>, fallback: Option<Arc<dyn PriceSource>>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl PriceSource for FallbackPriceSource {
    async fn fetch_price(&self, code: &str) -> Result<PriceQuote, SourceError> {
        let primary_err = match self.primary.fetch_price(code).await {
            Ok(q) => return Ok(q),
            Err(e) => e,
        };
        let Some(fallback) = &self.fallback else {
            return Err(primary_err);
        };
        debug!(
            entity = code,
            source = self.primary.name(),
            error = %primary_err,
            error_class = primary_err.class(),
            "primary quote source failed, trying fallback"
        );
        match fallback.fetch_price(code).await {
            Ok(q) => Ok(q),
            Err(e) => {
                warn!(
                    entity = code,
                    primary_error = %primary_err,
                    fallback_error = %e,
                    error_class = e.class(),
                    "all quote sources failed"
                );
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        "fallback"
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticPrices;
    use super::*;

    #[tokio::test]
    async fn primary_wins_when_available() {
        let src = FallbackPriceSource::new(
            Arc::new(StaticPrices::new("primary", &[("ABC", 100.0)])),
            Some(Arc::new(StaticPrices::new("backup", &[("ABC", 99.0)]))),
        );
        let q = src.fetch_price("ABC").await.unwrap();
        assert_eq!(q.price, 100.0);
        assert_eq!(q.source, "primary");
    }

    #[tokio::test]
    async fn falls_back_on_primary_error() {
        let src = FallbackPriceSource::new(
            Arc::new(StaticPrices::new("primary", &[])),
            Some(Arc::new(StaticPrices::new("backup", &[("ABC", 99.0)]))),
        );
        let q = src.fetch_price("ABC").await.unwrap();
        assert_eq!(q.source, "backup");
    }

    #[tokio::test]
    async fn without_fallback_primary_error_surfaces() {
        let src = FallbackPriceSource::new(Arc::new(StaticPrices::new("primary", &[])), None);
        assert!(matches!(src.fetch_price("ABC").await, Err(SourceError::NotFound(_))));
    }
}
