//! External data sources for the monitoring core.
//!
//! The jobs only see the [`FilingSource`] and [`PriceSource`] traits; the
//! concrete HTTP clients live here together with the retry policy applied
//! at every call site.

pub mod dart;
pub mod error;
pub mod quote;
pub mod retry;
pub mod source;

pub use dart::DartClient;
pub use error::SourceError;
pub use quote::JsonQuoteClient;
pub use retry::RetryPolicy;
pub use source::{FallbackPriceSource, FilingSource, PriceSource};
