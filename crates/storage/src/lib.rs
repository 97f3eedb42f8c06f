//! Persistent state for the monitoring core.
//!
//! Every store wraps one file behind one async lock. Writes are full
//! rewrites through a sibling temp file and a rename, so a concurrent
//! reader sees either the old or the new contents.

pub mod error;
pub mod processed;
pub mod securities;
pub mod store;

pub use error::StorageError;
pub use processed::{ProcessedFilingRegistry, ProcessedIdStore, ProcessedIdsCodec, DEFAULT_REGISTRY_CAP};
pub use securities::{SecuritiesCodec, SecurityBook, SecurityStore};
pub use store::{StateCodec, StateStore};
