//! Alert delivery for the monitoring core.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable channels and the `AlertSink` seam
//! - Email (SMTP) and live dashboard push notifiers
//! - Minijinja rendering of the email subject/text/HTML triple
//! - Dispatcher that fans an alert out to every channel concurrently

pub mod dispatcher;
pub mod email;
pub mod push;
pub mod templating;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use email::EmailNotifier;
pub use push::{PushChannel, PushEvent};
pub use templating::{RenderedAlert, TemplateRenderer};
pub use traits::{AlertSink, DeliveryReport, DispatchResult, Notifier, NotifyError};
