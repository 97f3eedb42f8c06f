//! Job supervision for the monitoring core.
//!
//! This crate provides:
//! - The `MonitorJob` trait and the disclosure, price and daily-reset jobs
//! - `Supervisor`: per-job timer loops, single-flight ticks, a consecutive
//!   failure circuit breaker and a stall-detecting health loop
//! - The `monitor-worker` binary wiring config, stores, sources and sinks

pub mod error;
pub mod job;
pub mod jobs;
pub mod state;
pub mod supervisor;

pub use error::JobError;
pub use job::{JobOutcome, JobSchedule, JobTiming, MonitorJob};
pub use jobs::{DailyResetJob, DisclosureJob, PriceJob, DAILY_RESET_JOB, DISCLOSURE_JOB, PRICE_JOB};
pub use state::{JobPhase, JobStatus, SchedulerJobState};
pub use supervisor::{SkipReason, Supervisor, SupervisorSettings, TickReport};
