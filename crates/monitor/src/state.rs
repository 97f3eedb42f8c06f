//! Per-job scheduling state as reported by the supervisor.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// `Stopped -> Scheduled -> Running -> (Scheduled | Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Not scheduled: supervisor not started, stopped, or circuit breaker open.
    Stopped,
    Scheduled,
    Running,
    /// Last tick failed; the next tick is still scheduled.
    Failed,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Stopped => write!(f, "stopped"),
            JobPhase::Scheduled => write!(f, "scheduled"),
            JobPhase::Running => write!(f, "running"),
            JobPhase::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerJobState {
    pub phase: JobPhase,
    /// Cleared by the circuit breaker; only a manual restart sets it again.
    pub enabled: bool,
    /// Last successful tick.
    pub last_run: Option<DateTime<Utc>>,
    /// Last tick that finished, successful or not.
    pub last_tick: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    /// Successful ticks since the last failure.
    pub run_count: u64,
    pub total_runs: u64,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    /// Loop restarts by the health check or an operator.
    pub restarts: u32,
    /// Last write of the job's state file, refreshed after every tick and
    /// health check.
    pub state_saved_at: Option<DateTime<Utc>>,
}

impl Default for SchedulerJobState {
    fn default() -> Self {
        Self {
            phase: JobPhase::Stopped,
            enabled: true,
            last_run: None,
            last_tick: None,
            next_run: None,
            run_count: 0,
            total_runs: 0,
            consecutive_errors: 0,
            last_error: None,
            restarts: 0,
            state_saved_at: None,
        }
    }
}

/// One row of [`crate::Supervisor::status`].
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub schedule: String,
    #[serde(flatten)]
    pub state: SchedulerJobState,
}
