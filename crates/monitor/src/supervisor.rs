//! Drives the monitoring jobs.
//!
//! Each job gets its own timer loop; a separate health loop watches for
//! jobs that stopped ticking. A tick only runs when it can take the job's
//! single-flight lock, so a slow tick makes the next one skip instead of
//! piling up. Consecutive failures escalate to one warning alert, then to
//! a critical alert and a disabled job (circuit breaker) that only
//! [`Supervisor::restart_job`] brings back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use futures::future::join_all;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use watchdesk_core::config::Config;
use watchdesk_core::{Alert, AlertKind, Clock, Severity, SystemClock};
use watchdesk_notify::AlertSink;
use watchdesk_rules::schedule::next_fire;

use crate::error::JobError;
use crate::job::{JobOutcome, JobSchedule, MonitorJob};
use crate::state::{JobPhase, JobStatus, SchedulerJobState};

const SUPERVISOR_SUBJECT: &str = "supervisor";

// ── Settings ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Consecutive failures that raise one warning alert.
    pub warn_after_errors: u32,
    /// Consecutive failures that disable the job.
    pub disable_after_errors: u32,
    pub health_interval: Duration,
    /// Exchange offset used to evaluate cron schedules.
    pub offset: FixedOffset,
    /// How long [`Supervisor::stop`] waits for in-flight ticks.
    pub stop_grace: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            warn_after_errors: 5,
            disable_after_errors: 10,
            health_interval: Duration::from_secs(300),
            offset: Utc.fix(),
            stop_grace: Duration::from_secs(30),
        }
    }
}

impl SupervisorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            warn_after_errors: cfg.supervisor.warn_after_errors,
            disable_after_errors: cfg.supervisor.disable_after_errors,
            health_interval: Duration::from_secs(cfg.schedule.health_interval_secs),
            offset: FixedOffset::east_opt(cfg.market.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix()),
            ..Self::default()
        }
    }
}

// ── Tick reports ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The previous tick of the same job is still running.
    InFlight,
    /// The circuit breaker disabled the job.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    Completed(JobOutcome),
    Failed(String),
    Skipped(SkipReason),
}

// ── Internal per-job bookkeeping ────────────────────────────────────

struct JobRuntime {
    state: SchedulerJobState,
    /// Bumped on every (re)spawn; an older loop exits when it notices.
    generation: u64,
    loop_started: Instant,
    /// Monotonic time of the last finished tick, used for stall detection.
    last_tick_at: Option<Instant>,
    /// Set once a stall has been reported; cleared by the next finished tick.
    stall_reported: bool,
    /// Operator override of an interval job's period.
    interval: Option<Duration>,
    handle: Option<JoinHandle<()>>,
}

struct JobSlot {
    job: Arc<dyn MonitorJob>,
    flight: tokio::sync::Mutex<()>,
    runtime: Mutex<JobRuntime>,
    /// Wakes the job loop so it re-reads the interval.
    retimed: Notify,
}

impl JobSlot {
    fn new(job: Arc<dyn MonitorJob>) -> Self {
        Self {
            job,
            flight: tokio::sync::Mutex::new(()),
            runtime: Mutex::new(JobRuntime {
                state: SchedulerJobState::default(),
                generation: 0,
                loop_started: Instant::now(),
                last_tick_at: None,
                stall_reported: false,
                interval: None,
                handle: None,
            }),
            retimed: Notify::new(),
        }
    }

    fn name(&self) -> &str {
        self.job.name()
    }

    fn runtime(&self) -> MutexGuard<'_, JobRuntime> {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The job's schedule with any operator interval applied.
    fn schedule(&self) -> JobSchedule {
        match (self.job.schedule(), self.runtime().interval) {
            (JobSchedule::Interval(_), Some(period)) => JobSchedule::Interval(period),
            (schedule, _) => schedule,
        }
    }

    /// Stale threshold scaled to the current interval.
    fn stale_after(&self) -> Option<Duration> {
        let limit = self.job.stale_after()?;
        match (self.job.schedule(), self.runtime().interval) {
            (JobSchedule::Interval(base), Some(period)) if !base.is_zero() => {
                Some(limit.mul_f64(period.as_secs_f64() / base.as_secs_f64()))
            }
            _ => Some(limit),
        }
    }
}

struct Inner {
    settings: SupervisorSettings,
    jobs: Vec<Arc<JobSlot>>,
    sink: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    health: Mutex<Option<JoinHandle<()>>>,
}

// ── Supervisor ──────────────────────────────────────────────────────

/// Owns the job loops. Construct once and share by reference.
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings, sink: Arc<dyn AlertSink>, jobs: Vec<Arc<dyn MonitorJob>>) -> Self {
        Self::with_clock(settings, sink, Arc::new(SystemClock), jobs)
    }

    pub fn with_clock(
        settings: SupervisorSettings,
        sink: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        jobs: Vec<Arc<dyn MonitorJob>>,
    ) -> Self {
        let mut slots: Vec<Arc<JobSlot>> = Vec::with_capacity(jobs.len());
        for job in jobs {
            if slots.iter().any(|s| s.name() == job.name()) {
                warn!(job = job.name(), "duplicate job name, ignoring later registration");
                continue;
            }
            info!(job = job.name(), schedule = %job.schedule(), "registered job");
            slots.push(Arc::new(JobSlot::new(job)));
        }
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                settings,
                jobs: slots,
                sink,
                clock,
                running: AtomicBool::new(false),
                shutdown,
                health: Mutex::new(None),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.inner.jobs.iter().map(|s| s.name()).collect()
    }

    /// Spawn every enabled job loop plus the health loop.
    ///
    /// First ticks wait for each job's warm-up.
    pub async fn start(&self) -> Result<(), JobError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::AlreadyRunning);
        }
        self.inner.shutdown.send_replace(false);

        for slot in &self.inner.jobs {
            let enabled = slot.runtime().state.enabled;
            if enabled {
                self.inner.spawn_loop(slot);
            } else {
                warn!(job = slot.name(), "job disabled by circuit breaker, not scheduling");
            }
        }

        let health = tokio::spawn(health_loop(Arc::clone(&self.inner)));
        *self.inner.health.lock().unwrap_or_else(|e| e.into_inner()) = Some(health);

        let names = self.job_names().join(", ");
        info!(jobs = %names, "supervisor started");
        self.inner
            .emit(Alert::system(
                SUPERVISOR_SUBJECT,
                AlertKind::Lifecycle,
                "monitoring started",
                format!("Scheduled jobs: {}", names),
                Severity::Info,
                self.inner.clock.now(),
            ))
            .await;
        Ok(())
    }

    /// Stop scheduling new ticks and wait (up to the grace period) for
    /// in-flight ticks to finish. Running ticks are never aborted.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.send_replace(true);

        let mut handles = Vec::new();
        if let Some(h) = self.inner.health.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handles.push(h);
        }
        for slot in &self.inner.jobs {
            if let Some(h) = slot.runtime().handle.take() {
                handles.push(h);
            }
        }

        let grace = self.inner.settings.stop_grace;
        match tokio::time::timeout(grace, join_all(handles)).await {
            Ok(_) => debug!("all job loops exited"),
            Err(_) => warn!(
                grace_secs = grace.as_secs(),
                "ticks still in flight after grace period, leaving them to finish"
            ),
        }

        for slot in &self.inner.jobs {
            let mut rt = slot.runtime();
            rt.state.phase = JobPhase::Stopped;
            rt.state.next_run = None;
        }

        info!("supervisor stopped");
        self.inner
            .emit(Alert::system(
                SUPERVISOR_SUBJECT,
                AlertKind::Lifecycle,
                "monitoring stopped",
                "All monitoring jobs were stopped.",
                Severity::Info,
                self.inner.clock.now(),
            ))
            .await;
    }

    /// Run one tick now ("force check"). Shares the job's single-flight
    /// lock with its scheduled ticks.
    pub async fn trigger(&self, name: &str) -> Result<TickReport, JobError> {
        let slot = self.inner.slot(name)?;
        info!(job = name, "manual tick requested");
        Ok(self.inner.run_tick(&slot).await)
    }

    /// Re-enable a job and reset its failure count. Respawns its loop when
    /// the supervisor is running.
    pub fn restart_job(&self, name: &str) -> Result<(), JobError> {
        let slot = self.inner.slot(name)?;
        {
            let mut rt = slot.runtime();
            rt.state.enabled = true;
            rt.state.consecutive_errors = 0;
            rt.state.restarts += 1;
            rt.stall_reported = false;
            if rt.state.phase != JobPhase::Running {
                rt.state.phase = JobPhase::Stopped;
            }
        }
        if self.is_running() {
            self.inner.spawn_loop(&slot);
        }
        info!(job = name, "job restarted by operator");
        Ok(())
    }

    /// Change an interval job's period. The running loop picks it up right
    /// away: the next tick fires one new period after the previous one.
    pub fn set_interval(&self, name: &str, interval: Duration) -> Result<(), JobError> {
        let slot = self.inner.slot(name)?;
        if !matches!(slot.job.schedule(), JobSchedule::Interval(_)) {
            return Err(JobError::InvalidSchedule(format!("{} runs on a cron schedule", name)));
        }
        if interval.is_zero() {
            return Err(JobError::InvalidSchedule(format!("{} interval must be > 0", name)));
        }
        slot.runtime().interval = Some(interval);
        slot.retimed.notify_one();
        info!(job = name, interval_secs = interval.as_secs(), "job interval changed");
        Ok(())
    }

    /// Inspect every job once. Returns the names of jobs found stalled.
    pub async fn health_check(&self) -> Vec<String> {
        self.inner.health_check().await
    }

    pub fn status(&self) -> Vec<JobStatus> {
        self.inner
            .jobs
            .iter()
            .map(|slot| JobStatus {
                name: slot.name().to_string(),
                schedule: slot.schedule().to_string(),
                state: slot.runtime().state.clone(),
            })
            .collect()
    }

    pub fn job_status(&self, name: &str) -> Option<JobStatus> {
        self.status().into_iter().find(|s| s.name == name)
    }
}

impl Inner {
    fn slot(&self, name: &str) -> Result<Arc<JobSlot>, JobError> {
        self.jobs
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| JobError::UnknownJob(name.to_string()))
    }

    fn spawn_loop(self: &Arc<Self>, slot: &Arc<JobSlot>) {
        let mut rt = slot.runtime();
        rt.generation += 1;
        let generation = rt.generation;
        rt.loop_started = Instant::now();
        if rt.state.phase != JobPhase::Running {
            rt.state.phase = JobPhase::Scheduled;
        }
        // A previous loop, if any, exits on its own at its next wake-up.
        rt.handle = Some(tokio::spawn(job_loop(Arc::clone(self), Arc::clone(slot), generation)));
    }

    async fn emit(&self, alert: Alert) {
        let subject = alert.subject.id.clone();
        let kind = alert.kind.label();
        let report = self.sink.deliver(alert).await;
        if !report.results.is_empty() && !report.delivered() {
            warn!(job = %subject, kind, error_class = "delivery", "system alert not delivered on any channel");
        }
    }

    async fn run_tick(&self, slot: &JobSlot) -> TickReport {
        let Ok(_flight) = slot.flight.try_lock() else {
            debug!(job = slot.name(), "previous tick still running, skipping");
            return TickReport::Skipped(SkipReason::InFlight);
        };
        {
            let mut rt = slot.runtime();
            if !rt.state.enabled {
                return TickReport::Skipped(SkipReason::Disabled);
            }
            rt.state.phase = JobPhase::Running;
        }

        debug!(job = slot.name(), "tick started");
        let result = slot.job.run().await;
        let saved_at = slot.job.state_saved_at().await;
        let now = self.clock.now();
        let running = self.running.load(Ordering::SeqCst);

        let mut alerts = Vec::new();
        let report = {
            let mut rt = slot.runtime();
            rt.last_tick_at = Some(Instant::now());
            rt.stall_reported = false;
            let st = &mut rt.state;
            st.last_tick = Some(now);
            st.total_runs += 1;
            st.state_saved_at = saved_at;

            match result {
                Ok(outcome) => {
                    match &outcome {
                        JobOutcome::Completed { processed, alerts: fired } => {
                            if st.consecutive_errors > 0 {
                                info!(job = slot.name(), after_errors = st.consecutive_errors, "job recovered");
                            }
                            st.consecutive_errors = 0;
                            st.run_count += 1;
                            st.last_run = Some(now);
                            info!(job = slot.name(), processed, alerts = fired, "tick completed");
                        }
                        JobOutcome::EndedEarly { reason } => {
                            warn!(job = slot.name(), reason = %reason, "tick ended early");
                        }
                    }
                    st.phase = if running { JobPhase::Scheduled } else { JobPhase::Stopped };
                    TickReport::Completed(outcome)
                }
                Err(e) => {
                    let message = e.to_string();
                    st.consecutive_errors += 1;
                    st.run_count = 0;
                    st.last_error = Some(message.clone());
                    st.phase = JobPhase::Failed;
                    let n = st.consecutive_errors;
                    error!(
                        job = slot.name(),
                        error_class = e.class(),
                        error = %e,
                        consecutive_errors = n,
                        "tick failed"
                    );

                    if n == self.settings.warn_after_errors {
                        alerts.push(Alert::system(
                            slot.name(),
                            AlertKind::JobFailing { consecutive_errors: n },
                            format!("{} monitoring is failing", slot.name()),
                            format!("{} consecutive failures. Last error: {}", n, message),
                            Severity::Warning,
                            now,
                        ));
                    }
                    if n >= self.settings.disable_after_errors {
                        st.enabled = false;
                        st.phase = JobPhase::Stopped;
                        st.next_run = None;
                        error!(
                            job = slot.name(),
                            consecutive_errors = n,
                            error_class = "circuit_open",
                            "job disabled until manual restart"
                        );
                        alerts.push(Alert::system(
                            slot.name(),
                            AlertKind::JobDisabled { consecutive_errors: n },
                            format!("{} monitoring disabled", slot.name()),
                            format!(
                                "Stopped after {} consecutive failures; manual restart required. Last error: {}",
                                n, message
                            ),
                            Severity::Critical,
                            now,
                        ));
                    }
                    TickReport::Failed(message)
                }
            }
        };

        for alert in alerts {
            self.emit(alert).await;
        }
        report
    }

    async fn health_check(self: &Arc<Self>) -> Vec<String> {
        if !self.running.load(Ordering::SeqCst) {
            return Vec::new();
        }
        let now = Instant::now();
        let mut stalled = Vec::new();

        for slot in &self.jobs {
            let saved_at = slot.job.state_saved_at().await;
            slot.runtime().state.state_saved_at = saved_at;
            debug!(job = slot.name(), state_saved_at = ?saved_at, "health check");

            let Some(limit) = slot.stale_after() else {
                continue;
            };
            let silent_for = {
                let mut rt = slot.runtime();
                // Breaker-disabled jobs wait for an operator.
                if !rt.state.enabled || rt.stall_reported {
                    continue;
                }
                let reference = rt.last_tick_at.unwrap_or(rt.loop_started + slot.job.warm_up());
                let silent = now.saturating_duration_since(reference);
                if silent <= limit {
                    continue;
                }
                rt.stall_reported = true;
                rt.state.restarts += 1;
                silent
            };

            warn!(
                job = slot.name(),
                stale_secs = silent_for.as_secs(),
                limit_secs = limit.as_secs(),
                error_class = "stalled",
                "job stopped ticking, restarting its loop"
            );
            self.emit(Alert::system(
                slot.name(),
                AlertKind::MonitoringStalled {
                    stale_secs: silent_for.as_secs(),
                },
                format!("{} monitoring stalled", slot.name()),
                format!(
                    "No completed tick for {}s (limit {}s). The job loop was restarted.",
                    silent_for.as_secs(),
                    limit.as_secs()
                ),
                Severity::Warning,
                self.clock.now(),
            ))
            .await;
            self.spawn_loop(slot);
            stalled.push(slot.name().to_string());
        }
        stalled
    }
}

// ── Loops ───────────────────────────────────────────────────────────

/// Computes successive fire times for one job loop.
///
/// [`Pacer::next`] only looks; [`Pacer::fired`] commits a deadline once its
/// tick is due, so a retimed loop can ask again.
enum Pacer {
    Every {
        first: Instant,
        prev: Option<Instant>,
        period: Duration,
    },
    Cron {
        schedule: cron::Schedule,
        offset: FixedOffset,
        last_fire: Option<DateTime<Utc>>,
        not_before: Instant,
    },
}

impl Pacer {
    fn new(schedule: JobSchedule, warm_up: Duration, offset: FixedOffset) -> Self {
        let start = Instant::now() + warm_up;
        match schedule {
            JobSchedule::Interval(period) => Pacer::Every {
                first: start,
                prev: None,
                period: period.max(Duration::from_millis(1)),
            },
            JobSchedule::Cron(schedule) => Pacer::Cron {
                schedule,
                offset,
                last_fire: None,
                not_before: start,
            },
        }
    }

    /// Next deadline, plus its wall-clock time for status reporting.
    fn next(&self, clock: &dyn Clock) -> Option<(Instant, DateTime<Utc>)> {
        let now = Instant::now();
        let wall_now = clock.now();
        match self {
            Pacer::Every { first, prev, period } => {
                let mut at = prev.map_or(*first, |p| p + *period);
                // Missed periods are skipped, not replayed.
                while at < now {
                    at += *period;
                }
                Some((at, wall_now + to_chrono(at.saturating_duration_since(now))))
            }
            Pacer::Cron {
                schedule,
                offset,
                last_fire,
                not_before,
            } => {
                let earliest = wall_now + to_chrono(not_before.saturating_duration_since(now));
                let from = match *last_fire {
                    Some(prev) if prev > earliest => prev,
                    _ => earliest,
                };
                let fire = next_fire(schedule, from, *offset)?;
                let wait = (fire - wall_now).to_std().unwrap_or(Duration::ZERO);
                Some((now + wait, fire))
            }
        }
    }

    fn fired(&mut self, (at, wall): (Instant, DateTime<Utc>)) {
        match self {
            Pacer::Every { prev, .. } => *prev = Some(at),
            Pacer::Cron { last_fire, .. } => *last_fire = Some(wall),
        }
    }

    fn set_period(&mut self, new_period: Duration) {
        if let Pacer::Every { period, .. } = self {
            *period = new_period.max(Duration::from_millis(1));
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

async fn job_loop(inner: Arc<Inner>, slot: Arc<JobSlot>, generation: u64) {
    let mut shutdown = inner.shutdown.subscribe();
    let mut pacer = Pacer::new(slot.schedule(), slot.job.warm_up(), inner.settings.offset);
    debug!(job = slot.name(), generation, "job loop started");

    loop {
        let Some(due @ (deadline, wall)) = pacer.next(inner.clock.as_ref()) else {
            warn!(job = slot.name(), "schedule has no upcoming fire time, loop exiting");
            break;
        };
        {
            let mut rt = slot.runtime();
            if rt.generation != generation || !rt.state.enabled {
                break;
            }
            rt.state.next_run = Some(wall);
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = slot.retimed.notified() => {
                if let JobSchedule::Interval(period) = slot.schedule() {
                    pacer.set_period(period);
                }
                continue;
            }
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() || slot.runtime().generation != generation {
            break;
        }
        pacer.fired(due);
        inner.run_tick(&slot).await;
    }
    debug!(job = slot.name(), generation, "job loop exited");
}

async fn health_loop(inner: Arc<Inner>) {
    let mut shutdown = inner.shutdown.subscribe();
    let period = inner.settings.health_interval.max(Duration::from_secs(1));
    let mut next = Instant::now() + period;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(next) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }
        next += period;
        let stalled = inner.health_check().await;
        if stalled.is_empty() {
            debug!("health check passed");
        }
    }
}
