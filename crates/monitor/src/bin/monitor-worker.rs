//! monitor-worker: runs the disclosure, price and daily-reset jobs under
//! the supervisor until SIGINT/SIGTERM.
//!
//! Configuration comes from the environment (`.env` is loaded first); see
//! `watchdesk_core::config` for the keys. Jobs whose upstream is not
//! configured are left out with a warning.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use watchdesk_connector::{DartClient, FallbackPriceSource, JsonQuoteClient, PriceSource, RetryPolicy};
use watchdesk_core::config::{load_dotenv, Config};
use watchdesk_core::{Clock, FilingFilters, SystemClock};
use watchdesk_monitor::{
    DailyResetJob, DisclosureJob, JobTiming, MonitorJob, PriceJob, Supervisor, SupervisorSettings,
};
use watchdesk_notify::{AlertSink, Dispatcher, EmailNotifier, PushChannel, TemplateRenderer};
use watchdesk_rules::{MarketHours, RulesLoader, ThresholdEngine};
use watchdesk_storage::{ProcessedIdStore, SecurityStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Filing and price monitoring worker.
#[derive(Parser, Debug)]
#[command(name = "monitor-worker", version, about)]
struct Cli {
    /// YAML watch rules (overrides RULES_FILE).
    #[arg(long, env = "RULES_FILE")]
    rules: Option<PathBuf>,

    /// Monitored securities JSON (overrides SECURITIES_FILE).
    #[arg(long, env = "SECURITIES_FILE")]
    securities: Option<PathBuf>,

    /// Processed filing id registry (overrides PROCESSED_IDS_FILE).
    #[arg(long, env = "PROCESSED_IDS_FILE")]
    processed_ids: Option<PathBuf>,

    /// Also fetch filings from this many days before today.
    #[arg(long, env = "DISCLOSURE_LOOKBACK_DAYS", default_value_t = 0)]
    lookback_days: u32,

    /// Restrict filings to one market class (Y, K, N or E).
    #[arg(long, env = "DART_CORP_CLS")]
    market_class: Option<String>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_filter: String,

    /// Validate configuration and rules, print a redacted summary, and exit.
    #[arg(long)]
    check_config: bool,

    /// Send a test alert through every configured channel and exit.
    #[arg(long)]
    test_notify: bool,

    /// Run a single tick of the named job and exit.
    #[arg(long, value_name = "JOB")]
    once: Option<String>,
}

// ── Main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_filter)),
        )
        .init();

    load_dotenv();
    let mut config = Config::from_env();
    if let Some(path) = &cli.rules {
        config.storage.rules_file = path.clone();
    }
    if let Some(path) = &cli.securities {
        config.storage.securities_file = path.clone();
    }
    if let Some(path) = &cli.processed_ids {
        config.storage.processed_ids_file = path.clone();
    }
    config.validate().context("invalid configuration")?;
    config.log_summary();

    let market = MarketHours::from_config(&config.market).context("invalid market hours")?;
    let exchange_offset = market.offset();
    let engine = ThresholdEngine::new(market);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut rules = RulesLoader::open(&config.storage.rules_file).with_context(|| {
        format!(
            "cannot load watch rules from {} (start from data/rules.example.yml)",
            config.storage.rules_file.display()
        )
    })?;

    if cli.check_config {
        println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
        let current = rules.current();
        println!(
            "rules: {} keywords, {} exclusions, {} watched issuers",
            current.keywords.len(),
            current.exclusions.len(),
            current.watched_issuers.len()
        );
        return Ok(());
    }

    // ── Alert sink ──────────────────────────────────────────────────
    let push = Arc::new(PushChannel::default());
    let mut dispatcher = Dispatcher::empty().with_clock(Arc::clone(&clock));
    dispatcher.add_channel(push.clone());
    if config.smtp.is_configured() {
        let renderer = TemplateRenderer::new().with_display_offset(exchange_offset);
        let email = EmailNotifier::from_config(&config.smtp, renderer).context("invalid SMTP settings")?;
        info!(recipients = email.recipients(), "email channel enabled");
        dispatcher.add_channel(Arc::new(email));
    } else {
        warn!("SMTP not configured, email alerts disabled");
    }

    if cli.test_notify {
        let mut failed = 0;
        for (idx, name) in dispatcher.channel_names().iter().enumerate() {
            match dispatcher.test_notify(idx).await {
                Ok(()) => info!(channel = %name, "test notification sent"),
                Err(e) => {
                    failed += 1;
                    warn!(channel = %name, error = %e, error_class = e.class(), "test notification failed");
                }
            }
        }
        if failed > 0 {
            bail!("{} channel(s) failed the test notification", failed);
        }
        return Ok(());
    }

    spawn_push_logger(&push);
    let sink: Arc<dyn AlertSink> = Arc::new(dispatcher);

    // ── Stores and jobs ─────────────────────────────────────────────
    rules.watch().context("cannot watch rules file")?;
    let rules = Arc::new(rules);
    let registry = Arc::new(ProcessedIdStore::open(
        &config.storage.processed_ids_file,
        config.storage.processed_ids_cap,
    ));
    let securities = Arc::new(SecurityStore::open(&config.storage.securities_file));
    let retry = RetryPolicy::from_config(&config.retry);

    let mut jobs: Vec<Arc<dyn MonitorJob>> = Vec::new();

    if config.filing_api.is_configured() {
        let source = DartClient::from_config(&config.filing_api).context("invalid filing API settings")?;
        jobs.push(Arc::new(DisclosureJob::new(
            Arc::new(source),
            retry.clone(),
            Arc::clone(&rules),
            registry,
            Arc::clone(&sink),
            Arc::clone(&clock),
            exchange_offset,
            JobTiming::disclosure(&config.schedule),
        )
        .with_filters(FilingFilters {
            market_class: cli.market_class.clone(),
            ..FilingFilters::default()
        })
        .with_lookback_days(cli.lookback_days)));
    } else {
        warn!("DART_API_KEY not set, disclosure monitoring disabled");
    }

    match build_price_source(&config)? {
        Some(source) => jobs.push(Arc::new(PriceJob::new(
            source,
            retry,
            Arc::clone(&securities),
            engine.clone(),
            Arc::clone(&sink),
            Arc::clone(&clock),
            JobTiming::price(&config.schedule),
        ))),
        None => warn!("QUOTE_PRIMARY_URL not set, price monitoring disabled"),
    }

    jobs.push(Arc::new(
        DailyResetJob::new(securities, engine, Arc::clone(&clock), &config.schedule.daily_reset_cron)
            .context("invalid DAILY_RESET_CRON")?,
    ));

    let supervisor = Supervisor::with_clock(SupervisorSettings::from_config(&config), sink, clock, jobs);

    if let Some(name) = cli.once {
        let report = supervisor.trigger(&name).await?;
        info!(job = %name, report = ?report, "single tick finished");
        if let Some(status) = supervisor.job_status(&name) {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        return Ok(());
    }

    supervisor.start().await?;
    info!(utc_offset = %exchange_offset, "monitor-worker running, press Ctrl-C to stop");

    shutdown_signal().await;
    info!("shutdown signal received");
    supervisor.stop().await;
    info!("monitor-worker stopped");
    Ok(())
}

/// Primary quote source, wrapped with the fallback when one is configured.
fn build_price_source(config: &Config) -> anyhow::Result<Option<Arc<dyn PriceSource>>> {
    let Some(primary_url) = &config.quote_api.primary_url else {
        return Ok(None);
    };
    let timeout = Duration::from_secs(config.quote_api.timeout_secs.max(1));
    let primary: Arc<dyn PriceSource> = Arc::new(
        JsonQuoteClient::new("primary", primary_url.as_str(), timeout).context("invalid QUOTE_PRIMARY_URL")?,
    );
    let fallback = match &config.quote_api.fallback_url {
        Some(url) => Some(Arc::new(
            JsonQuoteClient::new("fallback", url.as_str(), timeout).context("invalid QUOTE_FALLBACK_URL")?,
        ) as Arc<dyn PriceSource>),
        None => None,
    };
    Ok(Some(Arc::new(FallbackPriceSource::new(primary, fallback))))
}

/// Log every push event at debug level so the live feed is visible
/// without a dashboard attached.
fn spawn_push_logger(push: &PushChannel) {
    let mut rx = push.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(event_type = %event.event_type, at = %event.timestamp, "push event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "push logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl-c");
    }
}
