use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_i32(profile: &str, key: &str, default: i32) -> i32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_list(profile: &str, key: &str) -> Vec<String> {
    profiled_env_opt(profile, key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub storage: StorageConfig,
    pub smtp: SmtpConfig,
    pub filing_api: FilingApiConfig,
    pub quote_api: QuoteApiConfig,
    pub market: MarketConfig,
    pub schedule: ScheduleConfig,
    pub supervisor: SupervisorConfig,
    pub retry: RetryConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `WATCHDESK_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("WATCHDESK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            storage: StorageConfig::from_env_profiled(p),
            smtp: SmtpConfig::from_env_profiled(p),
            filing_api: FilingApiConfig::from_env_profiled(p),
            quote_api: QuoteApiConfig::from_env_profiled(p),
            market: MarketConfig::from_env_profiled(p),
            schedule: ScheduleConfig::from_env_profiled(p),
            supervisor: SupervisorConfig::from_env_profiled(p),
            retry: RetryConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values the monitoring core cannot run with.
    ///
    /// Called once at startup; evaluators never see an unvalidated config.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.storage.processed_ids_cap == 0 {
            return Err(CoreError::Config("PROCESSED_IDS_CAP must be > 0".into()));
        }
        if self.schedule.disclosure_interval_secs == 0 || self.schedule.price_interval_secs == 0 {
            return Err(CoreError::Config("job intervals must be > 0 seconds".into()));
        }
        if self.schedule.health_interval_secs == 0 {
            return Err(CoreError::Config("HEALTH_INTERVAL_SECS must be > 0".into()));
        }
        if self.schedule.disclosure_stale_multiple < 2 || self.schedule.price_stale_multiple < 2 {
            return Err(CoreError::Config("stale multiples must be >= 2".into()));
        }
        if self.supervisor.warn_after_errors == 0
            || self.supervisor.disable_after_errors < self.supervisor.warn_after_errors
        {
            return Err(CoreError::Config(format!(
                "supervisor thresholds must satisfy 0 < warn ({}) <= disable ({})",
                self.supervisor.warn_after_errors, self.supervisor.disable_after_errors
            )));
        }
        for url in [&self.quote_api.primary_url, &self.quote_api.fallback_url].into_iter().flatten() {
            if !url.contains("{code}") {
                return Err(CoreError::Config(format!("quote URL {} lacks a {{code}} placeholder", url)));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(CoreError::Config("RETRY_MAX_ATTEMPTS must be >= 1".into()));
        }
        if !(-12..=14).contains(&self.market.utc_offset_hours) {
            return Err(CoreError::Config(format!(
                "MARKET_UTC_OFFSET_HOURS out of range: {}",
                self.market.utc_offset_hours
            )));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  storage:     data_dir={}, cap={}", self.storage.data_dir.display(), self.storage.processed_ids_cap);
        tracing::info!("  smtp:        host={}, recipients={}", self.smtp.host.as_deref().unwrap_or("(none)"), self.smtp.to.len());
        tracing::info!("  filing_api:  base_url={}, key={}", self.filing_api.base_url, if self.filing_api.api_key.is_some() { "set" } else { "(none)" });
        tracing::info!(
            "  quote_api:   primary={}, fallback={}",
            self.quote_api.primary_url.as_deref().unwrap_or("(none)"),
            self.quote_api.fallback_url.as_deref().unwrap_or("(none)")
        );
        tracing::info!("  market:      {}-{} UTC{:+} days={}", self.market.open, self.market.close, self.market.utc_offset_hours, self.market.trading_days);
        tracing::info!(
            "  schedule:    disclosure={}s price={}s health={}s",
            self.schedule.disclosure_interval_secs,
            self.schedule.price_interval_secs,
            self.schedule.health_interval_secs
        );
        tracing::info!("  supervisor:  warn={} disable={}", self.supervisor.warn_after_errors, self.supervisor.disable_after_errors);
    }

    /// Return a redacted view safe for status output (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "storage": {
                "data_dir": self.storage.data_dir,
                "processed_ids_cap": self.storage.processed_ids_cap,
            },
            "smtp": {
                "host": self.smtp.host,
                "port": self.smtp.port,
                "configured": self.smtp.is_configured(),
            },
            "filing_api": {
                "base_url": self.filing_api.base_url,
                "configured": self.filing_api.is_configured(),
            },
            "quote_api": {
                "primary_configured": self.quote_api.primary_url.is_some(),
                "fallback_configured": self.quote_api.fallback_url.is_some(),
            },
            "market": {
                "open": self.market.open,
                "close": self.market.close,
                "utc_offset_hours": self.market.utc_offset_hours,
                "trading_days": self.market.trading_days,
            },
            "schedule": self.schedule,
            "supervisor": self.supervisor,
        })
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Line-oriented registry of already-evaluated filing ids.
    pub processed_ids_file: PathBuf,
    /// JSON records of monitored securities keyed by code.
    pub securities_file: PathBuf,
    /// YAML operator rules (keywords, exclusions, tiers).
    pub rules_file: PathBuf,
    pub processed_ids_cap: usize,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        let data_dir = PathBuf::from(profiled_env_or(p, "DATA_DIR", "data"));
        let processed_ids_file = profiled_env_opt(p, "PROCESSED_IDS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("processed_ids.txt"));
        let securities_file = profiled_env_opt(p, "SECURITIES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("monitoring_stocks.json"));
        let rules_file = profiled_env_opt(p, "RULES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("rules.yml"));
        Self {
            data_dir,
            processed_ids_file,
            securities_file,
            rules_file,
            processed_ids_cap: profiled_env_u64(p, "PROCESSED_IDS_CAP", 1000) as usize,
        }
    }
}

// ── SMTP ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub tls: bool,
    pub from: Option<String>,
    pub to: Vec<String>,
}

impl SmtpConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_opt(p, "SMTP_HOST"),
            port: profiled_env_u16(p, "SMTP_PORT", 587),
            tls: profiled_env_or(p, "SMTP_TLS", "true") == "true",
            from: profiled_env_opt(p, "EMAIL_SENDER"),
            to: profiled_env_list(p, "EMAIL_RECEIVERS"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.from.is_some() && !self.to.is_empty()
    }
}

// ── Filing API ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub page_count: u32,
}

impl FilingApiConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_url: profiled_env_or(p, "DART_BASE_URL", "https://opendart.fss.or.kr/api"),
            api_key: profiled_env_opt(p, "DART_API_KEY"),
            timeout_secs: profiled_env_u64(p, "DART_TIMEOUT_SECS", 30),
            page_count: profiled_env_u32(p, "DART_PAGE_COUNT", 100),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

// ── Quote API ─────────────────────────────────────────────────

/// Price quote endpoints. `{code}` in a URL is replaced with the security code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteApiConfig {
    pub primary_url: Option<String>,
    pub fallback_url: Option<String>,
    pub timeout_secs: u64,
}

impl QuoteApiConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            primary_url: profiled_env_opt(p, "QUOTE_PRIMARY_URL"),
            fallback_url: profiled_env_opt(p, "QUOTE_FALLBACK_URL"),
            timeout_secs: profiled_env_u64(p, "QUOTE_TIMEOUT_SECS", 10),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.primary_url.is_some()
    }
}

// ── Market hours ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Exchange-local open time, `HH:MM`.
    pub open: String,
    /// Exchange-local close time, `HH:MM` (inclusive).
    pub close: String,
    /// Exchange offset from UTC in whole hours.
    pub utc_offset_hours: i32,
    /// Comma-separated weekday names, e.g. `mon,tue,wed,thu,fri`.
    pub trading_days: String,
}

impl MarketConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            open: profiled_env_or(p, "MARKET_OPEN", "09:00"),
            close: profiled_env_or(p, "MARKET_CLOSE", "15:30"),
            utc_offset_hours: profiled_env_i32(p, "MARKET_UTC_OFFSET_HOURS", 9),
            trading_days: profiled_env_or(p, "MARKET_TRADING_DAYS", "mon,tue,wed,thu,fri"),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            open: "09:00".into(),
            close: "15:30".into(),
            utc_offset_hours: 9,
            trading_days: "mon,tue,wed,thu,fri".into(),
        }
    }
}

// ── Schedule ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub disclosure_interval_secs: u64,
    pub disclosure_warmup_secs: u64,
    pub disclosure_stale_multiple: u32,
    pub price_interval_secs: u64,
    pub price_warmup_secs: u64,
    pub price_stale_multiple: u32,
    pub health_interval_secs: u64,
    /// 5-field cron, exchange-local time.
    pub daily_reset_cron: String,
}

impl ScheduleConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            disclosure_interval_secs: profiled_env_u64(p, "DART_CHECK_INTERVAL", 1800),
            disclosure_warmup_secs: profiled_env_u64(p, "DART_WARMUP_SECS", 60),
            disclosure_stale_multiple: profiled_env_u32(p, "DART_STALE_MULTIPLE", 2),
            price_interval_secs: profiled_env_u64(p, "STOCK_CHECK_INTERVAL", 10),
            price_warmup_secs: profiled_env_u64(p, "STOCK_WARMUP_SECS", 30),
            price_stale_multiple: profiled_env_u32(p, "STOCK_STALE_MULTIPLE", 3),
            health_interval_secs: profiled_env_u64(p, "HEALTH_INTERVAL_SECS", 300),
            daily_reset_cron: profiled_env_or(p, "DAILY_RESET_CRON", "0 0 * * *"),
        }
    }
}

// ── Supervisor ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Consecutive failures that raise an operator warning.
    pub warn_after_errors: u32,
    /// Consecutive failures that disable the job until manual restart.
    pub disable_after_errors: u32,
}

impl SupervisorConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            warn_after_errors: profiled_env_u32(p, "SUPERVISOR_WARN_AFTER", 5),
            disable_after_errors: profiled_env_u32(p, "SUPERVISOR_DISABLE_AFTER", 10),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            warn_after_errors: 5,
            disable_after_errors: 10,
        }
    }
}

// ── Retry ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound for a single external call.
    pub attempt_timeout_secs: u64,
}

impl RetryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_attempts: profiled_env_u32(p, "RETRY_MAX_ATTEMPTS", 3),
            base_delay_ms: profiled_env_u64(p, "RETRY_BASE_DELAY_MS", 1000),
            max_delay_ms: profiled_env_u64(p, "RETRY_MAX_DELAY_MS", 10_000),
            attempt_timeout_secs: profiled_env_u64(p, "RETRY_ATTEMPT_TIMEOUT_SECS", 30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config::for_profile("WATCHDESK_TEST_UNSET")
    }

    #[test]
    fn defaults_validate() {
        let cfg = base();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.supervisor.warn_after_errors, 5);
        assert_eq!(cfg.supervisor.disable_after_errors, 10);
        assert_eq!(cfg.storage.processed_ids_cap, 1000);
    }

    #[test]
    fn profile_label_defaults() {
        let cfg = Config::for_profile("");
        assert_eq!(cfg.profile_label(), "default");
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut cfg = base();
        cfg.supervisor.warn_after_errors = 10;
        cfg.supervisor.disable_after_errors = 5;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("warn"), "got: {err}");
    }

    #[test]
    fn rejects_zero_cap() {
        let mut cfg = base();
        cfg.storage.processed_ids_cap = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_low_stale_multiple() {
        let mut cfg = base();
        cfg.schedule.price_stale_multiple = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn quote_url_needs_code_placeholder() {
        let mut cfg = base();
        cfg.quote_api.primary_url = Some("https://quotes.example.com/latest".into());
        assert!(cfg.validate().is_err());
        cfg.quote_api.primary_url = Some("https://quotes.example.com/{code}".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn redacted_summary_hides_api_key() {
        let mut cfg = base();
        cfg.filing_api.api_key = Some("secret-key".into());
        let json = cfg.redacted_summary().to_string();
        assert!(!json.contains("secret-key"));
        assert!(json.contains("\"configured\":true"));
    }
}
