//! Monitored securities, price quotes, and fired-band bookkeeping.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default parity bands for convertible instruments, in percent.
pub const DEFAULT_PARITY_BANDS: [u32; 3] = [80, 100, 120];

/// Prefix shared by every daily-scoped band identifier.
pub const DAILY_BAND_PREFIX: &str = "daily_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityCategory {
    /// Plain listed equity.
    #[default]
    Equity,
    /// Convertible / mezzanine instrument tracked against a conversion price.
    Mezzanine,
}

/// A single alert band a security can fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertBand {
    Target(f64),
    StopLoss(f64),
    DailySurge,
    DailyDrop,
    Parity { band: u32, conversion_price: f64 },
}

impl AlertBand {
    /// Identifier stored in [`TriggeredAlertSet`].
    ///
    /// Persistent bands embed their configured level so that a
    /// configuration change produces a fresh identifier.
    pub fn id(&self) -> String {
        match self {
            AlertBand::Target(level) => format!("target@{}", level),
            AlertBand::StopLoss(level) => format!("stop_loss@{}", level),
            AlertBand::DailySurge => format!("{}surge", DAILY_BAND_PREFIX),
            AlertBand::DailyDrop => format!("{}drop", DAILY_BAND_PREFIX),
            AlertBand::Parity { band, conversion_price } => {
                format!("parity_{}@{}", band, conversion_price)
            }
        }
    }

    pub fn is_daily(&self) -> bool {
        matches!(self, AlertBand::DailySurge | AlertBand::DailyDrop)
    }
}

/// Band identifiers that already fired for one security.
///
/// Serialized as a sorted list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggeredAlertSet(BTreeSet<String>);

impl TriggeredAlertSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    /// Drop daily-scoped identifiers; returns how many were removed.
    pub fn clear_daily(&mut self) -> usize {
        let before = self.0.len();
        self.0.retain(|id| !id.starts_with(DAILY_BAND_PREFIX));
        before - self.0.len()
    }

    /// Keep daily identifiers plus any persistent identifier in `current`.
    pub fn retain_persistent(&mut self, current: &BTreeSet<String>) -> usize {
        let before = self.0.len();
        self.0
            .retain(|id| id.starts_with(DAILY_BAND_PREFIX) || current.contains(id));
        before - self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for TriggeredAlertSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A price observation for one security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub code: String,
    pub price: f64,
    /// Change versus previous close, in percent.
    pub change_percent: f64,
    pub as_of: DateTime<Utc>,
    /// Which upstream answered (informational only).
    #[serde(default)]
    pub source: String,
}

fn default_true() -> bool {
    true
}

fn default_surge() -> f64 {
    5.0
}

fn default_drop() -> f64 {
    -5.0
}

fn default_parity_bands() -> Vec<u32> {
    DEFAULT_PARITY_BANDS.to_vec()
}

/// A security under price monitoring, with its configuration and the
/// runtime fields the threshold engine maintains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredSecurity {
    #[serde(default)]
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub category: SecurityCategory,
    #[serde(default)]
    pub acquisition_price: Option<f64>,
    #[serde(default)]
    pub target_price: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default = "default_surge")]
    pub daily_surge_threshold: f64,
    #[serde(default = "default_drop")]
    pub daily_drop_threshold: f64,
    #[serde(default = "default_true")]
    pub daily_alerts_enabled: bool,
    #[serde(default)]
    pub conversion_price: Option<f64>,
    #[serde(default = "default_parity_bands")]
    pub parity_bands: Vec<u32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub triggered_alerts: TriggeredAlertSet,

    // ── runtime ──
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub change_percent: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Exchange-local trading day the daily bands belong to.
    #[serde(default)]
    pub trading_day: Option<NaiveDate>,
    #[serde(default)]
    pub profit_loss_rate: Option<f64>,
    #[serde(default)]
    pub parity: Option<f64>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl MonitoredSecurity {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            category: SecurityCategory::Equity,
            acquisition_price: None,
            target_price: None,
            stop_loss: None,
            daily_surge_threshold: default_surge(),
            daily_drop_threshold: default_drop(),
            daily_alerts_enabled: true,
            conversion_price: None,
            parity_bands: default_parity_bands(),
            enabled: true,
            triggered_alerts: TriggeredAlertSet::new(),
            current_price: None,
            change_percent: None,
            last_updated: None,
            trading_day: None,
            profit_loss_rate: None,
            parity: None,
            last_error: None,
        }
    }

    /// Configuration checks applied at the configuration boundary.
    pub fn validate(&self) -> Result<(), CoreError> {
        let bad = |msg: String| Err(CoreError::Config(format!("{}: {}", self.code, msg)));
        if self.code.trim().is_empty() {
            return Err(CoreError::Config("security code is empty".into()));
        }
        for (label, value) in [
            ("acquisition_price", self.acquisition_price),
            ("target_price", self.target_price),
            ("stop_loss", self.stop_loss),
            ("conversion_price", self.conversion_price),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return bad(format!("{} must be a positive number, got {}", label, v));
                }
            }
        }
        if let (Some(target), Some(stop)) = (self.target_price, self.stop_loss) {
            if stop >= target {
                return bad(format!("stop_loss {} must be below target_price {}", stop, target));
            }
        }
        if self.daily_surge_threshold <= 0.0 {
            return bad("daily_surge_threshold must be positive".into());
        }
        if self.daily_drop_threshold >= 0.0 {
            return bad("daily_drop_threshold must be negative".into());
        }
        if self.category == SecurityCategory::Mezzanine {
            if self.conversion_price.is_none() {
                return bad("mezzanine securities need a conversion_price".into());
            }
            if self.parity_bands.iter().any(|b| *b == 0) {
                return bad("parity bands must be > 0".into());
            }
        }
        Ok(())
    }

    /// Persistent bands implied by the current configuration.
    pub fn persistent_bands(&self) -> Vec<AlertBand> {
        let mut bands = Vec::new();
        if let Some(target) = self.target_price {
            bands.push(AlertBand::Target(target));
        }
        if let Some(stop) = self.stop_loss {
            bands.push(AlertBand::StopLoss(stop));
        }
        if self.category == SecurityCategory::Mezzanine {
            if let Some(conversion_price) = self.conversion_price {
                for band in &self.parity_bands {
                    bands.push(AlertBand::Parity {
                        band: *band,
                        conversion_price,
                    });
                }
            }
        }
        bands
    }

    /// Parity of `price` against the conversion price, in percent.
    pub fn parity_at(&self, price: f64) -> Option<f64> {
        match (self.category, self.conversion_price) {
            (SecurityCategory::Mezzanine, Some(cp)) if cp > 0.0 => Some(price / cp * 100.0),
            _ => None,
        }
    }

    /// Overwrite runtime fields from an accepted quote.
    pub fn record_quote(&mut self, quote: &PriceQuote) {
        self.current_price = Some(quote.price);
        self.change_percent = Some(quote.change_percent);
        self.last_updated = Some(quote.as_of);
        self.last_error = None;
        self.profit_loss_rate = self
            .acquisition_price
            .filter(|p| *p > 0.0)
            .map(|p| round2((quote.price - p) / p * 100.0));
        self.parity = self.parity_at(quote.price).map(round2);
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
