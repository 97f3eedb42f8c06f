//! Edge-triggered price threshold evaluation.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};
use watchdesk_core::{
    Alert, AlertBand, AlertKind, AlertSource, AlertSubject, MonitoredSecurity, PriceQuote, Severity,
};

use crate::market::MarketHours;

/// Detects level crossings for monitored securities.
///
/// Persistent bands (target, stop loss, parity) compare the stored previous
/// price against the new quote and fire only on the transition. Daily bands
/// fire at most once per exchange-local trading day.
#[derive(Debug, Clone)]
pub struct ThresholdEngine {
    market: MarketHours,
}

impl ThresholdEngine {
    pub fn new(market: MarketHours) -> Self {
        Self { market }
    }

    pub fn market(&self) -> &MarketHours {
        &self.market
    }

    /// Evaluate one quote against one security, mutating its runtime fields
    /// and fired-band set. Returns the alerts that fired.
    ///
    /// Outside market hours the quote is ignored entirely.
    pub fn evaluate(
        &self,
        security: &mut MonitoredSecurity,
        quote: &PriceQuote,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        if !self.market.is_open(now) {
            debug!(entity = %security.code, status = %self.market.status(now), "market closed, quote ignored");
            return Vec::new();
        }
        if quote.code != security.code {
            warn!(
                entity = %security.code,
                quote_code = %quote.code,
                error_class = "malformed_record",
                "quote does not belong to security"
            );
            return Vec::new();
        }
        if !quote.price.is_finite() || quote.price <= 0.0 || !quote.change_percent.is_finite() {
            warn!(
                entity = %security.code,
                price = quote.price,
                error_class = "malformed_record",
                "ignoring unusable quote"
            );
            return Vec::new();
        }

        self.roll_trading_day(security, now);
        prune_stale_ids(security);

        let mut fired: Vec<(AlertBand, Alert)> = Vec::new();

        match security.current_price {
            Some(prev) => self.check_persistent(security, prev, quote, now, &mut fired),
            None => debug!(entity = %security.code, price = quote.price, "first observation, recording only"),
        }
        if security.daily_alerts_enabled {
            self.check_daily(security, quote, now, &mut fired);
        }

        let mut alerts = Vec::with_capacity(fired.len());
        for (band, alert) in fired {
            let id = band.id();
            if security.triggered_alerts.insert(id.clone()) {
                debug!(entity = %security.code, band = %id, "band fired");
                alerts.push(alert);
            } else {
                debug!(entity = %security.code, band = %id, "band already fired, suppressed");
            }
        }

        security.record_quote(quote);
        alerts
    }

    /// Clear daily-scoped ids and stamp `day` as the current trading day.
    pub fn reset_daily(&self, security: &mut MonitoredSecurity, day: NaiveDate) -> usize {
        security.trading_day = Some(day);
        security.triggered_alerts.clear_daily()
    }

    fn roll_trading_day(&self, security: &mut MonitoredSecurity, now: DateTime<Utc>) {
        let today = self.market.trading_day(now);
        if security.trading_day != Some(today) {
            let cleared = self.reset_daily(security, today);
            if cleared > 0 {
                debug!(entity = %security.code, cleared, %today, "new trading day, daily bands re-armed");
            }
        }
    }

    fn check_persistent(
        &self,
        security: &MonitoredSecurity,
        prev: f64,
        quote: &PriceQuote,
        now: DateTime<Utc>,
        fired: &mut Vec<(AlertBand, Alert)>,
    ) {
        let price = quote.price;

        if let Some(target) = security.target_price {
            if prev < target && price >= target {
                let alert = price_alert(
                    security,
                    AlertKind::TargetReached { target, price },
                    format!("{} reached target {}", security.name, target),
                    format!(
                        "{} ({}) rose from {} to {}, at or above the target price {}.",
                        security.name, security.code, prev, price, target
                    ),
                    Severity::Warning,
                    now,
                );
                fired.push((AlertBand::Target(target), alert));
            }
        }

        if let Some(stop_loss) = security.stop_loss {
            if prev > stop_loss && price <= stop_loss {
                let alert = price_alert(
                    security,
                    AlertKind::StopLoss { stop_loss, price },
                    format!("{} hit stop loss {}", security.name, stop_loss),
                    format!(
                        "{} ({}) fell from {} to {}, at or below the stop-loss price {}.",
                        security.name, security.code, prev, price, stop_loss
                    ),
                    Severity::Critical,
                    now,
                );
                fired.push((AlertBand::StopLoss(stop_loss), alert));
            }
        }

        let (Some(conversion_price), Some(prev_parity), Some(parity)) = (
            security.conversion_price,
            security.parity_at(prev),
            security.parity_at(price),
        ) else {
            return;
        };
        for band in &security.parity_bands {
            let level = f64::from(*band);
            if prev_parity < level && parity >= level {
                let alert = price_alert(
                    security,
                    AlertKind::Parity {
                        band: *band,
                        parity,
                        conversion_price,
                    },
                    format!("{} parity crossed {}%", security.name, band),
                    format!(
                        "{} ({}) parity is {:.2}% at price {} (conversion price {}).",
                        security.name, security.code, parity, price, conversion_price
                    ),
                    Severity::Info,
                    now,
                );
                fired.push((
                    AlertBand::Parity {
                        band: *band,
                        conversion_price,
                    },
                    alert,
                ));
            }
        }
    }

    fn check_daily(
        &self,
        security: &MonitoredSecurity,
        quote: &PriceQuote,
        now: DateTime<Utc>,
        fired: &mut Vec<(AlertBand, Alert)>,
    ) {
        let change = quote.change_percent;

        if change >= security.daily_surge_threshold {
            let threshold = security.daily_surge_threshold;
            let alert = price_alert(
                security,
                AlertKind::DailySurge {
                    change_percent: change,
                    threshold,
                },
                format!("{} up {:.2}% today", security.name, change),
                format!(
                    "{} ({}) is up {:.2}% on the day at {} (threshold +{}%).",
                    security.name, security.code, change, quote.price, threshold
                ),
                Severity::Warning,
                now,
            );
            fired.push((AlertBand::DailySurge, alert));
        }

        if change <= security.daily_drop_threshold {
            let threshold = security.daily_drop_threshold;
            let alert = price_alert(
                security,
                AlertKind::DailyDrop {
                    change_percent: change,
                    threshold,
                },
                format!("{} down {:.2}% today", security.name, change),
                format!(
                    "{} ({}) is down {:.2}% on the day at {} (threshold {}%).",
                    security.name, security.code, change, quote.price, threshold
                ),
                Severity::Warning,
                now,
            );
            fired.push((AlertBand::DailyDrop, alert));
        }
    }
}

/// Drop persistent ids whose configured level no longer exists.
fn prune_stale_ids(security: &mut MonitoredSecurity) {
    let current: BTreeSet<String> = security.persistent_bands().iter().map(AlertBand::id).collect();
    let pruned = security.triggered_alerts.retain_persistent(&current);
    if pruned > 0 {
        debug!(entity = %security.code, pruned, "pruned ids for changed configuration");
    }
}

fn price_alert(
    security: &MonitoredSecurity,
    kind: AlertKind,
    title: String,
    message: String,
    severity: Severity,
    now: DateTime<Utc>,
) -> Alert {
    Alert::new(
        AlertSource::Price,
        kind,
        AlertSubject {
            id: security.code.clone(),
            name: security.name.clone(),
        },
        title,
        message,
        severity,
        now,
    )
}
