//! Exchange trading-hours gate.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::Serialize;
use watchdesk_core::config::MarketConfig;

use crate::error::{Result, RuleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Open,
    PreMarket,
    AfterMarket,
    /// Weekend or configured non-trading weekday.
    Closed,
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketStatus::Open => write!(f, "open"),
            MarketStatus::PreMarket => write!(f, "pre_market"),
            MarketStatus::AfterMarket => write!(f, "after_market"),
            MarketStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Trading session in exchange-local time. Open and close are inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketHours {
    open: NaiveTime,
    close: NaiveTime,
    offset: FixedOffset,
    trading_days: Vec<Weekday>,
}

impl MarketHours {
    pub fn new(open: NaiveTime, close: NaiveTime, offset: FixedOffset, trading_days: Vec<Weekday>) -> Result<Self> {
        if open >= close {
            return Err(RuleError::Validation(format!(
                "market open {} must be before close {}",
                open, close
            )));
        }
        if trading_days.is_empty() {
            return Err(RuleError::Validation("at least one trading day is required".into()));
        }
        Ok(Self {
            open,
            close,
            offset,
            trading_days,
        })
    }

    pub fn from_config(cfg: &MarketConfig) -> Result<Self> {
        let parse_time = |label: &str, s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|e| RuleError::Validation(format!("market {} {:?}: {}", label, s, e)))
        };
        let open = parse_time("open", &cfg.open)?;
        let close = parse_time("close", &cfg.close)?;
        let offset = FixedOffset::east_opt(cfg.utc_offset_hours * 3600).ok_or_else(|| {
            RuleError::Validation(format!("utc offset {}h out of range", cfg.utc_offset_hours))
        })?;
        let trading_days = cfg
            .trading_days
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<Weekday>()
                    .map_err(|_| RuleError::Validation(format!("unknown weekday {:?}", s)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(open, close, offset, trading_days)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Exchange-local calendar day of `now`.
    pub fn trading_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    pub fn status(&self, now: DateTime<Utc>) -> MarketStatus {
        let local = now.with_timezone(&self.offset);
        if !self.trading_days.contains(&local.weekday()) {
            return MarketStatus::Closed;
        }
        let t = local.time();
        if t < self.open {
            MarketStatus::PreMarket
        } else if t <= self.close {
            MarketStatus::Open
        } else {
            MarketStatus::AfterMarket
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == MarketStatus::Open
    }

    /// Next session open strictly after `now`, or `now` itself if open.
    pub fn next_open(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_open(now) {
            return Some(now);
        }
        let local = now.with_timezone(&self.offset);
        for days_ahead in 0..=7 {
            let day = local.date_naive() + Duration::days(days_ahead);
            if !self.trading_days.contains(&day.weekday()) {
                continue;
            }
            let candidate = self
                .offset
                .from_local_datetime(&day.and_time(self.open))
                .single()?
                .with_timezone(&Utc);
            if candidate > now {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn krx() -> MarketHours {
        MarketHours::from_config(&MarketConfig::default()).unwrap()
    }

    /// 2026-03-02 is a Monday.
    fn kst(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, day, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn session_boundaries_are_inclusive() {
        let m = krx();
        assert_eq!(m.status(kst(2, 8, 59)), MarketStatus::PreMarket);
        assert_eq!(m.status(kst(2, 9, 0)), MarketStatus::Open);
        assert_eq!(m.status(kst(2, 15, 30)), MarketStatus::Open);
        assert_eq!(m.status(kst(2, 15, 31)), MarketStatus::AfterMarket);
    }

    #[test]
    fn weekend_is_closed() {
        let m = krx();
        assert_eq!(m.status(kst(7, 10, 0)), MarketStatus::Closed);
        assert!(!m.is_open(kst(8, 10, 0)));
    }

    #[test]
    fn next_open_skips_weekend() {
        let m = krx();
        // Friday after close -> Monday 09:00
        assert_eq!(m.next_open(kst(6, 16, 0)), Some(kst(9, 9, 0)));
        // Monday before open -> same day
        assert_eq!(m.next_open(kst(2, 7, 0)), Some(kst(2, 9, 0)));
    }

    #[test]
    fn trading_day_uses_exchange_offset() {
        let m = krx();
        // 2026-03-02 23:30 UTC is 2026-03-03 08:30 KST
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 23, 30, 0).unwrap();
        assert_eq!(m.trading_day(now), NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
    }

    #[test]
    fn rejects_bad_config() {
        let mut cfg = MarketConfig::default();
        cfg.trading_days = "mon,funday".into();
        assert!(MarketHours::from_config(&cfg).is_err());
        let mut cfg = MarketConfig::default();
        cfg.open = "16:00".into();
        assert!(MarketHours::from_config(&cfg).is_err());
    }
}
