//! Cron expression helpers for exchange-local schedules.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule;

use crate::error::{Result, RuleError};

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Parse a 5- or 6-field cron expression.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    Schedule::from_str(&normalize_cron(expr)).map_err(|e| RuleError::Cron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// First tick strictly after `after`, evaluated in the `offset` timezone.
pub fn next_fire(schedule: &Schedule, after: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&offset))
        .next()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn normalizes_five_fields() {
        assert_eq!(normalize_cron("0 0 * * *"), "0 0 0 * * *");
        assert_eq!(normalize_cron(" 0 0 0 * * * "), "0 0 0 * * *");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_cron("every day"), Err(RuleError::Cron { .. })));
    }

    #[test]
    fn midnight_is_exchange_local() {
        let s = parse_cron("0 0 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        // 00:00 KST on 2026-03-03 is 15:00 UTC on 2026-03-02
        assert_eq!(
            next_fire(&s, after, kst()),
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap())
        );
    }
}
