//! End-to-end evaluator scenarios against the shipped example rules.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use watchdesk_core::config::MarketConfig;
use watchdesk_core::{FilingRecord, MonitoredSecurity, PriceQuote, Severity};
use watchdesk_rules::{DisclosureMatcher, MarketHours, MatchRules, ThresholdEngine};
use watchdesk_storage::ProcessedFilingRegistry;

/// Resolve the data directory relative to the workspace root.
fn data_dir() -> std::path::PathBuf {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../data")
}

fn example_rules() -> MatchRules {
    let path = data_dir().join("rules.example.yml");
    let yaml = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    MatchRules::from_yaml_str(&yaml).unwrap()
}

fn filing(id: &str, code: &str, title: &str) -> FilingRecord {
    FilingRecord::new(id, "Issuer", code, title, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
}

fn session(day: i64, hour: u32) -> DateTime<Utc> {
    FixedOffset::east_opt(9 * 3600)
        .unwrap()
        .with_ymd_and_hms(2026, 3, 2, hour, 0, 0)
        .unwrap()
        .with_timezone(&Utc)
        + Duration::days(day)
}

#[test]
fn example_rules_validate() {
    let rules = example_rules();
    assert!(rules.keywords.contains(&"합병".to_string()));
    assert_eq!(rules.and_groups.len(), 2);
}

#[test]
fn ir_announcement_is_excluded_even_with_keyword() {
    let rules = example_rules();
    let mut reg = ProcessedFilingRegistry::default();
    let batch = vec![filing("1", "000001", "기업설명회(IR) 개최 - 합병 관련")];
    assert!(DisclosureMatcher::new()
        .evaluate(&batch, &rules, &mut reg, Utc::now())
        .is_empty());
}

#[test]
fn distinguished_issuer_merger_is_critical_and_first() {
    let rules = example_rules();
    let mut reg = ProcessedFilingRegistry::default();
    let batch = vec![
        filing("1", "000001", "소송 등의 제기"),
        filing("2", "005930", "회사합병 결정"),
        filing("3", "000002", "전환가액의 조정"),
    ];
    let alerts = DisclosureMatcher::new().evaluate(&batch, &rules, &mut reg, Utc::now());
    assert_eq!(alerts.len(), 3);
    // 1 keyword + 3 tier + 5 issuer
    assert_eq!(alerts[0].subject.id, "2");
    assert_eq!(alerts[0].priority, 9);
    assert_eq!(alerts[0].severity, Severity::Warning);
    // AND-group only match scores zero keyword points
    assert_eq!(alerts.last().map(|a| a.subject.id.as_str()), Some("3"));
}

#[test]
fn daily_surge_rearms_on_next_trading_day() {
    let engine = ThresholdEngine::new(MarketHours::from_config(&MarketConfig::default()).unwrap());
    let mut s = MonitoredSecurity::new("ABC", "Abc");
    let quote = |price: f64, change: f64| PriceQuote {
        code: "ABC".into(),
        price,
        change_percent: change,
        as_of: Utc::now(),
        source: "test".into(),
    };

    assert_eq!(engine.evaluate(&mut s, &quote(100.0, 5.5), session(0, 10)).len(), 1);
    assert!(engine.evaluate(&mut s, &quote(101.0, 6.5), session(0, 11)).is_empty());
    assert_eq!(engine.evaluate(&mut s, &quote(106.0, 5.1), session(1, 10)).len(), 1);
}

#[test]
fn security_fixture_parses_and_validates() {
    let path = data_dir().join("monitoring_stocks.example.json");
    let text = std::fs::read_to_string(path).unwrap();
    let book: std::collections::BTreeMap<String, MonitoredSecurity> = serde_json::from_str(&text).unwrap();
    for s in book.values() {
        s.validate().unwrap();
    }
}
