//! Keyword matching and priority scoring for disclosure filings.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use watchdesk_core::{Alert, AlertKind, AlertSource, AlertSubject, FilingRecord};
use watchdesk_storage::ProcessedFilingRegistry;

use crate::match_rules::{MatchMode, MatchRules};

/// What happened to one filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilingVerdict {
    AlreadyProcessed,
    Malformed,
    Excluded,
    UnwatchedIssuer,
    NoMatch,
    Matched,
}

/// Per-batch counters, logged after every evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub duplicate: usize,
    pub malformed: usize,
    pub excluded: usize,
    pub unwatched: usize,
    pub unmatched: usize,
    pub matched: usize,
}

impl BatchSummary {
    fn record(&mut self, verdict: FilingVerdict) {
        match verdict {
            FilingVerdict::AlreadyProcessed => self.duplicate += 1,
            FilingVerdict::Malformed => self.malformed += 1,
            FilingVerdict::Excluded => self.excluded += 1,
            FilingVerdict::UnwatchedIssuer => self.unwatched += 1,
            FilingVerdict::NoMatch => self.unmatched += 1,
            FilingVerdict::Matched => self.matched += 1,
        }
    }
}

/// Stateless matcher; all dedup state lives in the registry passed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisclosureMatcher;

impl DisclosureMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a batch in arrival order and return alerts ordered by
    /// descending priority (ties keep arrival order).
    ///
    /// Every well-formed filing ends up in `registry`, whether or not it
    /// produced an alert, and stays there even when the batch is larger
    /// than the registry cap. Malformed filings are logged and skipped.
    pub fn evaluate(
        &self,
        batch: &[FilingRecord],
        rules: &MatchRules,
        registry: &mut ProcessedFilingRegistry,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        self.evaluate_with_summary(batch, rules, registry, now).0
    }

    pub fn evaluate_with_summary(
        &self,
        batch: &[FilingRecord],
        rules: &MatchRules,
        registry: &mut ProcessedFilingRegistry,
        now: DateTime<Utc>,
    ) -> (Vec<Alert>, BatchSummary) {
        let mut summary = BatchSummary {
            received: batch.len(),
            ..BatchSummary::default()
        };
        let mut alerts = Vec::new();

        for filing in batch {
            let (verdict, alert) = self.evaluate_one(filing, rules, registry, now);
            summary.record(verdict);
            if let Some(alert) = alert {
                alerts.push(alert);
            }
        }
        registry.trim_keeping(summary.received - summary.malformed);

        // Vec::sort_by is stable.
        alerts.sort_by(|a, b| b.priority.cmp(&a.priority));

        info!(
            received = summary.received,
            matched = summary.matched,
            duplicate = summary.duplicate,
            excluded = summary.excluded,
            unmatched = summary.unmatched,
            malformed = summary.malformed,
            "evaluated filing batch"
        );
        (alerts, summary)
    }

    fn evaluate_one(
        &self,
        filing: &FilingRecord,
        rules: &MatchRules,
        registry: &mut ProcessedFilingRegistry,
        now: DateTime<Utc>,
    ) -> (FilingVerdict, Option<Alert>) {
        if let Err(e) = filing.check() {
            warn!(
                entity = %filing.id,
                error = %e,
                error_class = "malformed_record",
                "skipping malformed filing"
            );
            return (FilingVerdict::Malformed, None);
        }

        if !registry.mark_seen(&filing.id) {
            return (FilingVerdict::AlreadyProcessed, None);
        }

        let title = filing.title.to_lowercase();
        if let Some(term) = find_any(&title, &rules.exclusions) {
            debug!(entity = %filing.id, term = %term, "filing excluded");
            return (FilingVerdict::Excluded, None);
        }

        if !rules.watched_issuers.is_empty()
            && !rules
                .watched_issuers
                .iter()
                .any(|w| w == &filing.issuer_code || w == &filing.issuer_name)
        {
            return (FilingVerdict::UnwatchedIssuer, None);
        }

        let text = format!("{} {}", filing.title, filing.remarks).to_lowercase();
        let Some(matched) = match_keywords(&text, rules) else {
            return (FilingVerdict::NoMatch, None);
        };

        let score = score(&text, filing, &matched, rules);
        let detail_url = rules.detail_url(&filing.id);

        let mut record = filing.clone();
        record.matched_keywords = matched.keywords.clone();
        record.priority_score = score;
        record.detail_url = Some(detail_url.clone());

        debug!(entity = %record.id, score, keywords = ?record.matched_keywords, "filing matched");
        (FilingVerdict::Matched, Some(build_alert(&record, rules, now)))
    }
}

struct KeywordMatch {
    /// OR keywords found, in rule order.
    or_hits: usize,
    /// Every keyword that contributed to the match (OR hits plus satisfied groups).
    keywords: Vec<String>,
}

fn contains_ci(text: &str, needle: &str) -> bool {
    text.contains(&needle.to_lowercase())
}

fn find_any<'a>(text: &str, terms: &'a [String]) -> Option<&'a str> {
    terms
        .iter()
        .find(|t| contains_ci(text, t))
        .map(String::as_str)
}

fn match_keywords(text: &str, rules: &MatchRules) -> Option<KeywordMatch> {
    let or_hits: Vec<&String> = rules.keywords.iter().filter(|k| contains_ci(text, k)).collect();
    let groups: Vec<&Vec<String>> = rules
        .and_groups
        .iter()
        .filter(|g| g.iter().all(|k| contains_ci(text, k)))
        .collect();

    let matched = match rules.mode {
        MatchMode::Or => !or_hits.is_empty(),
        MatchMode::And => !groups.is_empty(),
        MatchMode::Mixed => !or_hits.is_empty() || !groups.is_empty(),
    };
    if !matched {
        return None;
    }

    let mut keywords: Vec<String> = Vec::new();
    for k in or_hits.iter().copied().chain(groups.iter().flat_map(|g| g.iter())) {
        if !keywords.contains(k) {
            keywords.push(k.clone());
        }
    }
    Some(KeywordMatch {
        or_hits: or_hits.len(),
        keywords,
    })
}

fn score(text: &str, filing: &FilingRecord, matched: &KeywordMatch, rules: &MatchRules) -> u32 {
    let mut score = rules.base_score;
    score = score.saturating_add(rules.keyword_weight.saturating_mul(matched.or_hits as u32));

    for tier in &rules.priority_tiers {
        let hits = tier.keywords.iter().filter(|k| contains_ci(text, k)).count() as u32;
        score = score.saturating_add(tier.bonus.saturating_mul(hits));
    }

    if rules
        .distinguished_issuers
        .iter()
        .any(|d| d == &filing.issuer_code || d == &filing.issuer_name)
    {
        score = score.saturating_add(rules.issuer_bonus);
    }

    score.min(rules.max_score)
}

fn build_alert(record: &FilingRecord, rules: &MatchRules, now: DateTime<Utc>) -> Alert {
    let detail_url = record.detail_url.clone().unwrap_or_default();
    let message = format!(
        "{issuer} ({code}) filed \"{title}\" on {date}.\nMatched: {keywords}\nPriority: {score}\n{url}",
        issuer = record.issuer_name,
        code = record.issuer_code,
        title = record.title,
        date = record.filed_on,
        keywords = record.matched_keywords.join(", "),
        score = record.priority_score,
        url = detail_url,
    );
    Alert::new(
        AlertSource::Disclosure,
        AlertKind::Filing {
            matched_keywords: record.matched_keywords.clone(),
            detail_url,
        },
        AlertSubject {
            id: record.id.clone(),
            name: record.issuer_name.clone(),
        },
        format!("{} - {}", record.issuer_name, record.title),
        message,
        rules.severity.severity_for(record.priority_score),
        now,
    )
    .with_priority(record.priority_score)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use watchdesk_core::Severity;

    use super::*;
    use crate::match_rules::PriorityTier;

    fn filing(id: &str, title: &str) -> FilingRecord {
        FilingRecord::new(
            id,
            "Acme",
            "00001",
            title,
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        )
    }

    fn rules() -> MatchRules {
        MatchRules {
            keywords: vec!["merger".into(), "split".into(), "dividend".into()],
            exclusions: vec!["IR meeting".into()],
            ..MatchRules::default()
        }
    }

    #[test]
    fn second_pass_over_same_batch_is_silent() {
        let batch = vec![filing("1", "Merger decision"), filing("2", "Split notice")];
        let mut reg = ProcessedFilingRegistry::default();
        let m = DisclosureMatcher::new();
        assert_eq!(m.evaluate(&batch, &rules(), &mut reg, Utc::now()).len(), 2);
        assert!(m.evaluate(&batch, &rules(), &mut reg, Utc::now()).is_empty());
    }

    #[test]
    fn batch_larger_than_registry_cap_alerts_once() {
        let batch: Vec<FilingRecord> = (0..1200)
            .map(|i| filing(&format!("2026030200{:04}", i), "Merger decision"))
            .collect();
        let mut reg = ProcessedFilingRegistry::with_cap(1000);
        let m = DisclosureMatcher::new();
        assert_eq!(m.evaluate(&batch, &rules(), &mut reg, Utc::now()).len(), 1200);
        assert_eq!(reg.len(), 1200);
        assert!(m.evaluate(&batch, &rules(), &mut reg, Utc::now()).is_empty());
    }

    #[test]
    fn exclusion_beats_keyword() {
        let batch = vec![filing("1", "IR meeting about merger")];
        let mut reg = ProcessedFilingRegistry::default();
        let alerts = DisclosureMatcher::new().evaluate(&batch, &rules(), &mut reg, Utc::now());
        assert!(alerts.is_empty());
        assert!(reg.contains("1"));
    }

    #[test]
    fn exclusion_checks_title_only() {
        let batch = vec![filing("1", "Merger decision").with_remarks("IR meeting follows")];
        let mut reg = ProcessedFilingRegistry::default();
        let alerts = DisclosureMatcher::new().evaluate(&batch, &rules(), &mut reg, Utc::now());
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn remarks_count_towards_match() {
        let batch = vec![filing("1", "Board resolution").with_remarks("includes dividend")];
        let mut reg = ProcessedFilingRegistry::default();
        let alerts = DisclosureMatcher::new().evaluate(&batch, &rules(), &mut reg, Utc::now());
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn unmatched_filing_is_still_marked() {
        let batch = vec![filing("1", "Quarterly report")];
        let mut reg = ProcessedFilingRegistry::default();
        let alerts = DisclosureMatcher::new().evaluate(&batch, &rules(), &mut reg, Utc::now());
        assert!(alerts.is_empty());
        assert!(reg.contains("1"));
    }

    #[test]
    fn malformed_filing_does_not_abort_batch() {
        let batch = vec![filing("", "Merger"), filing("2", "Merger")];
        let mut reg = ProcessedFilingRegistry::default();
        let (alerts, summary) =
            DisclosureMatcher::new().evaluate_with_summary(&batch, &rules(), &mut reg, Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(summary.malformed, 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn alerts_sorted_by_descending_score_stable() {
        // Scores: base 0, 1 per keyword hit.
        let r = MatchRules {
            keywords: (1..=9).map(|i| format!("k{}", i)).collect(),
            ..MatchRules::default()
        };
        let title = |n: usize| (1..=n).map(|i| format!("k{}", i)).collect::<Vec<_>>().join(" ");
        let batch = vec![
            filing("a", &title(3)),
            filing("b", &title(9)),
            filing("c", &title(5)),
            filing("d", &title(5)),
        ];
        let mut reg = ProcessedFilingRegistry::default();
        let alerts = DisclosureMatcher::new().evaluate(&batch, &r, &mut reg, Utc::now());
        let order: Vec<(&str, u32)> = alerts.iter().map(|a| (a.subject.id.as_str(), a.priority)).collect();
        assert_eq!(order, vec![("b", 9), ("c", 5), ("d", 5), ("a", 3)]);
    }

    #[test]
    fn score_adds_tiers_and_issuer_bonus_and_clamps() {
        let mut r = rules();
        r.base_score = 1;
        r.priority_tiers = vec![PriorityTier {
            name: "high".into(),
            keywords: vec!["merger".into()],
            bonus: 3,
        }];
        r.distinguished_issuers = vec!["00001".into()];
        let batch = vec![filing("1", "Merger and split")];
        let mut reg = ProcessedFilingRegistry::default();
        let alerts = DisclosureMatcher::new().evaluate(&batch, &r, &mut reg, Utc::now());
        // 1 base + 2 keywords + 3 tier + 5 issuer
        assert_eq!(alerts[0].priority, 11);
        assert_eq!(alerts[0].severity, Severity::Critical);

        r.max_score = 4;
        let batch = vec![filing("2", "Merger and split")];
        let alerts = DisclosureMatcher::new().evaluate(&batch, &r, &mut reg, Utc::now());
        assert_eq!(alerts[0].priority, 4);
    }

    #[test]
    fn and_mode_requires_whole_group() {
        let r = MatchRules {
            keywords: vec![],
            mode: MatchMode::And,
            and_groups: vec![vec!["convertible".into(), "bond".into()]],
            ..MatchRules::default()
        };
        let batch = vec![
            filing("1", "Convertible bond issuance"),
            filing("2", "Convertible preferred"),
        ];
        let mut reg = ProcessedFilingRegistry::default();
        let alerts = DisclosureMatcher::new().evaluate(&batch, &r, &mut reg, Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].subject.id, "1");
        assert!(matches!(
            &alerts[0].kind,
            AlertKind::Filing { matched_keywords, .. } if matched_keywords == &vec!["convertible".to_string(), "bond".to_string()]
        ));
    }

    #[test]
    fn mixed_mode_accepts_group_only_hit_and_scores_or_hits() {
        let r = MatchRules {
            keywords: vec!["merger".into(), "split".into()],
            mode: MatchMode::Mixed,
            and_groups: vec![vec!["convertible".into(), "bond".into()]],
            ..MatchRules::default()
        };
        let batch = vec![
            filing("1", "Convertible bond issuance"),
            filing("2", "Merger funded by convertible bond"),
            filing("3", "Convertible preferred"),
        ];
        let mut reg = ProcessedFilingRegistry::default();
        let alerts = DisclosureMatcher::new().evaluate(&batch, &r, &mut reg, Utc::now());
        let scored: Vec<(&str, u32)> = alerts.iter().map(|a| (a.subject.id.as_str(), a.priority)).collect();
        // Only OR hits add keyword weight; a satisfied group alone scores the base.
        assert_eq!(scored, vec![("2", 1), ("1", 0)]);
        assert!(matches!(
            &alerts[0].kind,
            AlertKind::Filing { matched_keywords, .. }
                if matched_keywords == &vec!["merger".to_string(), "convertible".to_string(), "bond".to_string()]
        ));
    }

    #[test]
    fn watched_issuer_filter() {
        let mut r = rules();
        r.watched_issuers = vec!["99999".into()];
        let batch = vec![filing("1", "Merger")];
        let mut reg = ProcessedFilingRegistry::default();
        assert!(DisclosureMatcher::new().evaluate(&batch, &r, &mut reg, Utc::now()).is_empty());
        assert!(reg.contains("1"));
    }

    #[test]
    fn alert_carries_detail_url() {
        let batch = vec![filing("20260302000123", "Merger")];
        let mut reg = ProcessedFilingRegistry::default();
        let alerts = DisclosureMatcher::new().evaluate(&batch, &rules(), &mut reg, Utc::now());
        match &alerts[0].kind {
            AlertKind::Filing { detail_url, .. } => {
                assert!(detail_url.ends_with("rcpNo=20260302000123"))
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
