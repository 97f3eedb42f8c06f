//! Operator-defined disclosure watch rules (YAML).
//!
//! ```yaml
//! keywords: [merger, split, rights offering]
//! exclusions: [IR meeting]
//! mode: mixed
//! and_groups:
//!   - [convertible, bond]
//! priority_tiers:
//!   - name: high
//!     keywords: [merger, split]
//!     bonus: 3
//! distinguished_issuers: ["00126380"]
//! issuer_bonus: 5
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use watchdesk_core::Severity;

use crate::error::{Result, RuleError};

/// Public disclosure viewer; `{id}` is replaced with the receipt number.
pub const DEFAULT_DETAIL_URL_TEMPLATE: &str = "https://dart.fss.or.kr/dsaf001/main.do?rcpNo={id}";

/// How watch keywords decide whether a filing matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Any watch keyword present.
    #[default]
    Or,
    /// Every member of at least one AND-group present.
    And,
    /// Either of the above.
    Mixed,
}

/// Keywords that earn `bonus` points each when matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityTier {
    #[serde(default)]
    pub name: String,
    pub keywords: Vec<String>,
    pub bonus: u32,
}

/// Score thresholds mapping a priority score to a severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityCuts {
    pub warning: u32,
    pub critical: u32,
}

impl Default for SeverityCuts {
    fn default() -> Self {
        Self {
            warning: 5,
            critical: 10,
        }
    }
}

impl SeverityCuts {
    pub fn severity_for(&self, score: u32) -> Severity {
        if score >= self.critical {
            Severity::Critical
        } else if score >= self.warning {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

fn default_keyword_weight() -> u32 {
    1
}

fn default_issuer_bonus() -> u32 {
    5
}

fn default_max_score() -> u32 {
    100
}

fn default_detail_url_template() -> String {
    DEFAULT_DETAIL_URL_TEMPLATE.to_string()
}

/// Validated rule set consumed by the disclosure matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRules {
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Title terms that suppress a filing regardless of keywords.
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub and_groups: Vec<Vec<String>>,
    #[serde(default)]
    pub priority_tiers: Vec<PriorityTier>,
    #[serde(default)]
    pub base_score: u32,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: u32,
    #[serde(default)]
    pub distinguished_issuers: Vec<String>,
    #[serde(default = "default_issuer_bonus")]
    pub issuer_bonus: u32,
    /// When non-empty, filings from other issuers are ignored.
    #[serde(default)]
    pub watched_issuers: Vec<String>,
    #[serde(default = "default_max_score")]
    pub max_score: u32,
    #[serde(default = "default_detail_url_template")]
    pub detail_url_template: String,
    #[serde(default)]
    pub severity: SeverityCuts,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            exclusions: Vec::new(),
            mode: MatchMode::Or,
            and_groups: Vec::new(),
            priority_tiers: Vec::new(),
            base_score: 0,
            keyword_weight: default_keyword_weight(),
            distinguished_issuers: Vec::new(),
            issuer_bonus: default_issuer_bonus(),
            watched_issuers: Vec::new(),
            max_score: default_max_score(),
            detail_url_template: default_detail_url_template(),
            severity: SeverityCuts::default(),
        }
    }
}

impl MatchRules {
    /// Parse and validate a YAML rule document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let rules: MatchRules = serde_yaml::from_str(yaml)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject configurations the matcher cannot evaluate sensibly.
    pub fn validate(&self) -> Result<()> {
        let blank = |list: &[String]| list.iter().any(|k| k.trim().is_empty());

        if blank(&self.keywords) {
            return Err(RuleError::Validation("keywords must not contain blank entries".into()));
        }
        if blank(&self.exclusions) {
            return Err(RuleError::Validation("exclusions must not contain blank entries".into()));
        }
        for (i, group) in self.and_groups.iter().enumerate() {
            if group.is_empty() || blank(group) {
                return Err(RuleError::Validation(format!(
                    "and_groups[{}] must be a non-empty list of non-blank keywords",
                    i
                )));
            }
        }
        match self.mode {
            MatchMode::Or if self.keywords.is_empty() => {
                return Err(RuleError::Validation("mode 'or' needs at least one keyword".into()));
            }
            MatchMode::And if self.and_groups.is_empty() => {
                return Err(RuleError::Validation("mode 'and' needs at least one and_group".into()));
            }
            MatchMode::Mixed if self.keywords.is_empty() && self.and_groups.is_empty() => {
                return Err(RuleError::Validation(
                    "mode 'mixed' needs keywords or and_groups".into(),
                ));
            }
            _ => {}
        }
        for tier in &self.priority_tiers {
            if tier.keywords.is_empty() || blank(&tier.keywords) {
                return Err(RuleError::Validation(format!(
                    "priority tier '{}' needs non-blank keywords",
                    tier.name
                )));
            }
        }
        if self.max_score == 0 {
            return Err(RuleError::Validation("max_score must be > 0".into()));
        }
        if self.severity.warning > self.severity.critical {
            return Err(RuleError::Validation(format!(
                "severity.warning ({}) must not exceed severity.critical ({})",
                self.severity.warning, self.severity.critical
            )));
        }
        if !self.detail_url_template.contains("{id}") {
            return Err(RuleError::Validation(
                "detail_url_template must contain an {id} placeholder".into(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.keywords.iter().find(|k| !seen.insert(k.as_str())) {
            return Err(RuleError::Validation(format!("duplicate keyword '{}'", dup)));
        }
        Ok(())
    }

    pub fn detail_url(&self, filing_id: &str) -> String {
        self.detail_url_template.replace("{id}", filing_id)
    }
}
