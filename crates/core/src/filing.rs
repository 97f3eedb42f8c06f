//! Regulatory disclosure filings.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One disclosure record as fetched, plus the fields the matcher fills in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingRecord {
    /// Receipt number assigned by the filing source.
    pub id: String,
    pub issuer_name: String,
    pub issuer_code: String,
    pub title: String,
    pub filed_on: NaiveDate,
    #[serde(default)]
    pub remarks: String,

    #[serde(default)]
    pub matched_keywords: Vec<String>,
    #[serde(default)]
    pub priority_score: u32,
    #[serde(default)]
    pub detail_url: Option<String>,
}

impl FilingRecord {
    pub fn new(
        id: impl Into<String>,
        issuer_name: impl Into<String>,
        issuer_code: impl Into<String>,
        title: impl Into<String>,
        filed_on: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            issuer_name: issuer_name.into(),
            issuer_code: issuer_code.into(),
            title: title.into(),
            filed_on,
            remarks: String::new(),
            matched_keywords: Vec::new(),
            priority_score: 0,
            detail_url: None,
        }
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = remarks.into();
        self
    }

    /// Reject records the matcher cannot evaluate or dedup.
    pub fn check(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::MalformedRecord("filing id is empty".into()));
        }
        if self.id.chars().any(|c| c.is_whitespace()) {
            return Err(CoreError::MalformedRecord(format!(
                "filing id contains whitespace: {:?}",
                self.id
            )));
        }
        if self.title.trim().is_empty() {
            return Err(CoreError::MalformedRecord(format!(
                "filing {} has an empty title",
                self.id
            )));
        }
        Ok(())
    }
}

/// Inclusive date window for a filing fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn single_day(day: NaiveDate) -> Self {
        Self { from: day, to: day }
    }
}

/// Source-side narrowing applied by the filing client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingFilters {
    /// Restrict to these issuer codes (empty = all issuers).
    #[serde(default)]
    pub issuer_codes: Vec<String>,
    /// Market class code understood by the source (e.g. `Y` for the main board).
    #[serde(default)]
    pub market_class: Option<String>,
}
