//! Rule evaluators for the monitoring core.
//!
//! This crate provides:
//! - YAML watch rules with validation and hot-reload via `notify` watcher
//! - The disclosure matcher (keyword matching, exclusion, priority scoring)
//! - The edge-triggered threshold engine for security prices
//! - Exchange trading-hours gate and cron helpers

pub mod error;
pub mod loader;
pub mod market;
pub mod match_rules;
pub mod matcher;
pub mod schedule;
pub mod threshold;

pub use error::{Result, RuleError};
pub use loader::RulesLoader;
pub use market::{MarketHours, MarketStatus};
pub use match_rules::{MatchMode, MatchRules, PriorityTier, SeverityCuts};
pub use matcher::{BatchSummary, DisclosureMatcher, FilingVerdict};
pub use threshold::ThresholdEngine;
