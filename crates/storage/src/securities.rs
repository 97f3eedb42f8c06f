//! Monitored-security records, one JSON object keyed by security code.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;
use watchdesk_core::MonitoredSecurity;

use crate::error::StorageError;
use crate::store::{StateCodec, StateStore};

/// All monitored securities, ordered by code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityBook {
    securities: BTreeMap<String, MonitoredSecurity>,
}

impl SecurityBook {
    pub fn get(&self, code: &str) -> Option<&MonitoredSecurity> {
        self.securities.get(code)
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut MonitoredSecurity> {
        self.securities.get_mut(code)
    }

    /// Insert or replace a security after validating its configuration.
    pub fn upsert(&mut self, security: MonitoredSecurity) -> Result<(), StorageError> {
        security.validate()?;
        self.securities.insert(security.code.clone(), security);
        Ok(())
    }

    pub fn remove(&mut self, code: &str) -> Option<MonitoredSecurity> {
        self.securities.remove(code)
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MonitoredSecurity> {
        self.securities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MonitoredSecurity> {
        self.securities.values_mut()
    }

    /// Codes of enabled securities whose configuration validates.
    ///
    /// Invalid records stay on disk but are never handed to the engine.
    pub fn active_codes(&self) -> Vec<String> {
        self.securities
            .values()
            .filter(|s| s.enabled)
            .filter(|s| match s.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        entity = %s.code,
                        error = %e,
                        error_class = "configuration",
                        "skipping security with invalid configuration"
                    );
                    false
                }
            })
            .map(|s| s.code.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SecuritiesCodec;

impl StateCodec for SecuritiesCodec {
    type State = SecurityBook;

    fn decode(&self, path: &Path, text: &str) -> Result<SecurityBook, StorageError> {
        if text.trim().is_empty() {
            return Ok(SecurityBook::default());
        }
        let mut securities: BTreeMap<String, MonitoredSecurity> = serde_json::from_str(text)
            .map_err(|e| StorageError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        for (code, security) in securities.iter_mut() {
            if security.code.is_empty() {
                security.code = code.clone();
            } else if &security.code != code {
                return Err(StorageError::Corrupt {
                    path: path.to_path_buf(),
                    reason: format!("record keyed {} carries code {}", code, security.code),
                });
            }
        }
        Ok(SecurityBook { securities })
    }

    fn encode(&self, state: &SecurityBook, _saved_at: DateTime<Utc>) -> Result<String, StorageError> {
        serde_json::to_string_pretty(&state.securities)
            .map_err(|e| StorageError::Serialize(e.to_string()))
    }
}

pub type SecurityStore = StateStore<SecuritiesCodec>;

impl SecurityStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        StateStore::new(path, SecuritiesCodec)
    }
}
