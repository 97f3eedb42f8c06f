//! Registry of filing ids the matcher has already evaluated.

use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use tracing::warn;

use crate::error::StorageError;
use crate::store::{StateCodec, StateStore};

pub const DEFAULT_REGISTRY_CAP: usize = 1000;

const HEADER_TITLE: &str = "processed filing ids";

/// Insertion-ordered set of processed filing ids, bounded by `cap`.
///
/// Past the cap the oldest ids are evicted first. Ids seen in the batch
/// being evaluated are never evicted by that batch, so a window larger than
/// the cap cannot push its own ids out and re-alert on the next pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFilingRegistry {
    ids: IndexSet<String>,
    cap: usize,
}

impl Default for ProcessedFilingRegistry {
    fn default() -> Self {
        Self::with_cap(DEFAULT_REGISTRY_CAP)
    }
}

impl ProcessedFilingRegistry {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            ids: IndexSet::new(),
            cap: cap.max(1),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id`; returns `false` if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let added = self.ids.insert(id.into());
        if added {
            self.enforce_cap();
        }
        added
    }

    /// Record `id` as seen by the current batch without evicting anything.
    ///
    /// A known id moves to the newest position and `false` is returned.
    /// Call [`Self::trim_keeping`] once the batch is done.
    pub fn mark_seen(&mut self, id: &str) -> bool {
        match self.ids.get_index_of(id) {
            Some(index) => {
                let newest = self.ids.len() - 1;
                self.ids.move_index(index, newest);
                false
            }
            None => {
                self.ids.insert(id.to_string());
                true
            }
        }
    }

    /// Evict oldest ids down to the cap, but never below the `keep` newest.
    pub fn trim_keeping(&mut self, keep: usize) {
        let excess = self.ids.len().saturating_sub(self.cap.max(keep));
        if excess > 0 {
            self.ids.drain(..excess);
        }
    }

    pub fn set_cap(&mut self, cap: usize) {
        self.cap = cap.max(1);
        self.enforce_cap();
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    fn enforce_cap(&mut self) {
        self.trim_keeping(0);
    }
}

/// Line-oriented text format: `#` comment header, then one id per line.
#[derive(Debug, Clone)]
pub struct ProcessedIdsCodec {
    pub cap: usize,
}

impl Default for ProcessedIdsCodec {
    fn default() -> Self {
        Self {
            cap: DEFAULT_REGISTRY_CAP,
        }
    }
}

impl StateCodec for ProcessedIdsCodec {
    type State = ProcessedFilingRegistry;

    /// Keeps every id in the file, even past the cap: a file longer than
    /// the cap holds one oversized batch that must stay known.
    fn decode(&self, path: &Path, text: &str) -> Result<ProcessedFilingRegistry, StorageError> {
        let mut registry = ProcessedFilingRegistry::with_cap(self.cap);
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.chars().any(char::is_whitespace) {
                warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error_class = "malformed_record",
                    "skipping malformed processed-id line"
                );
                continue;
            }
            registry.mark_seen(line);
        }
        Ok(registry)
    }

    fn encode(
        &self,
        state: &ProcessedFilingRegistry,
        saved_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let mut out = String::with_capacity(32 * (state.len() + 3));
        out.push_str(&format!("# {}\n", HEADER_TITLE));
        out.push_str(&format!("# updated: {}\n", saved_at.to_rfc3339()));
        out.push_str(&format!("# count: {}\n", state.len()));
        for id in state.iter() {
            out.push_str(id);
            out.push('\n');
        }
        Ok(out)
    }
}

pub type ProcessedIdStore = StateStore<ProcessedIdsCodec>;

impl ProcessedIdStore {
    pub fn open(path: impl Into<std::path::PathBuf>, cap: usize) -> Self {
        StateStore::new(path, ProcessedIdsCodec { cap })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut reg = ProcessedFilingRegistry::with_cap(3);
        for id in ["a", "b", "c", "d"] {
            reg.insert(id);
        }
        assert!(!reg.contains("a"));
        assert_eq!(reg.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let mut reg = ProcessedFilingRegistry::with_cap(3);
        assert!(reg.insert("a"));
        assert!(!reg.insert("a"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn decode_skips_comments_and_blanks() {
        let text = "# processed filing ids\n# count: 2\n\n2026001\n  2026002  \nbad id\n";
        let reg = ProcessedIdsCodec::default()
            .decode(Path::new("x"), text)
            .unwrap();
        assert_eq!(reg.iter().collect::<Vec<_>>(), vec!["2026001", "2026002"]);
    }

    #[test]
    fn encode_writes_header() {
        let mut reg = ProcessedFilingRegistry::default();
        reg.insert("1");
        reg.insert("2");
        let text = ProcessedIdsCodec::default().encode(&reg, Utc::now()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with('#'));
        assert_eq!(lines[2], "# count: 2");
        assert_eq!(&lines[3..], &["1", "2"]);
    }

    #[test]
    fn decode_keeps_oversized_file_until_next_trim() {
        let text = "1\n2\n3\n4\n";
        let mut reg = ProcessedIdsCodec { cap: 2 }.decode(Path::new("x"), text).unwrap();
        assert_eq!(reg.len(), 4);
        reg.trim_keeping(0);
        assert_eq!(reg.iter().collect::<Vec<_>>(), vec!["3", "4"]);
    }

    #[test]
    fn batch_larger_than_cap_stays_known() {
        let mut reg = ProcessedFilingRegistry::with_cap(3);
        reg.insert("old");
        let batch = ["a", "b", "c", "d", "e"];
        for id in batch {
            assert!(reg.mark_seen(id));
        }
        reg.trim_keeping(batch.len());
        assert!(!reg.contains("old"));
        assert!(batch.iter().all(|id| reg.contains(id)));

        // Seen again: refreshed, nothing new, nothing evicted.
        for id in batch {
            assert!(!reg.mark_seen(id));
        }
        reg.trim_keeping(batch.len());
        assert_eq!(reg.len(), 5);
    }

    #[test]
    fn mark_seen_refreshes_position() {
        let mut reg = ProcessedFilingRegistry::with_cap(2);
        reg.insert("a");
        reg.insert("b");
        assert!(!reg.mark_seen("a"));
        reg.insert("c");
        assert_eq!(reg.iter().collect::<Vec<_>>(), vec!["a", "c"]);
    }
}
