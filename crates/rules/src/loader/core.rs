//! Core [`RulesLoader`] struct: file-backed rule loading with optional hot-reload.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::error::{Result, RuleError};
use crate::match_rules::MatchRules;

use super::watcher::handle_fs_event;

/// Shared handle to the active rule set.
pub(super) type SharedRules = Arc<RwLock<Arc<MatchRules>>>;

/// File-backed watch rules with optional hot-reload.
///
/// Readers take a cheap `Arc` snapshot through [`RulesLoader::current`], so a
/// batch is always evaluated against one consistent rule set.
pub struct RulesLoader {
    path: PathBuf,
    current: SharedRules,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl RulesLoader {
    /// Load and validate the rules file. Fails if the file is missing or invalid.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rules = read_rules(&path)?;
        info!(
            path = %path.display(),
            keywords = rules.keywords.len(),
            groups = rules.and_groups.len(),
            "loaded watch rules"
        );
        Ok(Self {
            path,
            current: Arc::new(RwLock::new(Arc::new(rules))),
            _watcher: None,
        })
    }

    /// Start from in-memory rules, writing them to `path` if it does not exist.
    pub fn open_or_init(path: impl Into<PathBuf>, defaults: MatchRules) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            defaults.validate()?;
            write_atomic(&path, &defaults.to_yaml()?)?;
            info!(path = %path.display(), "wrote default watch rules");
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the active rules.
    pub fn current(&self) -> Arc<MatchRules> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Re-read the file. On failure the previous rules stay active.
    pub fn reload(&self) -> Result<Arc<MatchRules>> {
        reload_into(&self.path, &self.current)
    }

    /// Validate, persist and activate a replacement rule set.
    ///
    /// Writes to a `.tmp` file first, then renames to the final path.
    pub fn replace(&self, rules: MatchRules) -> Result<()> {
        rules.validate()?;
        write_atomic(&self.path, &rules.to_yaml()?)?;
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(rules);
        info!(path = %self.path.display(), "replaced watch rules");
        Ok(())
    }

    /// Start a filesystem watcher on the rules file's directory.
    pub fn watch(&mut self) -> Result<()> {
        let current = Arc::clone(&self.current);
        let path = self.path.clone();
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(d) => d.to_path_buf(),
            None => PathBuf::from("."),
        };

        let mut watcher = notify::recommended_watcher(move |res: std::result::Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => handle_fs_event(&event, &path, &current),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            }
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        if let Err(e) = watcher.configure(notify::Config::default().with_poll_interval(Duration::from_millis(500))) {
            warn!(
                path = %self.path.display(),
                error = %e,
                error_class = "configuration",
                "could not set watcher poll interval, keeping backend default"
            );
        }

        info!(path = %self.path.display(), "watching rules file for changes");
        self._watcher = Some(watcher);
        Ok(())
    }

    #[cfg(test)]
    pub(super) fn is_watching(&self) -> bool {
        self._watcher.is_some()
    }

    #[cfg(test)]
    pub(super) fn shared(&self) -> SharedRules {
        Arc::clone(&self.current)
    }
}

pub(super) fn read_rules(path: &Path) -> Result<MatchRules> {
    let contents = fs::read_to_string(path)?;
    MatchRules::from_yaml_str(&contents)
}

pub(super) fn reload_into(path: &Path, current: &SharedRules) -> Result<Arc<MatchRules>> {
    match read_rules(path) {
        Ok(rules) => {
            let rules = Arc::new(rules);
            *current.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&rules);
            info!(path = %path.display(), keywords = rules.keywords.len(), "hot-reloaded watch rules");
            Ok(rules)
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                error_class = "configuration",
                "failed to reload watch rules, keeping previous version"
            );
            Err(e)
        }
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RuleError::Validation(format!("bad rules path {}", path.display())))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_file_name(format!(".{}.tmp", name));
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
