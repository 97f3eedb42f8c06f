//! Lock-guarded, file-backed state with atomic full rewrites.

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StorageError;

/// Converts a state value to and from its on-disk text form.
pub trait StateCodec: Send + Sync {
    type State: Default + Send;

    fn decode(&self, path: &Path, text: &str) -> Result<Self::State, StorageError>;

    fn encode(&self, state: &Self::State, saved_at: DateTime<Utc>) -> Result<String, StorageError>;
}

/// Durable state behind one exclusive lock per backing file.
///
/// Share a single `StateStore` (via `Arc`) per path; two stores over the same
/// file do not serialize against each other.
pub struct StateStore<C: StateCodec> {
    path: PathBuf,
    codec: C,
    lock: Mutex<()>,
    last_saved: StdMutex<Option<DateTime<Utc>>>,
}

impl<C: StateCodec> StateStore<C> {
    pub fn new(path: impl Into<PathBuf>, codec: C) -> Self {
        Self {
            path: path.into(),
            codec,
            lock: Mutex::new(()),
            last_saved: StdMutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Read the current state. A missing file yields the empty default.
    pub async fn load(&self) -> Result<C::State, StorageError> {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    /// Replace the stored state with `state`.
    pub async fn save(&self, state: &C::State) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        self.write_unlocked(state).await
    }

    /// Load, mutate and save while holding the lock for the whole sequence.
    ///
    /// If `f` fails nothing is written.
    pub async fn update<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut C::State) -> Result<R, E>,
        E: From<StorageError>,
    {
        let _guard = self.lock.lock().await;
        let mut state = self.read_unlocked().await?;
        let out = f(&mut state)?;
        self.write_unlocked(&state).await?;
        Ok(out)
    }

    /// Time of the last successful save, falling back to the file's mtime.
    pub async fn last_saved(&self) -> Option<DateTime<Utc>> {
        if let Some(at) = *self.last_saved.lock().unwrap_or_else(|e| e.into_inner()) {
            return Some(at);
        }
        let meta = tokio::fs::metadata(&self.path).await.ok()?;
        meta.modified().ok().map(DateTime::<Utc>::from)
    }

    async fn read_unlocked(&self) -> Result<C::State, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => self.codec.decode(&self.path, &text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "state file missing, using empty default");
                Ok(C::State::default())
            }
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }

    async fn write_unlocked(&self, state: &C::State) -> Result<(), StorageError> {
        let now = Utc::now();
        let text = self.codec.encode(state, now)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        let tmp_path = tmp_sibling(&self.path);
        tokio::fs::write(&tmp_path, text.as_bytes())
            .await
            .map_err(|e| StorageError::io(&tmp_path, e))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StorageError::io(&self.path, e));
        }

        *self.last_saved.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
        info!(path = %self.path.display(), bytes = text.len(), "saved state");
        Ok(())
    }
}

/// `dir/.name.tmp` next to the target file.
fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state");
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Newline-separated list of strings.
    struct Lines;

    impl StateCodec for Lines {
        type State = Vec<String>;

        fn decode(&self, _path: &Path, text: &str) -> Result<Vec<String>, StorageError> {
            Ok(text.lines().map(str::to_string).collect())
        }

        fn encode(&self, state: &Vec<String>, _at: DateTime<Utc>) -> Result<String, StorageError> {
            Ok(state.join("\n"))
        }
    }

    #[tokio::test]
    async fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nope.txt"), Lines);
        assert!(store.load().await.unwrap().is_empty());
        assert!(store.last_saved().await.is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/state.txt"), Lines);
        store.save(&vec!["a".into(), "b".into()]).await.unwrap();
        assert_eq!(store.load().await.unwrap(), vec!["a", "b"]);
        assert!(store.last_saved().await.is_some());
        assert!(!dir.path().join("nested/.state.txt.tmp").exists());
    }

    #[tokio::test]
    async fn failed_update_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.txt"), Lines);
        store.save(&vec!["keep".into()]).await.unwrap();

        let res: Result<(), StorageError> = store
            .update(|s| {
                s.push("lost".into());
                Err(StorageError::Other("boom".into()))
            })
            .await;
        assert!(res.is_err());
        assert_eq!(store.load().await.unwrap(), vec!["keep"]);
    }

    #[tokio::test]
    async fn concurrent_updates_do_not_lose_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(StateStore::new(dir.path().join("state.txt"), Lines));

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(|s| {
                        s.push(format!("w{}", i));
                        Ok::<_, StorageError>(())
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.load().await.unwrap().len(), 20);
    }
}
