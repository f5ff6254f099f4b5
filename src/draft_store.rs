use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;

/// Key under which the session snapshot is stored.
pub const DRAFT_KEY: &str = "book_draft";

#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Draft store shared by a session and its autosave task.
///
/// Every write and delete of the draft happens under `lock`, and writers
/// re-read the snapshot they save after acquiring it. Failures from either
/// side land in one warning slot.
#[derive(Clone)]
pub struct SharedDraft {
    store: Arc<dyn DraftStore>,
    lock: Arc<tokio::sync::Mutex<()>>,
    warning: Arc<Mutex<Option<String>>>,
}

impl SharedDraft {
    pub fn new(store: Arc<dyn DraftStore>) -> Self {
        Self {
            store,
            lock: Arc::new(tokio::sync::Mutex::new(())),
            warning: Arc::new(Mutex::new(None)),
        }
    }

    pub fn store(&self) -> &Arc<dyn DraftStore> {
        &self.store
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Keeps the most recent failure until [`SharedDraft::take_warning`].
    pub fn record_warning(&self, message: String) {
        *self.warning.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    pub fn take_warning(&self) -> Option<String> {
        self.warning
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[derive(Debug, Clone)]
pub struct LocalFsDraftStore {
    base_dir: PathBuf,
    max_bytes: Option<usize>,
}

impl LocalFsDraftStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_bytes: None,
        }
    }

    /// Rejects values larger than `max_bytes`, like a quota-limited browser store.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl DraftStore for LocalFsDraftStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.entry_path(key);
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read: {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if let Some(max_bytes) = self.max_bytes
            && value.len() > max_bytes
        {
            anyhow::bail!(
                "draft of {} bytes exceeds storage quota of {max_bytes} bytes",
                value.len()
            );
        }
        write_atomic(&self.entry_path(key), value.as_bytes()).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let path = self.entry_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove: {}", path.display())),
        }
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp_path, data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("draft store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("draft store lock poisoned"))?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("draft store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}
