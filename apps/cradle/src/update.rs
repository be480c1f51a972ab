//! Build-id check against the exchange server's `/version`.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::signaling::ExchangeApi;

pub const LAST_UPDATE_KEY: &str = "last-update";
pub const META_FILE_NAME: &str = "meta.json";
const NEVER_UPDATED: &str = "0";

/// Small key-value store for client metadata.
///
/// Storage problems are logged by the implementation; callers see a miss.
#[async_trait]
pub trait MetaCache: Send + Sync {
    async fn load(&self, key: &str) -> Option<String>;
    async fn store(&self, key: &str, value: String);
}

#[derive(Debug, Default)]
pub struct MemoryMetaCache {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl MetaCache for MemoryMetaCache {
    async fn load(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    async fn store(&self, key: &str, value: String) {
        self.entries.lock().insert(key.to_string(), value);
    }
}

/// Metadata kept as one JSON object on disk, so it survives restarts.
#[derive(Debug)]
pub struct FileMetaCache {
    path: PathBuf,
    writes: tokio::sync::Mutex<()>,
}

impl FileMetaCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: tokio::sync::Mutex::new(()),
        }
    }

    /// Cache stored as [`META_FILE_NAME`] inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(META_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> BTreeMap<String, String> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return BTreeMap::new(),
            Err(err) => {
                warn!(target = "cradle::update", path = %self.path.display(), error = %err, "reading metadata failed");
                return BTreeMap::new();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            warn!(target = "cradle::update", path = %self.path.display(), error = %err, "ignoring unreadable metadata");
            BTreeMap::new()
        })
    }

    // Written to a sibling file first so a crash never leaves a torn cache.
    async fn write_entries(&self, entries: &BTreeMap<String, String>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(entries)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, &self.path).await
    }
}

#[async_trait]
impl MetaCache for FileMetaCache {
    async fn load(&self, key: &str) -> Option<String> {
        self.read_entries().await.remove(key)
    }

    async fn store(&self, key: &str, value: String) {
        let _guard = self.writes.lock().await;
        let mut entries = self.read_entries().await;
        entries.insert(key.to_string(), value);
        match self.write_entries(&entries).await {
            Ok(()) => debug!(target = "cradle::update", path = %self.path.display(), key, "metadata saved"),
            Err(err) => {
                warn!(target = "cradle::update", path = %self.path.display(), error = %err, "saving metadata failed")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateStatus {
    /// The server's build differs from the cached one.
    pub is_updated: bool,
    /// A build id had been recorded before this check.
    pub had_previous: bool,
}

/// Compare the cached build id with the server's and record the new one.
///
/// Never fails: any error is logged and reported as "no update".
pub async fn check_for_update<E, C>(exchange: &E, cache: &C) -> UpdateStatus
where
    E: ExchangeApi + ?Sized,
    C: MetaCache + ?Sized,
{
    let cached = cache
        .load(LAST_UPDATE_KEY)
        .await
        .unwrap_or_else(|| NEVER_UPDATED.to_string());

    let reply = match exchange.version(&cached).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(target = "cradle::update", error = %err, "version check failed");
            return UpdateStatus::default();
        }
    };

    if reply.is_updated {
        info!(
            target = "cradle::update",
            app = %reply.app_name,
            previous = %cached,
            current = %reply.last_update,
            "new build available"
        );
        cache.store(LAST_UPDATE_KEY, reply.last_update).await;
    }

    UpdateStatus {
        is_updated: reply.is_updated,
        had_previous: cached != NEVER_UPDATED,
    }
}
