//! File Store Module
//!
//! Cache store persisting each entry as one file on the local file system.

use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::runtime::Handle;
use tracing::debug;

use crate::cache::{expires_at, Cache, Clock, Codec, JsonCodec, SystemClock};
use crate::error::{CacheError, Result};

/// Root directory used when none is configured
pub const DEFAULT_ROOT_DIR: &str = "cache";

/// Extension of records still being written
const TEMP_EXTENSION: &str = "tmp";

/// Makes temp file names unique across concurrent writes of one key
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Record written to disk for every entry.
#[derive(Serialize, Deserialize)]
struct FileItem<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

// == File Store ==
/// File system implementation of the cache store.
///
/// Keys are hashed with SHA-256 and stored under
/// `root_dir/<h0>/<h1>/<hash>`, where `h0` and `h1` are the first two hex
/// characters of the hash.
pub struct FileStore<V, C = JsonCodec> {
    clock: Arc<dyn Clock>,
    root_dir: PathBuf,
    codec: Arc<C>,
    _value: PhantomData<fn() -> V>,
}

impl<V, C> FileStore<V, C>
where
    C: Codec,
{
    // == Constructor ==
    /// Creates a store rooted at `root_dir` using the given codec.
    pub fn with_codec(root_dir: impl Into<PathBuf>, codec: C) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            root_dir: root_dir.into(),
            codec: Arc::new(codec),
            _value: PhantomData,
        }
    }

    /// Replaces the clock used to compute and check expiration.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    // == Filename ==
    /// Returns the path of the file holding `key`.
    pub fn filename(&self, key: &str) -> PathBuf {
        let hash = format!("{:x}", Sha256::digest(key.as_bytes()));
        self.root_dir
            .join(&hash[0..1])
            .join(&hash[1..2])
            .join(hash)
    }
}

impl<V, C> FileStore<V, C>
where
    V: DeserializeOwned + Send + 'static,
    C: Codec,
{
    // == Expire In Background ==
    /// Deletes the record at `path` on a separate task if it is still expired.
    ///
    /// Outside a tokio runtime nothing is scheduled and the record waits for
    /// the next GC.
    fn expire_in_background(&self, path: PathBuf) {
        let Ok(runtime) = Handle::try_current() else {
            debug!("No runtime to expire {}, leaving it for GC", path.display());
            return;
        };
        let codec = Arc::clone(&self.codec);
        let clock = Arc::clone(&self.clock);

        runtime.spawn(async move {
            match read_item::<V, C>(codec.as_ref(), &path).await {
                Ok(Some(item)) if item.expires_at <= clock.now() => {
                    if let Err(e) = remove_file_if_exists(&path).await {
                        debug!("Failed to remove expired file {}: {}", path.display(), e);
                    } else {
                        debug!("Lazily removed expired file: {}", path.display());
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("Failed to re-read {}: {}", path.display(), e),
            }
        });
    }
}

impl<V> FileStore<V, JsonCodec> {
    /// Creates a store rooted at `root_dir` using JSON encoding.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            root_dir: root_dir.into(),
            codec: Arc::new(JsonCodec),
            _value: PhantomData,
        }
    }
}

impl<V> Default for FileStore<V, JsonCodec> {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_DIR)
    }
}

#[async_trait]
impl<V, C> Cache<V> for FileStore<V, C>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
    C: Codec,
{
    async fn get(&self, key: &str) -> Result<V> {
        let path = self.filename(key);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        // Unreadable records (e.g. after a format change) read as missing
        let item: FileItem<V> = match self.codec.decode(&bytes) {
            Ok(item) => item,
            Err(e) => {
                debug!("Undecodable record for key {}: {}", key, e);
                return Err(CacheError::NotFound(key.to_string()));
            }
        };

        if item.expires_at <= self.clock.now() {
            self.expire_in_background(path);
            return Err(CacheError::NotFound(key.to_string()));
        }

        Ok(item.value)
    }

    async fn set(&self, key: &str, value: V, lifetime: Duration) -> Result<()> {
        let item = FileItem {
            value,
            expires_at: expires_at(self.clock.now(), lifetime),
        };
        let bytes = self.codec.encode(&item)?;

        let path = self.filename(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Readers only ever see a complete record
        let temp = path.with_extension(format!(
            "{}.{}",
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            TEMP_EXTENSION
        ));
        if let Err(e) = write_then_rename(&temp, &path, &bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        remove_file_if_exists(&self.filename(key)).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root_dir).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn gc(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut removed = 0;
        let mut pending = vec![self.root_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                    continue;
                }
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                // Records that cannot be decoded can never be read again
                let expired = match read_item::<V, C>(self.codec.as_ref(), &path).await {
                    Ok(Some(item)) => item.expires_at <= now,
                    Ok(None) => continue,
                    Err(CacheError::Decode(e)) => {
                        debug!("Collecting undecodable record {}: {}", path.display(), e);
                        true
                    }
                    Err(e) => return Err(e),
                };

                if expired && remove_file_if_exists(&path).await? {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

// == Utility Functions ==
/// Reads and decodes the record at `path`.
///
/// Returns `Ok(None)` when the file is gone and `CacheError::Decode` when it
/// does not hold a record of this store's value type.
async fn read_item<V, C>(codec: &C, path: &Path) -> Result<Option<FileItem<V>>>
where
    V: DeserializeOwned,
    C: Codec,
{
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    codec.decode(&bytes).map(Some)
}

/// Writes `bytes` to `temp` and moves it over `path`.
async fn write_then_rename(temp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(temp, bytes).await?;
    fs::rename(temp, path).await
}

/// Removes a file, returning whether it existed.
async fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
