//! Collection storage with transparent sharding.
//!
//! A collection is a named JSON object (string key → JSON value) kept under the configured data
//! directory. Every collection name is also a resource in the [`LockManager`], so a
//! [`Checkout`] gives its holder exclusive read-modify-write access until it is persisted or
//! dropped.
//!
//! ## On-disk layout
//!
//! A node with stem `P` is stored either as the file `P.json` or, once it has grown past
//! `max_collection_bytes`, as the directory `P/` holding one `<key>.json` file per top-level
//! key. Shards are nodes themselves and are split again when they outgrow the limit:
//!
//! ```text
//! data/
//!   addresses.json
//!   users/
//!     52998224725.json
//!     11144477735.json
//!   orders/
//!     2610190000.json
//!     2610190001/
//!       products.json
//!       ...
//! ```
//!
//! Loading flattens a directory back into one mapping keyed by file stem, so callers never see
//! whether a collection is sharded. When both `P.json` and `P/` exist (a shard pass that failed
//! before removing the original) the file wins and is split again on the next load.
//!
//! Files are replaced by writing `<file>.tmp` and renaming it over the target.

use crate::config::CoreConfig;
use crate::constants::{COLLECTION_EXTENSION, JSON_INDENT, TEMP_EXTENSION};
use crate::error::{StoreError, StoreResult};
use crate::lock::{LockManager, ResourceGuard};
use crate::validation::validate_shard_key;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// The in-memory form of a collection.
pub type Document = Map<String, Value>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Loads and persists collections under one data directory.
#[derive(Clone, Debug)]
pub struct CollectionStore {
    cfg: Arc<CoreConfig>,
    locks: Arc<LockManager>,
}

impl CollectionStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self::with_locks(cfg, Arc::new(LockManager::new()))
    }

    /// Builds a store that shares `locks` with other holders of the same data directory.
    pub fn with_locks(cfg: Arc<CoreConfig>, locks: Arc<LockManager>) -> Self {
        Self { cfg, locks }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Prepares the data directory for `names`.
    ///
    /// Creates the directory, writes `{}` for collections that do not exist yet, and shards
    /// any collection that is already over the size limit.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::StorageDirCreation` if the data directory cannot be created, or any
    /// error from loading an existing collection.
    pub async fn init(&self, names: &[&str]) -> StoreResult<()> {
        fs::create_dir_all(self.cfg.data_dir())
            .await
            .map_err(StoreError::StorageDirCreation)?;

        for name in names {
            let _guard = self.locks.acquire(name).await;
            let stem = self.cfg.collection_shard_dir(name);
            let file = self.cfg.collection_file(name);

            if !path_exists(&file).await? && !is_dir(&stem).await? {
                atomic_write(&stem, b"{}")
                    .await
                    .map_err(StoreError::FileWrite)?;
                tracing::info!(collection = name, "created empty collection");
            }

            load_collection(name, &stem, self.cfg.max_collection_bytes()).await?;
        }

        Ok(())
    }

    /// Checks out `name` for exclusive use and loads its current content.
    ///
    /// Waits behind earlier checkouts of the same collection. The resource is released when the
    /// returned [`Checkout`] is persisted or dropped, or immediately if loading fails.
    pub async fn checkout(&self, name: &str) -> StoreResult<Checkout> {
        let guard = self.locks.acquire(name).await;
        let stem = self.cfg.collection_shard_dir(name);

        let doc = match load_collection(name, &stem, self.cfg.max_collection_bytes()).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(collection = name, error = %e, "failed to load collection");
                return Err(e);
            }
        };

        Ok(Checkout {
            stem,
            doc,
            guard,
        })
    }

    /// Loads a snapshot of `name` and releases it straight away.
    pub async fn read(&self, name: &str) -> StoreResult<Document> {
        Ok(self.checkout(name).await?.into_document())
    }
}

/// Exclusive, loaded view of one collection.
#[derive(Debug)]
pub struct Checkout {
    stem: PathBuf,
    doc: Document,
    guard: ResourceGuard,
}

impl Checkout {
    pub fn name(&self) -> &str {
        self.guard.name()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn contains(&self, key: &str) -> bool {
        self.doc.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.doc.keys().map(String::as_str)
    }

    /// Deserialises the entry at `key`, if there is one.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        self.doc
            .get(key)
            .map(|value| T::deserialize(value).map_err(StoreError::Deserialization))
            .transpose()
    }

    /// Replaces the entry at `key`. Nothing reaches disk until [`Checkout::persist`].
    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(StoreError::Serialization)?;
        self.doc.insert(key.into(), value);
        Ok(())
    }

    /// Overwrites the collection on disk and releases it, whether or not the write succeeded.
    pub async fn persist(self) -> StoreResult<()> {
        let Checkout { stem, doc, guard } = self;
        let result = write_node(&stem, &Value::Object(doc)).await;
        if let Err(e) = &result {
            tracing::error!(collection = guard.name(), error = %e, "failed to persist collection");
        }
        drop(guard);
        result
    }

    /// Releases the collection without writing.
    pub fn into_document(self) -> Document {
        self.doc
    }
}

async fn load_collection(name: &str, stem: &Path, max_bytes: u64) -> StoreResult<Document> {
    match load_node(stem, max_bytes).await? {
        None => Ok(Document::new()),
        Some(Value::Object(doc)) => Ok(doc),
        Some(_) => Err(StoreError::NotAnObject(name.to_owned())),
    }
}

/// Reads the node at `stem`, sharding it first if its file is over `max_bytes`.
fn load_node(stem: &Path, max_bytes: u64) -> BoxFuture<'_, StoreResult<Option<Value>>> {
    Box::pin(async move {
        if let Some(bytes) = read_if_exists(&node_file(stem)).await? {
            let value: Value =
                serde_json::from_slice(&bytes).map_err(StoreError::Deserialization)?;

            if bytes.len() as u64 > max_bytes {
                match &value {
                    Value::Object(map) => shard_node(stem, map, max_bytes).await?,
                    _ => tracing::warn!(
                        path = %stem.display(),
                        size = bytes.len(),
                        "oversized node is not an object and cannot be sharded"
                    ),
                }
            }
            return Ok(Some(value));
        }

        if is_dir(stem).await? {
            return Ok(Some(Value::Object(load_dir(stem, max_bytes).await?)));
        }

        Ok(None)
    })
}

/// Flattens a shard directory into one mapping keyed by entry stem.
async fn load_dir(dir: &Path, max_bytes: u64) -> StoreResult<Document> {
    let mut doc = Document::new();
    for key in shard_keys(dir).await? {
        if let Some(value) = load_node(&dir.join(&key), max_bytes).await? {
            doc.insert(key, value);
        }
    }
    Ok(doc)
}

/// Splits the node at `stem` into one file per key of `map`.
///
/// The original file is removed only after every shard has been written. Shards that are
/// themselves over the limit are split in turn.
fn shard_node<'a>(
    stem: &'a Path,
    map: &'a Document,
    max_bytes: u64,
) -> BoxFuture<'a, StoreResult<()>> {
    Box::pin(async move {
        for key in map.keys() {
            validate_shard_key(key)?;
        }

        match fs::create_dir(stem).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(source) => {
                return Err(StoreError::ShardDirCreation {
                    path: stem.to_path_buf(),
                    source,
                })
            }
        }

        let mut oversized = Vec::new();
        for (key, value) in map {
            let bytes = to_pretty_json(value)?;
            atomic_write(&stem.join(key), &bytes)
                .await
                .map_err(|source| StoreError::ShardWrite {
                    key: key.clone(),
                    source,
                })?;
            if bytes.len() as u64 > max_bytes {
                oversized.push(key);
            }
        }

        prune_stale(stem, map).await?;
        fs::remove_file(node_file(stem))
            .await
            .map_err(StoreError::FileRemove)?;
        tracing::info!(path = %stem.display(), shards = map.len(), "sharded oversized node");

        for key in oversized {
            match map.get(key) {
                Some(Value::Object(child)) => {
                    shard_node(&stem.join(key), child, max_bytes).await?;
                }
                _ => tracing::warn!(
                    path = %stem.display(),
                    key = %key,
                    "oversized shard is not an object and cannot be sharded"
                ),
            }
        }

        Ok(())
    })
}

/// Writes `value` back to wherever the node at `stem` currently lives.
///
/// An object whose node is a shard directory is written one key per file; anything else
/// replaces the node's file.
fn write_node<'a>(stem: &'a Path, value: &'a Value) -> BoxFuture<'a, StoreResult<()>> {
    Box::pin(async move {
        let sharded = !path_exists(&node_file(stem)).await? && is_dir(stem).await?;

        if let (true, Value::Object(map)) = (sharded, value) {
            for (key, child) in map {
                validate_shard_key(key)?;
                write_node(&stem.join(key), child).await?;
            }
            return prune_stale(stem, map).await;
        }

        let bytes = to_pretty_json(value)?;
        atomic_write(stem, &bytes)
            .await
            .map_err(StoreError::FileWrite)?;

        if is_dir(stem).await? {
            fs::remove_dir_all(stem)
                .await
                .map_err(StoreError::FileRemove)?;
        }
        Ok(())
    })
}

/// Removes entries of `dir` whose key is no longer in `map`.
async fn prune_stale(dir: &Path, map: &Document) -> StoreResult<()> {
    for key in shard_keys(dir).await? {
        if map.contains_key(&key) {
            continue;
        }
        let stem = dir.join(&key);
        if is_dir(&stem).await? {
            fs::remove_dir_all(&stem)
                .await
                .map_err(StoreError::FileRemove)?;
        }
        let file = node_file(&stem);
        if path_exists(&file).await? {
            fs::remove_file(&file)
                .await
                .map_err(StoreError::FileRemove)?;
        }
        tracing::debug!(path = %stem.display(), "removed stale shard");
    }
    Ok(())
}

/// Keys stored in a shard directory: `.json` file stems and subdirectory names.
async fn shard_keys(dir: &Path) -> StoreResult<BTreeSet<String>> {
    let mut keys = BTreeSet::new();
    let mut entries = fs::read_dir(dir).await.map_err(StoreError::FileRead)?;

    while let Some(entry) = entries.next_entry().await.map_err(StoreError::FileRead)? {
        let file_type = entry.file_type().await.map_err(StoreError::FileRead)?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        let key = if file_type.is_dir() {
            Some(name)
        } else {
            name.strip_suffix(&format!(".{COLLECTION_EXTENSION}"))
                .map(str::to_owned)
        };
        keys.extend(key);
    }

    Ok(keys)
}

fn with_suffix(stem: &Path, extension: &str) -> PathBuf {
    let mut path = OsString::from(stem.as_os_str());
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// `<stem>.json`. Appended rather than substituted so keys containing dots stay intact.
fn node_file(stem: &Path) -> PathBuf {
    with_suffix(stem, COLLECTION_EXTENSION)
}

/// Replaces `<stem>.json` via a temporary sibling and a rename.
async fn atomic_write(stem: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp = with_suffix(stem, TEMP_EXTENSION);

    let mut file = fs::File::create(&temp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp, node_file(stem)).await
}

fn to_pretty_json(value: &Value) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(JSON_INDENT));
    value
        .serialize(&mut serializer)
        .map_err(StoreError::Serialization)?;
    Ok(buf)
}

async fn read_if_exists(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::FileRead(e)),
    }
}

async fn path_exists(path: &Path) -> StoreResult<bool> {
    fs::try_exists(path).await.map_err(StoreError::FileRead)
}

async fn is_dir(path: &Path) -> StoreResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::FileRead(e)),
    }
}
