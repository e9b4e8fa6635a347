//! Result cache for transformed images.
//!
//! Decoding, resampling and encoding dominate the cost of serving a
//! transformed image. This module lets callers skip all three when the same
//! source has already been rendered with the same parameters.
//!
//! # Design
//!
//! The cache is an explicit service handed to the
//! [`Pipeline`](crate::pipeline::Pipeline) by its owner. There is no global
//! state: the application decides which store to use and how long it lives.
//!
//! ## Cache keys
//!
//! A [`CacheKey`] is the SHA-256 of a canonical, length-delimited encoding of:
//!
//! - **source identity**: canonical path + last-modification time. Touching
//!   or replacing the file changes the mtime and therefore the key.
//! - **render parameters**: the fully-resolved [`TransformParams`]: resize
//!   target, crop rectangle, canvas, format, quality, autorotate. Zero sizes
//!   are already derived from the source, and the mode only shows through the
//!   geometry it produced, so requests that render identical bytes share a key.
//!
//! Fields are written in a fixed order with fixed-width integers, presence
//! bytes for optional geometry and NUL-terminated tags, so no two distinct
//! field lists share an encoding.
//! Bump [`KEY_VERSION`] to invalidate every existing entry when the encoding
//! or the rendering changes.
//!
//! ## Stores
//!
//! - [`MemoryStore`]: in-process `moka` cache with an optional entry cap.
//! - [`DiskStore`]: one file per key, written atomically via rename.
//! - [`TieredStore`]: memory in front of disk.
//!
//! Stores only promise that individual `get`/`put` calls are safe to run
//! concurrently and that the last `put` for a key wins. Two concurrent misses
//! for the same key both render and both store; the bytes are identical.

use crate::imaging::TransformParams;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Version of the key encoding. Part of every key.
pub const KEY_VERSION: u32 = 2;

/// File extension for entries written by [`DiskStore`].
const ENTRY_EXTENSION: &str = "bin";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Where a source lives and when it last changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl SourceIdentity {
    pub fn new(path: impl Into<PathBuf>, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }

    /// Read identity from the filesystem, canonicalising the path so that
    /// `a/./b.jpg` and `a/b.jpg` share entries.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let path = std::fs::canonicalize(path)?;
        let modified = std::fs::metadata(&path)?.modified()?;
        Ok(Self { path, modified })
    }
}

/// Composite identity of a (source version, transform parameters) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Lowercase hex SHA-256, 64 characters.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the cache key for rendering `params` from `source`.
///
/// Pure and deterministic: equal inputs always produce equal keys. The source
/// bytes inside `params` are not hashed; `source` stands in for them.
pub fn compute_cache_key(source: &SourceIdentity, params: &TransformParams<'_>) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(b"simple-thumbs\0");
    hasher.update(KEY_VERSION.to_le_bytes());

    let path = source.path.as_os_str().as_encoded_bytes();
    hasher.update((path.len() as u64).to_le_bytes());
    hasher.update(path);

    // Pre-epoch timestamps are legal on some filesystems
    match source.modified.duration_since(UNIX_EPOCH) {
        Ok(after) => {
            hasher.update(b"+");
            hasher.update(after.as_secs().to_le_bytes());
            hasher.update(after.subsec_nanos().to_le_bytes());
        }
        Err(before) => {
            let before = before.duration();
            hasher.update(b"-");
            hasher.update(before.as_secs().to_le_bytes());
            hasher.update(before.subsec_nanos().to_le_bytes());
        }
    }

    let plan = &params.plan;
    hasher.update(plan.width.to_le_bytes());
    hasher.update(plan.height.to_le_bytes());
    match plan.crop {
        Some(rect) => {
            hasher.update([1]);
            for v in [rect.x, rect.y, rect.width, rect.height] {
                hasher.update(v.to_le_bytes());
            }
        }
        None => hasher.update([0]),
    }
    match plan.canvas {
        Some((width, height)) => {
            hasher.update([1]);
            hasher.update(width.to_le_bytes());
            hasher.update(height.to_le_bytes());
        }
        None => hasher.update([0]),
    }
    hasher.update(params.format.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(params.quality.value().to_le_bytes());
    hasher.update([params.autorotate as u8]);

    CacheKey(format!("{:x}", hasher.finalize()))
}

/// Key → encoded bytes.
///
/// Implementations must tolerate concurrent `get`/`put` from many threads.
/// Eviction is entirely the store's business.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `bytes` under `key`, replacing any previous entry.
    fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError>;
}

/// `None` is a disabled cache: every probe misses and writes are dropped.
impl<S: CacheStore> CacheStore for Option<S> {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        match self {
            Some(store) => store.get(key),
            None => Ok(None),
        }
    }

    fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        match self {
            Some(store) => store.put(key, bytes),
            None => Ok(()),
        }
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-process store with an optional entry cap.
///
/// Backed by a `moka` cache: lookups never block each other, and once the
/// cap is reached the least valuable entries are evicted.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<CacheKey, Arc<[u8]>>,
}

impl MemoryStore {
    /// A store that never evicts.
    pub fn unbounded() -> Self {
        Self {
            entries: Cache::builder().build(),
        }
    }

    /// A store holding at most `capacity` entries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity.max(1) as u64)
                .build(),
        }
    }

    /// Number of live entries, after applying pending evictions.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries.entry_count())
            .field("capacity", &self.entries.policy().max_capacity())
            .finish()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).map(|bytes| bytes.to_vec()))
    }

    fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        self.entries.insert(key.clone(), Arc::from(bytes));
        Ok(())
    }
}

// =============================================================================
// DiskStore
// =============================================================================

/// Distinguishes temporary files written concurrently by one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One file per key under a directory.
///
/// Entries are written to a temporary file and renamed into place, so a
/// reader sees either the previous entry or the complete new one.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve the file path for a key.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(format!("{}.{}", key.as_str(), ENTRY_EXTENSION))
    }
}

impl CacheStore for DiskStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        match std::fs::read(self.entry_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let temp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            key.as_str(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = std::fs::write(&temp, bytes) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }
        if let Err(e) = std::fs::rename(&temp, self.entry_path(key)) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }
}

// =============================================================================
// TieredStore
// =============================================================================

/// Memory in front of disk. Disk hits are copied into memory.
#[derive(Debug)]
pub struct TieredStore {
    memory: Option<MemoryStore>,
    disk: DiskStore,
}

impl TieredStore {
    pub fn new(memory: Option<MemoryStore>, disk: DiskStore) -> Self {
        Self { memory, disk }
    }

    pub fn memory(&self) -> Option<&MemoryStore> {
        self.memory.as_ref()
    }

    pub fn disk(&self) -> &DiskStore {
        &self.disk
    }
}

impl CacheStore for TieredStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(memory) = &self.memory
            && let Some(bytes) = memory.get(key)?
        {
            return Ok(Some(bytes));
        }
        let found = self.disk.get(key)?;
        if let (Some(memory), Some(bytes)) = (&self.memory, &found) {
            memory.put(key, bytes)?;
        }
        Ok(found)
    }

    fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        if let Some(memory) = &self.memory {
            memory.put(key, bytes)?;
        }
        self.disk.put(key, bytes)
    }
}

// =============================================================================
// CacheStats
// =============================================================================

/// Hit/miss counters, shareable across threads.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU32,
    misses: AtomicU32,
}

impl CacheStats {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u32 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u32 {
        self.hits() + self.misses()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits() > 0 {
            write!(
                f,
                "{} cached, {} encoded ({} total)",
                self.hits(),
                self.misses(),
                self.total()
            )
        } else {
            write!(f, "{} encoded", self.misses())
        }
    }
}
