//! Template and include caches.
//!
//! Every page names a template (`base.html` unless it declares another) and
//! may reference any number of includes. Most pages share the same handful
//! of files, so each one is read from storage once and then served from
//! memory for the rest of the build.
//!
//! # Design
//!
//! A [`FileCache`] maps a file name to its raw contents. Entries are created
//! lazily on first request and never evicted or invalidated: a process runs
//! exactly one build, so a file cannot change underneath it in a way the
//! build should observe.
//!
//! ## Concurrency
//!
//! Pages render in parallel, so the cache is shared across rayon workers:
//!
//! - **Hits** take only a read lock on the entry map.
//! - **Misses** take a dedicated load mutex, re-check the map, and only then
//!   read storage. Two workers asking for the same uncached file at the same
//!   time produce exactly one read; the second finds the entry on re-check.
//!
//! Failed loads are not cached. A missing file fails every page that
//! references it, each with its own error.
//!
//! ## Storage
//!
//! Reads go through the [`Storage`] trait so tests can count them. The
//! production implementation is [`FsStorage`], rooted at the templates or
//! includes directory.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("file not found: {name}")]
    NotFound { name: String },
    #[error("invalid file name (must be relative, without '..'): {name}")]
    InvalidName { name: String },
    #[error("failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Source of raw file contents, keyed by name relative to a root.
///
/// `Sync` so a single cache can be shared by rayon workers.
pub trait Storage: Sync {
    fn read(&self, name: &str) -> io::Result<String>;
}

/// Reads files from a directory on disk.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Storage for FsStorage {
    fn read(&self, name: &str) -> io::Result<String> {
        std::fs::read_to_string(self.root.join(name))
    }
}

/// Memoized get-or-load map from file name to contents.
pub struct FileCache<S: Storage = FsStorage> {
    storage: S,
    entries: RwLock<HashMap<String, Arc<str>>>,
    load_lock: Mutex<()>,
    hits: AtomicU32,
    reads: AtomicU32,
}

/// Cache of template files, rooted at the templates directory.
pub type TemplateStore<S = FsStorage> = FileCache<S>;

/// Cache of include fragments, rooted at the includes directory.
pub type IncludeCache<S = FsStorage> = FileCache<S>;

impl FileCache<FsStorage> {
    /// Cache backed by files under `root`.
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self::new(FsStorage::new(root))
    }
}

impl<S: Storage> FileCache<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            entries: RwLock::new(HashMap::new()),
            load_lock: Mutex::new(()),
            hits: AtomicU32::new(0),
            reads: AtomicU32::new(0),
        }
    }

    /// Return the contents of `name`, reading storage only on the first request.
    pub fn get_or_load(&self, name: &str) -> Result<Arc<str>, CacheError> {
        validate_name(name)?;

        if let Some(hit) = self.lookup(name) {
            return Ok(hit);
        }

        let _guard = self.load_lock.lock();
        if let Some(hit) = self.lookup(name) {
            return Ok(hit);
        }

        self.reads.fetch_add(1, Ordering::Relaxed);
        let content: Arc<str> = self
            .storage
            .read(name)
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => CacheError::NotFound {
                    name: name.to_string(),
                },
                _ => CacheError::Io {
                    name: name.to_string(),
                    source,
                },
            })?
            .into();

        self.entries
            .write()
            .insert(name.to_string(), Arc::clone(&content));
        Ok(content)
    }

    /// Whether `name` is already loaded.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Number of distinct files loaded so far.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<str>> {
        let hit = self.entries.read().get(name).cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }
}

/// Reject names that would escape the cache root.
fn validate_name(name: &str) -> Result<(), CacheError> {
    let path = Path::new(name);
    let escapes = name.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(CacheError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Lookup counters for one cache over a build.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from memory.
    pub hits: u32,
    /// Lookups that went to storage (successful or not).
    pub reads: u32,
}

impl CacheStats {
    pub fn total(&self) -> u32 {
        self.hits + self.reads
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} read, {} cached ({} lookups)",
                self.reads,
                self.hits,
                self.total()
            )
        } else {
            write!(f, "{} read", self.reads)
        }
    }
}
