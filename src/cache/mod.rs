//! Table cache keyed by file identity, with single-flight builds.
//!
//! A table is built once per distinct input (canonical path + modification
//! signature + load options) and shared as an `Arc<Table>`. Concurrent
//! requests for the same key collapse to one in-flight build: the first
//! caller runs the pipeline while duplicates block on the same cell and
//! receive the same table. Loads of different files proceed in parallel.
//!
//! Failed builds are not cached; the next request retries. When a file's
//! modification signature changes, the stale entries for that path are
//! dropped and the table is rebuilt.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::{LoadResult, ReadError};
use crate::models::Table;
use crate::pipeline::{load_file, LoadOptions};

// =============================================================================
// Cache Key
// =============================================================================

/// Identity of one cached build: which file, which version of it, and under
/// which configuration it was loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    /// Modification time in nanoseconds since the epoch.
    mtime_nanos: u128,
    len: u64,
    /// Fingerprint of the load options.
    options: u64,
}

impl CacheKey {
    fn for_file(path: &Path, options: &LoadOptions) -> LoadResult<Self> {
        let canonical = path.canonicalize().map_err(ReadError::from)?;
        let metadata = std::fs::metadata(&canonical).map_err(ReadError::from)?;
        let mtime_nanos = metadata
            .modified()
            .map_err(ReadError::from)?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        options.hash(&mut hasher);

        Ok(Self {
            path: canonical,
            mtime_nanos,
            len: metadata.len(),
            options: hasher.finish(),
        })
    }
}

// =============================================================================
// Table Cache
// =============================================================================

type Entry = Arc<OnceCell<Arc<Table>>>;

/// Process-wide (or caller-owned) cache of built tables.
///
/// Explicitly owned, not ambient: create one and share it where loads
/// happen. Cheap to clone behind an `Arc` if several components need it.
#[derive(Default)]
pub struct TableCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load through the cache.
    ///
    /// Returns the cached table when the file's identity is unchanged;
    /// otherwise builds it (collapsing concurrent identical builds into
    /// one) and caches the result. A failed build caches nothing.
    pub fn load(&self, path: &Path, options: &LoadOptions) -> LoadResult<Arc<Table>> {
        let key = CacheKey::for_file(path, options)?;

        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            // Entries for older versions of this file are dead weight.
            entries.retain(|k, _| k.path != key.path || *k == key);
            entries.entry(key.clone()).or_default().clone()
        };

        if let Some(table) = cell.get() {
            debug!(path = %key.path.display(), "cache hit");
            return Ok(table.clone());
        }

        let table = cell
            .get_or_try_init(|| load_file(&key.path, options).map(Arc::new))?
            .clone();
        Ok(table)
    }

    /// Drop all cached builds of one file.
    pub fn invalidate(&self, path: &Path) {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|k, _| k.path != canonical);
    }

    /// Drop everything.
    pub fn purge(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    /// Number of cached entries (including in-flight builds).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "date_start,latitude,longitude\n2021-05-03,-8.05,-34.9\n";

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_cache_hit_returns_same_table() {
        let file = write_csv(CSV);
        let cache = TableCache::new();
        let options = LoadOptions::default();

        let first = cache.load(file.path(), &options).unwrap();
        let second = cache.load(file.path(), &options).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_different_options_are_different_entries() {
        let file = write_csv(CSV);
        let cache = TableCache::new();

        let a = cache.load(file.path(), &LoadOptions::default()).unwrap();
        let b = cache
            .load(
                file.path(),
                &LoadOptions { require_region: true, ..Default::default() },
            )
            .unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_modification_invalidates() {
        let mut file = write_csv(CSV);
        let cache = TableCache::new();
        let options = LoadOptions::default();

        let first = cache.load(file.path(), &options).unwrap();
        assert_eq!(first.len(), 1);

        // Append a row; rewriting changes the length, so the signature
        // changes even on filesystems with coarse mtime granularity.
        write!(file, "2021-05-04,-8.10,-34.8\n").unwrap();
        file.flush().unwrap();

        let second = cache.load(file.path(), &options).unwrap();
        assert_eq!(second.len(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        // The stale entry is gone.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate() {
        let file = write_csv(CSV);
        let cache = TableCache::new();
        cache.load(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(cache.len(), 1);

        cache.invalidate(file.path());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        // Invalid UTF-8 makes the build fail. A failure must not be latched:
        // the same key retries, and a fixed file loads fine afterwards.
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"date_start\n\xff\n").unwrap();
        file.flush().unwrap();

        let cache = TableCache::new();
        let options = LoadOptions::default();
        assert!(cache.load(file.path(), &options).is_err());
        assert!(cache.load(file.path(), &options).is_err());

        let fixed = write_csv(CSV);
        assert!(cache.load(fixed.path(), &options).is_ok());
    }

    #[test]
    fn test_single_flight_collapses_concurrent_builds() {
        // A big-enough file that the build takes measurable time.
        let mut content = String::from("date_start,latitude,longitude\n");
        for i in 0..5000 {
            content.push_str(&format!("2021-05-03,-8.{:04},-34.9\n", i % 10000));
        }
        let file = write_csv(&content);

        let cache = TableCache::new();
        let options = LoadOptions::default();

        let tables: Vec<Arc<Table>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let cache = &cache;
                    let options = &options;
                    let path = file.path();
                    scope.spawn(move || cache.load(path, options).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        // Every caller got the very same table allocation: one build served
        // all eight threads.
        for table in &tables[1..] {
            assert!(Arc::ptr_eq(&tables[0], table));
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(tables[0].len(), 5000);
    }
}
