// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Directory Cache Sidecar
//!
//! Persists the rendered entry list of a directory next to it so repeated
//! menu requests skip the listdir/populate walk. The sidecar is a bincode
//! record with a version header; anything that fails to decode, or carries
//! another version, is treated as a miss.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Best-effort on-disk cache of directory entry lists

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::domain::entry::Entry;
use crate::domain::error::{GopherError, Result};
use crate::domain::selector;
use crate::domain::vfs::Vfs;

const DIR_CACHE_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct DirCacheFile {
    version: u32,
    entries: Vec<Entry>,
}

/// Cache location and lifetime for one directory
#[derive(Debug, Clone)]
pub struct DirCache {
    cache_selector: String,
    dir_selector: String,
    ttl_secs: u64,
}

impl DirCache {
    pub fn new(dir_selector: &str, cachefile: &str, ttl_secs: u64) -> Self {
        Self {
            cache_selector: selector::join(dir_selector, cachefile),
            dir_selector: dir_selector.to_string(),
            ttl_secs,
        }
    }

    pub fn cache_selector(&self) -> &str {
        &self.cache_selector
    }

    /// Entries from a fresh sidecar, or `None` on any miss.
    pub fn load(&self, vfs: &dyn Vfs) -> Option<Vec<Entry>> {
        if self.ttl_secs == 0 {
            return None;
        }
        let stat = vfs.stat(&self.cache_selector).ok()?;
        let age = chrono::Utc::now().timestamp() - stat.mtime;
        if age < 0 || age as u64 >= self.ttl_secs {
            tracing::trace!(cache = %self.cache_selector, age, "Directory cache expired");
            return None;
        }
        let bytes = vfs.read_all(&self.cache_selector).ok()?;
        match decode(&bytes) {
            Ok(entries) => {
                tracing::debug!(dir = %self.dir_selector, entries = entries.len(), "Directory cache hit");
                Some(entries)
            }
            Err(e) => {
                tracing::debug!(cache = %self.cache_selector, error = %e, "Ignoring directory cache");
                None
            }
        }
    }

    /// Write the sidecar when the directory is writable. Failures are logged
    /// and otherwise ignored; concurrent writers race and the last one wins.
    pub fn save(&self, vfs: &dyn Vfs, entries: &[Entry]) {
        if self.ttl_secs == 0 || !vfs.iswritable(&self.dir_selector) {
            return;
        }
        let result = encode(entries).and_then(|bytes| {
            let mut sink = vfs.create(&self.cache_selector)?;
            sink.write_all(&bytes)?;
            Ok(())
        });
        if let Err(e) = result {
            tracing::debug!(cache = %self.cache_selector, error = %e, "Could not write directory cache");
        }
    }
}

fn encode(entries: &[Entry]) -> Result<Vec<u8>> {
    let record = DirCacheFile {
        version: DIR_CACHE_VERSION,
        entries: entries.to_vec(),
    };
    bincode::serialize(&record).map_err(|e| GopherError::Cache(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Vec<Entry>> {
    let record: DirCacheFile =
        bincode::deserialize(bytes).map_err(|e| GopherError::Cache(e.to_string()))?;
    if record.version != DIR_CACHE_VERSION {
        return Err(GopherError::Cache(format!(
            "unsupported cache version {}",
            record.version
        )));
    }
    Ok(record.entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::vfs::real::RealVfs;
    use tempfile::TempDir;

    fn sample() -> Vec<Entry> {
        let mut a = Entry::new("/d/a.txt");
        a.gopher_type = Some('0');
        a.name = Some("a.txt".into());
        a.ea.insert("ABSTRACT".into(), b"about a".to_vec());
        let mut b = Entry::new("/d/sub");
        b.gopher_type = Some('1');
        vec![a, b]
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("d")).unwrap();
        let vfs = RealVfs::new(dir.path());
        let cache = DirCache::new("/d", ".cache.pygopherd.dir", 180);
        assert!(cache.load(&vfs).is_none());
        cache.save(&vfs, &sample());
        assert_eq!(cache.load(&vfs).unwrap(), sample());
    }

    #[test]
    fn test_zero_ttl_disables() {
        let dir = TempDir::new().unwrap();
        let vfs = RealVfs::new(dir.path());
        let cache = DirCache::new("/", ".cache.pygopherd.dir", 0);
        cache.save(&vfs, &sample());
        assert!(!dir.path().join(".cache.pygopherd.dir").exists());
        assert!(cache.load(&vfs).is_none());
    }

    #[test]
    fn test_garbage_is_a_miss() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".cache.pygopherd.dir"), b"\x00\x01junk").unwrap();
        let vfs = RealVfs::new(dir.path());
        let cache = DirCache::new("/", ".cache.pygopherd.dir", 180);
        assert!(cache.load(&vfs).is_none());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let bytes = bincode::serialize(&DirCacheFile {
            version: 1,
            entries: sample(),
        })
        .unwrap();
        assert!(decode(&bytes).is_err());
    }
}
