// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! ZIP Archive VFS Overlay
//!
//! Presents the members of a ZIP archive as a directory tree mounted at the
//! archive's own selector (`/docs/bundle.zip/inner/file.txt`). Selectors
//! outside the archive are passed to the underlying VFS, so overlays chain.
//!
//! **Inode cache:**
//! The archive's flat member list is folded into a map of string inodes.
//! Inode `"0"` is the archive root; every value is either the member name of
//! a regular file or a directory table of `basename → inode`. Symbolic links
//! (Unix mode `S_IFLNK` in the external attributes) are resolved by pointing
//! the link's name at its target's inode, iterating to a fixpoint so chains
//! of links resolve. Cycles and dangling links stay absent.
//!
//! The cache is stored next to the archive as
//! `.cache.pygopherd.zip3.<archive name>` when the underlying filesystem is a
//! writable real directory, and is rebuilt whenever the archive is newer than
//! the sidecar or the sidecar cannot be decoded.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use zip::ZipArchive;

use crate::domain::selector;
use crate::domain::vfs::{FileKind, SharedVfs, VFile, Vfs, VfsStat};

const CACHE_PREFIX: &str = ".cache.pygopherd.zip3.";
const CACHE_VERSION: u32 = 1;
const ROOT_INODE: &str = "0";

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// One node of the inode cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inode {
    /// Regular file: the archive member name.
    File(String),
    /// Directory: child basename → inode.
    Dir(BTreeMap<String, String>),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    inodes: HashMap<String, Inode>,
}

/// Build-time state for the inode table.
#[derive(Debug, Default)]
struct InodeTable {
    inodes: HashMap<String, Inode>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut inodes = HashMap::new();
        inodes.insert(ROOT_INODE.to_string(), Inode::Dir(BTreeMap::new()));
        Self { inodes, next: 1 }
    }

    fn alloc(&mut self, node: Inode) -> String {
        let id = self.next.to_string();
        self.next += 1;
        self.inodes.insert(id.clone(), node);
        id
    }

    fn child(&self, dir: &str, name: &str) -> Option<String> {
        match self.inodes.get(dir) {
            Some(Inode::Dir(children)) => children.get(name).cloned(),
            _ => None,
        }
    }

    fn link(&mut self, dir: &str, name: &str, inode: String) {
        if let Some(Inode::Dir(children)) = self.inodes.get_mut(dir) {
            children.insert(name.to_string(), inode);
        }
    }

    /// Walk (creating directories) down to the directory holding `components`.
    fn ensure_dir(&mut self, components: &[&str]) -> Option<String> {
        let mut current = ROOT_INODE.to_string();
        for component in components {
            current = match self.child(&current, component) {
                Some(existing) => match self.inodes.get(&existing) {
                    Some(Inode::Dir(_)) => existing,
                    _ => return None,
                },
                None => {
                    let id = self.alloc(Inode::Dir(BTreeMap::new()));
                    self.link(&current, component, id.clone());
                    id
                }
            };
        }
        Some(current)
    }

    fn add_file(&mut self, member: &str) {
        let components = split_components(member);
        let Some((last, parents)) = components.split_last() else {
            return;
        };
        if let Some(dir) = self.ensure_dir(parents) {
            if self.child(&dir, last).is_none() {
                let id = self.alloc(Inode::File(member.to_string()));
                self.link(&dir, last, id);
            }
        }
    }

    fn add_dir(&mut self, member: &str) {
        let components = split_components(member);
        self.ensure_dir(&components);
    }

    /// Resolve pending `(link path, target)` pairs until no more progress.
    fn resolve_symlinks(&mut self, mut pending: Vec<(String, String)>) {
        let limit = pending.len() + 1;
        for _ in 0..limit {
            if pending.is_empty() {
                break;
            }
            let mut deferred = Vec::new();
            let mut progressed = false;
            for (link, target) in pending {
                let target_path = resolve_target(&link, &target);
                match lookup(&self.inodes, &target_path) {
                    Some(inode) => {
                        let components = split_components(&link);
                        if let Some((last, parents)) = components.split_last() {
                            if let Some(dir) = self.ensure_dir(parents) {
                                self.link(&dir, last, inode);
                                progressed = true;
                            }
                        }
                    }
                    None => deferred.push((link, target)),
                }
            }
            pending = deferred;
            if !progressed {
                break;
            }
        }
        for (link, target) in &pending {
            tracing::debug!(link = %link, target = %target, "Leaving unresolved archive symlink");
        }
    }
}

fn split_components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty() && *c != ".").collect()
}

/// Absolute targets are relative to the archive root; relative targets to
/// the link's own directory.
fn resolve_target(link: &str, target: &str) -> String {
    if target.starts_with('/') {
        selector::normpath(target)
    } else {
        let link = format!("/{}", link.trim_start_matches('/'));
        let parent = selector::dirname(&link);
        selector::normpath(&format!("{}/{}", parent, target))
    }
}

fn lookup(inodes: &HashMap<String, Inode>, path: &str) -> Option<String> {
    let mut current = ROOT_INODE.to_string();
    for component in split_components(path) {
        current = match inodes.get(&current) {
            Some(Inode::Dir(children)) => children.get(component)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

/// Read-only VFS over one archive member of the underlying VFS
pub struct ZipVfs {
    chain: SharedVfs,
    zip_selector: String,
    archive: Mutex<ZipArchive<Box<dyn VFile>>>,
    inodes: HashMap<String, Inode>,
    archive_stat: VfsStat,
}

impl fmt::Debug for ZipVfs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipVfs")
            .field("zip_selector", &self.zip_selector)
            .field("inodes", &self.inodes.len())
            .field("chain", &self.chain)
            .finish()
    }
}

/// A symlink member's target. Undecodable bytes are escaped the way
/// selectors are, so one odd link cannot spoil the whole archive.
fn read_link_target(member: &mut impl Read) -> io::Result<String> {
    let mut target = Vec::new();
    member.read_to_end(&mut target)?;
    Ok(selector::decode_bytes(&target))
}

fn zip_err(e: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

impl ZipVfs {
    /// Mount the archive at `zip_selector` of `chain`.
    pub fn new(chain: SharedVfs, zip_selector: &str) -> io::Result<Self> {
        let archive_stat = chain.stat(zip_selector)?;
        let file = chain.open(zip_selector)?;
        let mut archive = ZipArchive::new(file).map_err(zip_err)?;

        let cache_selector = Self::cache_selector(zip_selector);
        let inodes = match Self::load_cache(&chain, &cache_selector, &archive_stat) {
            Some(inodes) => inodes,
            None => {
                let inodes = Self::build_cache(&mut archive)?;
                Self::save_cache(&chain, &cache_selector, &inodes);
                inodes
            }
        };

        tracing::debug!(
            archive = %zip_selector,
            inodes = inodes.len(),
            "Mounted ZIP archive"
        );

        Ok(Self {
            chain,
            zip_selector: zip_selector.to_string(),
            archive: Mutex::new(archive),
            inodes,
            archive_stat,
        })
    }

    pub fn zip_selector(&self) -> &str {
        &self.zip_selector
    }

    pub fn inodes(&self) -> &HashMap<String, Inode> {
        &self.inodes
    }

    fn cache_selector(zip_selector: &str) -> String {
        let name = format!("{}{}", CACHE_PREFIX, selector::basename(zip_selector));
        selector::join(selector::dirname(zip_selector), &name)
    }

    fn load_cache(
        chain: &SharedVfs,
        cache_selector: &str,
        archive_stat: &VfsStat,
    ) -> Option<HashMap<String, Inode>> {
        let cache_stat = chain.stat(cache_selector).ok()?;
        if archive_stat.mtime > cache_stat.mtime {
            tracing::debug!(cache = %cache_selector, "ZIP cache older than archive");
            return None;
        }
        let bytes = chain.read_all(cache_selector).ok()?;
        match bincode::deserialize::<CacheFile>(&bytes) {
            Ok(cache) if cache.version == CACHE_VERSION => Some(cache.inodes),
            Ok(cache) => {
                tracing::debug!(version = cache.version, "Ignoring ZIP cache with old version");
                None
            }
            Err(e) => {
                tracing::debug!(cache = %cache_selector, error = %e, "Discarding unreadable ZIP cache");
                None
            }
        }
    }

    fn save_cache(chain: &SharedVfs, cache_selector: &str, inodes: &HashMap<String, Inode>) {
        let dir = selector::dirname(cache_selector);
        if chain.real_path(cache_selector).is_none() || !chain.iswritable(dir) {
            return;
        }
        let cache = CacheFile {
            version: CACHE_VERSION,
            inodes: inodes.clone(),
        };
        let result = bincode::serialize(&cache)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
            .and_then(|bytes| chain.create(cache_selector)?.write_all(&bytes));
        if let Err(e) = result {
            tracing::debug!(cache = %cache_selector, error = %e, "Could not write ZIP cache");
        }
    }

    fn build_cache(archive: &mut ZipArchive<Box<dyn VFile>>) -> io::Result<HashMap<String, Inode>> {
        let mut table = InodeTable::new();
        let mut symlinks = Vec::new();
        for index in 0..archive.len() {
            let mut member = archive.by_index(index).map_err(zip_err)?;
            let name = member.name().to_string();
            let mode = member.unix_mode().unwrap_or(0);
            if mode & S_IFMT == S_IFLNK {
                symlinks.push((name, read_link_target(&mut member)?));
            } else if member.is_dir() {
                table.add_dir(&name);
            } else {
                table.add_file(&name);
            }
        }
        table.resolve_symlinks(symlinks);
        Ok(table.inodes)
    }

    /// Archive-relative path for a selector inside the mount, or `None` when
    /// the selector belongs to the underlying VFS.
    fn inner_path<'a>(&self, sel: &'a str) -> Option<&'a str> {
        if sel == self.zip_selector {
            return Some("");
        }
        sel.strip_prefix(self.zip_selector.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }

    fn inode_for(&self, inner: &str) -> io::Result<&Inode> {
        lookup(&self.inodes, inner)
            .and_then(|id| self.inodes.get(&id))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{}/{}: not in archive", self.zip_selector, inner),
                )
            })
    }

    fn member_stat(&self, member: &str) -> io::Result<VfsStat> {
        let mut archive = self.archive.lock();
        let file = archive.by_name(member).map_err(zip_err)?;
        let mtime = file
            .last_modified()
            .and_then(zip_timestamp)
            .unwrap_or(self.archive_stat.mtime);
        Ok(VfsStat {
            kind: FileKind::File,
            size: file.size(),
            mtime,
            ctime: mtime,
            mode: file.unix_mode().map(|m| m & 0o7777).unwrap_or(0o644),
        })
    }
}

fn zip_timestamp(dt: zip::DateTime) -> Option<i64> {
    chrono::NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)?
        .and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)
        .map(|naive| naive.and_utc().timestamp())
}

impl Vfs for ZipVfs {
    fn stat(&self, sel: &str) -> io::Result<VfsStat> {
        let Some(inner) = self.inner_path(sel) else {
            return self.chain.stat(sel);
        };
        match self.inode_for(inner)? {
            Inode::File(member) => self.member_stat(member),
            Inode::Dir(_) => Ok(VfsStat {
                kind: FileKind::Dir,
                size: 0,
                mtime: self.archive_stat.mtime,
                ctime: self.archive_stat.ctime,
                mode: 0o755,
            }),
        }
    }

    fn open(&self, sel: &str) -> io::Result<Box<dyn VFile>> {
        let Some(inner) = self.inner_path(sel) else {
            return self.chain.open(sel);
        };
        match self.inode_for(inner)? {
            Inode::File(member) => {
                let mut archive = self.archive.lock();
                let mut file = archive.by_name(member).map_err(zip_err)?;
                let mut body = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut body)?;
                Ok(Box::new(Cursor::new(body)))
            }
            Inode::Dir(_) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: is a directory", sel),
            )),
        }
    }

    fn listdir(&self, sel: &str) -> io::Result<Vec<String>> {
        let Some(inner) = self.inner_path(sel) else {
            return self.chain.listdir(sel);
        };
        match self.inode_for(inner)? {
            Inode::Dir(children) => Ok(children.keys().cloned().collect()),
            Inode::File(_) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: not a directory", sel),
            )),
        }
    }

    fn getfspath(&self, sel: &str) -> String {
        match self.inner_path(sel) {
            Some(inner) => format!("{}!/{}", self.zip_selector, inner),
            None => self.chain.getfspath(sel),
        }
    }

    fn real_path(&self, sel: &str) -> Option<PathBuf> {
        match self.inner_path(sel) {
            Some(_) => None,
            None => self.chain.real_path(sel),
        }
    }

    fn iswritable(&self, sel: &str) -> bool {
        match self.inner_path(sel) {
            Some(_) => false,
            None => self.chain.iswritable(sel),
        }
    }

    fn create(&self, sel: &str) -> io::Result<Box<dyn Write + Send>> {
        match self.inner_path(sel) {
            Some(_) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: archive is read-only", sel),
            )),
            None => self.chain.create(sel),
        }
    }

    fn unlink(&self, sel: &str) -> io::Result<()> {
        match self.inner_path(sel) {
            Some(_) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: archive is read-only", sel),
            )),
            None => self.chain.unlink(sel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::vfs::real::RealVfs;
    use std::sync::Arc;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn build_archive(path: &std::path::Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let opts = SimpleFileOptions::default();
        zip.add_directory("pygopherd/", opts).unwrap();
        zip.start_file("pygopherd/ziponly", opts).unwrap();
        zip.write_all(b"ZIPonly\n").unwrap();
        zip.start_file("pygopherd/sub/deep.txt", opts).unwrap();
        zip.write_all(b"deep\n").unwrap();
        zip.add_symlink("pygopherd/link", "ziponly", opts).unwrap();
        zip.add_symlink("pygopherd/chain", "link", opts).unwrap();
        zip.add_symlink("dirlink", "/pygopherd/sub", opts).unwrap();
        zip.add_symlink("loop-a", "loop-b", opts).unwrap();
        zip.add_symlink("loop-b", "loop-a", opts).unwrap();
        zip.add_symlink("dangling", "nowhere", opts).unwrap();
        zip.finish().unwrap();
    }

    fn mount() -> (TempDir, SharedVfs, ZipVfs) {
        let dir = TempDir::new().unwrap();
        build_archive(&dir.path().join("testdata.zip"));
        std::fs::write(dir.path().join("outside.txt"), "outside").unwrap();
        let real: SharedVfs = Arc::new(RealVfs::new(dir.path()));
        let zip = ZipVfs::new(real.clone(), "/testdata.zip").unwrap();
        (dir, real, zip)
    }

    #[test]
    fn test_members_exist() {
        let (_dir, _real, zip) = mount();
        assert!(zip.isdir("/testdata.zip"));
        assert!(zip.isdir("/testdata.zip/pygopherd"));
        assert!(zip.isfile("/testdata.zip/pygopherd/ziponly"));
        assert!(zip.isdir("/testdata.zip/pygopherd/sub"));
        assert!(zip.isfile("/testdata.zip/pygopherd/sub/deep.txt"));
        assert!(!zip.exists("/testdata.zip/pygopherd/missing"));
        assert_eq!(zip.stat("/testdata.zip/pygopherd/ziponly").unwrap().size, 8);
    }

    #[test]
    fn test_read_member() {
        let (_dir, _real, zip) = mount();
        let body = zip.read_all("/testdata.zip/pygopherd/ziponly").unwrap();
        assert_eq!(body, b"ZIPonly\n");
    }

    #[test]
    fn test_symlinks_follow_targets() {
        let (_dir, _real, zip) = mount();
        assert_eq!(zip.read_all("/testdata.zip/pygopherd/link").unwrap(), b"ZIPonly\n");
        assert_eq!(zip.read_all("/testdata.zip/pygopherd/chain").unwrap(), b"ZIPonly\n");
        assert!(zip.isdir("/testdata.zip/dirlink"));
        assert!(zip.isfile("/testdata.zip/dirlink/deep.txt"));
    }

    #[test]
    fn test_cyclic_and_dangling_links_absent() {
        let (_dir, _real, zip) = mount();
        assert!(!zip.exists("/testdata.zip/loop-a"));
        assert!(!zip.exists("/testdata.zip/loop-b"));
        assert!(!zip.exists("/testdata.zip/dangling"));
    }

    #[test]
    fn test_listdir_root() {
        let (_dir, _real, zip) = mount();
        let names = zip.listdir("/testdata.zip").unwrap();
        assert_eq!(names, vec!["dirlink", "pygopherd"]);
    }

    #[test]
    fn test_outside_selectors_delegate() {
        let (_dir, _real, zip) = mount();
        assert!(zip.isfile("/outside.txt"));
        assert!(zip.isdir("/testdata.zip"));
        assert_eq!(zip.read_all("/outside.txt").unwrap(), b"outside");
        assert!(!zip.iswritable("/testdata.zip/pygopherd"));
    }

    #[test]
    fn test_cache_persisted_and_reused() {
        let (dir, real, zip) = mount();
        let sidecar = dir.path().join(".cache.pygopherd.zip3.testdata.zip");
        assert!(sidecar.exists());
        let again = ZipVfs::new(real, "/testdata.zip").unwrap();
        assert_eq!(again.inodes(), zip.inodes());
    }

    #[test]
    fn test_corrupt_cache_rebuilt() {
        let (dir, real, zip) = mount();
        let sidecar = dir.path().join(".cache.pygopherd.zip3.testdata.zip");
        std::fs::write(&sidecar, b"garbage").unwrap();
        let again = ZipVfs::new(real, "/testdata.zip").unwrap();
        assert_eq!(again.inodes(), zip.inodes());
    }

    #[test]
    fn test_undecodable_link_target_escaped() {
        let target = read_link_target(&mut Cursor::new(b"zip\xaeonly".to_vec())).unwrap();
        assert_eq!(selector::encode_str(&target), b"zip\xaeonly");

        let mut table = InodeTable::new();
        table.add_file("ziponly");
        table.resolve_symlinks(vec![
            ("odd".to_string(), target),
            ("good".to_string(), "ziponly".to_string()),
        ]);
        assert!(lookup(&table.inodes, "odd").is_none());
        assert!(lookup(&table.inodes, "good").is_some());
    }

    #[test]
    fn test_resolve_target_paths() {
        assert_eq!(resolve_target("a/b/link", "../c"), "/a/c");
        assert_eq!(resolve_target("a/link", "/x/y"), "/x/y");
        assert_eq!(resolve_target("link", "file"), "/file");
    }
}
