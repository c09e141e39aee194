// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Real Filesystem VFS
//!
//! Maps selectors onto paths under the document root. Selector text is
//! converted back to raw bytes before touching the OS, so names that are not
//! valid UTF-8 round-trip unchanged.
//!
//! **Architecture Context:**
//! Handlers only see the `Vfs` trait; this provider is the bottom of every
//! VFS chain (the ZIP overlay delegates here for paths outside its archive).

use std::ffi::CString;
use std::fs;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::domain::selector;
use crate::domain::vfs::{FileKind, VFile, Vfs, VfsStat};

/// Filesystem provider rooted at the document root
#[derive(Debug, Clone)]
pub struct RealVfs {
    root: PathBuf,
}

impl RealVfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a selector to an absolute filesystem path
    fn resolve_path(&self, sel: &str) -> PathBuf {
        let rel = sel.trim_start_matches('/');
        if rel.is_empty() {
            return self.root.clone();
        }
        self.root.join(selector::to_os_string(rel))
    }
}

pub(crate) fn stat_from_metadata(meta: &fs::Metadata) -> VfsStat {
    let kind = if meta.is_dir() {
        FileKind::Dir
    } else if meta.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };
    VfsStat {
        kind,
        size: meta.len(),
        mtime: meta.mtime(),
        ctime: meta.ctime(),
        mode: meta.permissions().mode() & 0o7777,
    }
}

impl Vfs for RealVfs {
    fn stat(&self, sel: &str) -> io::Result<VfsStat> {
        let meta = fs::metadata(self.resolve_path(sel))?;
        Ok(stat_from_metadata(&meta))
    }

    fn open(&self, sel: &str) -> io::Result<Box<dyn VFile>> {
        let file = fs::File::open(self.resolve_path(sel))?;
        Ok(Box::new(file))
    }

    fn listdir(&self, sel: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve_path(sel))? {
            let entry = entry?;
            names.push(selector::from_os_str(&entry.file_name()));
        }
        Ok(names)
    }

    fn getfspath(&self, sel: &str) -> String {
        selector::from_os_str(self.resolve_path(sel).as_os_str())
    }

    fn real_path(&self, sel: &str) -> Option<PathBuf> {
        Some(self.resolve_path(sel))
    }

    fn iswritable(&self, sel: &str) -> bool {
        let path = self.resolve_path(sel);
        let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
            return false;
        };
        // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
        unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
    }

    fn create(&self, sel: &str) -> io::Result<Box<dyn Write + Send>> {
        let file = fs::File::create(self.resolve_path(sel))?;
        Ok(Box::new(file))
    }

    fn unlink(&self, sel: &str) -> io::Result<()> {
        fs::remove_file(self.resolve_path(sel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn setup() -> (TempDir, RealVfs) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), "beta").unwrap();
        let vfs = RealVfs::new(dir.path());
        (dir, vfs)
    }

    #[test]
    fn test_stat_and_predicates() {
        let (_dir, vfs) = setup();
        assert!(vfs.isfile("/a.txt"));
        assert!(vfs.isdir("/sub"));
        assert!(vfs.isdir("/"));
        assert!(!vfs.exists("/missing"));
        assert_eq!(vfs.stat("/a.txt").unwrap().size, 5);
    }

    #[test]
    fn test_open_and_copyto() {
        let (_dir, vfs) = setup();
        let mut s = String::new();
        vfs.open("/sub/b.txt").unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "beta");
        let mut sink = Vec::new();
        assert_eq!(vfs.copyto("/a.txt", &mut sink).unwrap(), 5);
        assert_eq!(sink, b"alpha");
    }

    #[test]
    fn test_listdir() {
        let (_dir, vfs) = setup();
        let mut names = vfs.listdir("/").unwrap();
        names.sort();
        assert_eq!(names, vec!["a.txt", "sub"]);
    }

    #[test]
    fn test_create_and_unlink() {
        let (_dir, vfs) = setup();
        assert!(vfs.iswritable("/"));
        vfs.create("/new.bin").unwrap().write_all(b"x").unwrap();
        assert!(vfs.isfile("/new.bin"));
        vfs.unlink("/new.bin").unwrap();
        assert!(!vfs.exists("/new.bin"));
    }

    #[test]
    fn test_non_utf8_name_roundtrip() {
        let (dir, vfs) = setup();
        let raw = std::ffi::OsStr::from_bytes(b"caf\xe9");
        fs::write(dir.path().join(raw), "x").unwrap();
        let names = vfs.listdir("/").unwrap();
        let escaped = names.iter().find(|n| n.starts_with("caf")).unwrap();
        assert!(vfs.isfile(&format!("/{}", escaped)));
    }
}
