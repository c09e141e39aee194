// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Virtual Filesystem Abstraction
//!
//! Handlers never touch `std::fs` directly. Every path they hand to a VFS is a
//! normalized selector (`/docs/file.txt`); the implementation decides what
//! that selector means: a path under the document root for the real
//! filesystem, or a member of an archive for the ZIP overlay.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Uniform read/stat/list interface shared by all handlers
//! - **Implementations:** `RealVfs`, `ZipVfs` (infrastructure layer)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Seek, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// What a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Dir,
    Other,
}

/// Result of `Vfs::stat`. Times are seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsStat {
    pub kind: FileKind,
    pub size: u64,
    pub mtime: i64,
    pub ctime: i64,
    /// Unix permission bits (`0o755` etc.), zero when unknown.
    pub mode: u32,
}

impl VfsStat {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Any execute bit set on a regular file.
    pub fn is_executable(&self) -> bool {
        self.is_file() && self.mode & 0o111 != 0
    }
}

/// An open, seekable file body.
pub trait VFile: Read + Seek + Send {}

impl<T: Read + Seek + Send> VFile for T {}

/// Shared handle to a filesystem implementation.
pub type SharedVfs = Arc<dyn Vfs>;

/// Filesystem operations keyed by selector.
///
/// Only `stat`, `open` and `listdir` are required; the predicates are derived
/// from `stat`. Mutating operations default to `Unsupported` so read-only
/// overlays need not implement them.
pub trait Vfs: Send + Sync + fmt::Debug {
    fn stat(&self, selector: &str) -> io::Result<VfsStat>;

    fn open(&self, selector: &str) -> io::Result<Box<dyn VFile>>;

    /// Child names of a directory, in no particular order.
    fn listdir(&self, selector: &str) -> io::Result<Vec<String>>;

    fn isdir(&self, selector: &str) -> bool {
        self.stat(selector).map(|s| s.is_dir()).unwrap_or(false)
    }

    fn isfile(&self, selector: &str) -> bool {
        self.stat(selector).map(|s| s.is_file()).unwrap_or(false)
    }

    fn exists(&self, selector: &str) -> bool {
        self.stat(selector).is_ok()
    }

    /// Opaque location string for logging and entry bookkeeping.
    fn getfspath(&self, selector: &str) -> String {
        selector.to_string()
    }

    /// Path on the host filesystem, when the selector maps to one. Needed by
    /// anything that hands the file to an external program.
    fn real_path(&self, _selector: &str) -> Option<PathBuf> {
        None
    }

    fn iswritable(&self, _selector: &str) -> bool {
        false
    }

    /// Stream a file body into `sink`, returning the byte count.
    fn copyto(&self, selector: &str, sink: &mut dyn Write) -> io::Result<u64> {
        let mut file = self.open(selector)?;
        io::copy(&mut file, sink)
    }

    /// Create or truncate a file for writing.
    fn create(&self, selector: &str) -> io::Result<Box<dyn Write + Send>> {
        Err(unsupported("create", selector))
    }

    fn unlink(&self, selector: &str) -> io::Result<()> {
        Err(unsupported("unlink", selector))
    }

    /// Read a whole file into memory.
    fn read_all(&self, selector: &str) -> io::Result<Vec<u8>> {
        let mut file = self.open(selector)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

fn unsupported(op: &str, selector: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} not supported on this filesystem: {}", op, selector),
    )
}
