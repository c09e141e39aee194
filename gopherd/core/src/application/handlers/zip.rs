// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! ZIP Handler
//!
//! Claims any selector with a prefix naming a ZIP archive, mounts that
//! archive as a [`ZipVfs`] over the current VFS and re-runs handler
//! dispatch for the full selector against the overlay. Archives nested in
//! archives work the same way, one overlay per level.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Transparent browsing into ZIP archives

use std::io::{Read, Write};
use std::sync::Arc;

use crate::application::handlers::{dispatch, Handler, HandlerBase, HandlerRequest};
use crate::domain::entry::Entry;
use crate::domain::error::Result;
use crate::domain::vfs::{SharedVfs, VfsStat};
use crate::infrastructure::vfs::ZipVfs;

const ZIP_MAGIC: &[u8; 2] = b"PK";

pub struct ZipHandler {
    base: HandlerBase,
    archive: Option<String>,
}

impl ZipHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
            archive: None,
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }

    fn is_zip(&self, sel: &str) -> bool {
        if !self.base.ctx().zip_pattern.is_match(sel) {
            return false;
        }
        let mut magic = [0u8; 2];
        self.base
            .vfs()
            .open(sel)
            .and_then(|mut f| f.read_exact(&mut magic))
            .is_ok_and(|_| &magic == ZIP_MAGIC)
    }

    /// Shortest prefix of the selector that is a ZIP file. Stops at the
    /// first prefix that does not exist or is a non-archive file.
    fn find_archive(&self) -> Option<String> {
        let sel = self.base.selector();
        let vfs = self.base.vfs();
        let ends = sel
            .match_indices('/')
            .map(|(idx, _)| idx)
            .filter(|&idx| idx > 0)
            .chain(std::iter::once(sel.len()));
        for end in ends {
            let prefix = &sel[..end];
            let stat = vfs.stat(prefix).ok()?;
            if stat.is_dir() {
                continue;
            }
            if stat.is_file() && self.is_zip(prefix) {
                return Some(prefix.to_string());
            }
            return None;
        }
        None
    }
}

impl Handler for ZipHandler {
    fn name(&self) -> &'static str {
        "ZIPHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        if !self.base.ctx().config.handlers.zip.enabled {
            return false;
        }
        self.archive = self.find_archive();
        self.archive.is_some()
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        let Some(archive) = self.archive.as_deref() else {
            return Ok(self);
        };
        let overlay: SharedVfs = Arc::new(ZipVfs::new(self.base.req.vfs.clone(), archive)?);
        tracing::debug!(archive = %archive, selector = %self.base.selector(), "Dispatching into archive");
        dispatch(&self.base.req.with_vfs(overlay))
    }

    fn get_entry(&mut self) -> Entry {
        self.base.entry().clone()
    }

    fn write(&mut self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::test_support::{context, context_with, request};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn archive(dir: &TempDir) {
        let file = std::fs::File::create(dir.path().join("testdata.zip")).unwrap();
        let mut zip = ZipWriter::new(file);
        let opts = SimpleFileOptions::default();
        zip.add_directory("pygopherd/", opts).unwrap();
        zip.start_file("pygopherd/ziponly", opts).unwrap();
        zip.write_all(b"ZIPonly\n").unwrap();
        zip.start_file("pygopherd/about.txt", opts).unwrap();
        zip.write_all(b"inside").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_file_inside_archive() {
        let dir = TempDir::new().unwrap();
        archive(&dir);
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/testdata.zip/pygopherd/ziponly")).unwrap();
        assert_eq!(handler.name(), "FileHandler");
        handler.prepare().unwrap();
        let mut out = Vec::new();
        handler.write(&mut out).unwrap();
        assert_eq!(out, b"ZIPonly\n");
    }

    #[test]
    fn test_archive_root_is_menu() {
        let dir = TempDir::new().unwrap();
        archive(&dir);
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/testdata.zip")).unwrap();
        assert!(handler.is_dir());
        handler.prepare().unwrap();
        let sels: Vec<&str> = handler
            .dir_entries()
            .iter()
            .map(|e| e.selector.as_str())
            .collect();
        assert_eq!(sels, vec!["/testdata.zip/pygopherd"]);
    }

    #[test]
    fn test_fake_zip_is_plain_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("fake.zip"), "not an archive").unwrap();
        let ctx = context(dir.path());
        let handler = dispatch(&request(&ctx, "/fake.zip")).unwrap();
        assert_eq!(handler.name(), "FileHandler");
    }

    #[test]
    fn test_disabled_zip_serves_archive_bytes() {
        let dir = TempDir::new().unwrap();
        archive(&dir);
        let ctx = context_with(dir.path(), |c| c.handlers.zip.enabled = false);
        let handler = dispatch(&request(&ctx, "/testdata.zip")).unwrap();
        assert_eq!(handler.name(), "FileHandler");
    }
}
