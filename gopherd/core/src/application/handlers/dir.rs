// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Directory Handler
//!
//! Lists a directory through the VFS, hides names matching the ignore
//! pattern, sorts the rest and asks the handler chain for each child's
//! entry. Listings are cached in a sidecar file for `cachetime` seconds.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Plain directory menus and the cache plumbing shared with UMN

use std::io::Write;

use crate::application::handlers::{child_entry, Handler, HandlerBase, HandlerRequest};
use crate::domain::entry::Entry;
use crate::domain::error::Result;
use crate::domain::selector;
use crate::domain::vfs::VfsStat;
use crate::infrastructure::dir_cache::DirCache;
use crate::infrastructure::mail::is_maildir;

/// True for a directory this family of handlers should claim: a directory
/// that is neither a gophermap directory nor a Maildir when the handler
/// for those is active.
pub(crate) fn claims_directory(base: &HandlerBase) -> bool {
    if !base.is_dir() {
        return false;
    }
    let handlers = &base.ctx().handlers;
    let map = selector::join(base.selector(), "gophermap");
    if handlers.contains("BuckGophermapHandler") && base.vfs().isfile(&map) {
        return false;
    }
    !(handlers.contains("MaildirFolderHandler") && is_maildir(base.vfs(), base.selector()))
}

pub(crate) fn dir_cache(base: &HandlerBase) -> DirCache {
    let cfg = &base.ctx().config.handlers.dir;
    DirCache::new(base.selector(), &cfg.cachefile, cfg.cachetime)
}

/// Sorted child names with ignored ones removed.
pub(crate) fn visible_children(base: &HandlerBase) -> Result<Vec<String>> {
    let mut names = base.vfs().listdir(base.selector())?;
    names.sort();
    let ignore = &base.ctx().ignore_pattern;
    Ok(names
        .into_iter()
        .filter(|name| !ignore.is_match(&selector::join(base.selector(), name)))
        .collect())
}

pub struct DirHandler {
    base: HandlerBase,
    entries: Vec<Entry>,
    from_cache: bool,
}

impl DirHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
            entries: Vec::new(),
            from_cache: false,
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }
}

impl Handler for DirHandler {
    fn name(&self) -> &'static str {
        "DirHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        claims_directory(&self.base)
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        Ok(self)
    }

    fn prepare(&mut self) -> Result<()> {
        let cache = dir_cache(&self.base);
        if let Some(entries) = cache.load(self.base.vfs()) {
            self.entries = entries;
            self.from_cache = true;
            return Ok(());
        }

        let mut entries = Vec::new();
        for name in visible_children(&self.base)? {
            let child = selector::join(self.base.selector(), &name);
            if let Some(entry) = child_entry(&self.base.req, &child) {
                entries.push(entry);
            }
        }
        cache.save(self.base.vfs(), &entries);
        self.entries = entries;
        Ok(())
    }

    fn get_entry(&mut self) -> Entry {
        self.base.entry().clone()
    }

    fn is_dir(&self) -> bool {
        true
    }

    fn dir_entries(&self) -> &[Entry] {
        &self.entries
    }

    fn from_cache(&self) -> bool {
        self.from_cache
    }

    fn write(&mut self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }
}
