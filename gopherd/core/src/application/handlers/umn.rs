// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! UMN Directory Handler
//!
//! Directory menus compatible with the University of Minnesota gopherd:
//! dotfiles in the directory are link files whose records add, replace,
//! hide or annotate entries; `.cap/<name>` files override single entries;
//! display names may have their extension stripped.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** `.Links`/`.names`/`.cap` merging on top of plain listings

use std::cmp::Ordering;
use std::io::Write;

use crate::application::handlers::dir::{claims_directory, dir_cache};
use crate::application::handlers::{child_entry, Handler, HandlerBase, HandlerRequest};
use crate::domain::entry::Entry;
use crate::domain::error::Result;
use crate::domain::link::{parse_cap_file, parse_link_file};
use crate::domain::selector;
use crate::domain::server_config::ExtStrip;
use crate::domain::vfs::VfsStat;

const CACHE_SIDECAR_PREFIX: &str = ".cache.pygopherd";

fn is_hidden_type(entry: &Entry) -> bool {
    matches!(entry.gopher_type, Some('X') | Some('-'))
}

/// Menu order: named entries before unnamed ones, then ascending `num`,
/// then name. Opposite signs put the negative number first.
pub fn umn_cmp(a: &Entry, b: &Entry) -> Ordering {
    match (&a.name, &b.name) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        _ => {}
    }
    if a.num == b.num {
        return a.name.cmp(&b.name);
    }
    if (a.num < 0) != (b.num < 0) {
        return if a.num < 0 {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }
    a.num.cmp(&b.num)
}

pub struct UmnDirHandler {
    base: HandlerBase,
    entries: Vec<Entry>,
    from_cache: bool,
}

impl UmnDirHandler {
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

    fn read_text(&self, sel: &str) -> Option<String> {
        match self.base.vfs().read_all(sel) {
            Ok(bytes) => Some(selector::decode_bytes(&bytes)),
            Err(e) => {
                tracing::debug!(path = %sel, error = %e, "Cannot read link file");
                None
            }
        }
    }

    fn strip_extension(&self, entry: &mut Entry, filename: &str) {
        let mode = self.base.ctx().config.handlers.umn.extstrip;
        let mime = match mode {
            ExtStrip::None => return,
            ExtStrip::Nonencoded if entry.encoding.is_some() => return,
            _ => entry
                .encoded_mime_type
                .clone()
                .filter(|_| entry.encoding.is_some())
                .or_else(|| entry.mime_type.clone()),
        };
        let Some(mime) = mime else { return };
        let mimetypes = &self.base.ctx().policy.mimetypes;
        if let Some(ext) = mimetypes.matching_extension(&mime, filename) {
            entry.name = Some(filename[..filename.len() - ext.len()].to_string());
        }
    }

    /// Entry for a link record that did not merge into a listed file.
    fn finish_link(&self, mut link: Entry) -> Entry {
        if !link.is_remote() && !selector::is_url_selector(&link.selector) {
            let sel = link.selector.clone();
            link.populate_from_vfs(self.base.vfs(), &sel, None, &self.base.ctx().policy);
        }
        link
    }

    fn build(&self) -> Result<Vec<Entry>> {
        let dir = self.base.selector().to_string();
        let mut names = self.base.vfs().listdir(&dir)?;
        names.sort();

        let mut links = Vec::new();
        let mut entries = Vec::new();

        for name in names {
            let path = selector::join(&dir, &name);
            if name.starts_with('.') {
                if !name.starts_with(CACHE_SIDECAR_PREFIX) && !self.base.vfs().isdir(&path) {
                    if let Some(text) = self.read_text(&path) {
                        links.extend(parse_link_file(&text, &dir));
                    }
                }
                continue;
            }
            if self.base.ctx().ignore_pattern.is_match(&path) {
                continue;
            }
            let Some(mut entry) = child_entry(&self.base.req, &path) else {
                continue;
            };
            self.strip_extension(&mut entry, &name);

            let cap = selector::join(&selector::join(&dir, ".cap"), &name);
            if self.base.vfs().isfile(&cap) {
                if let Some(cap_entry) = self
                    .read_text(&cap)
                    .and_then(|text| parse_cap_file(&text, &name, &dir))
                {
                    if is_hidden_type(&cap_entry) {
                        continue;
                    }
                    entry.merge_from(&cap_entry);
                }
            }
            entries.push(entry);
        }

        for link in links {
            if link.needs_merge {
                if let Some(idx) = entries.iter().position(|e| e.selector == link.selector) {
                    if link.gopher_type == Some('X') {
                        entries.remove(idx);
                    } else {
                        entries[idx].merge_from(&link);
                    }
                    continue;
                }
            }
            if !is_hidden_type(&link) {
                entries.push(self.finish_link(link));
            }
        }

        entries.sort_by(umn_cmp);
        Ok(entries)
    }
}

impl Handler for UmnDirHandler {
    fn name(&self) -> &'static str {
        "UMNDirHandler"
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
        let entries = self.build()?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::dispatch;
    use crate::application::handlers::test_support::{context_with, request};
    use tempfile::TempDir;

    fn no_cache(c: &mut crate::domain::server_config::ServerConfig) {
        c.handlers.dir.cachetime = 0;
    }

    fn menu(dir: &TempDir, sel: &str, tweak: fn(&mut crate::domain::server_config::ServerConfig)) -> Vec<Entry> {
        let ctx = context_with(dir.path(), tweak);
        let mut handler = dispatch(&request(&ctx, sel)).unwrap();
        assert_eq!(handler.name(), "UMNDirHandler");
        handler.prepare().unwrap();
        handler.dir_entries().to_vec()
    }

    #[test]
    fn test_link_merges_into_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("file.txt"), "recipes").unwrap();
        std::fs::write(
            dir.path().join(".Links"),
            "Type=1\nName=Cheese Ball Recipes\nPath=./file.txt\nHost=zippy.example\nPort=150\n",
        )
        .unwrap();
        let entries = menu(&dir, "/", no_cache);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name.as_deref(), Some("Cheese Ball Recipes"));
        assert_eq!(entries[0].host.as_deref(), Some("zippy.example"));
        assert_eq!(entries[0].port, Some(150));
        assert_eq!(entries[0].gopher_type, Some('1'));
    }

    #[test]
    fn test_link_type_x_removes_entry() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("secret.txt"), "x").unwrap();
        std::fs::write(dir.path().join("open.txt"), "x").unwrap();
        std::fs::write(dir.path().join(".names"), "Path=./secret.txt\nType=X\n").unwrap();
        let entries = menu(&dir, "/", no_cache);
        let sels: Vec<&str> = entries.iter().map(|e| e.selector.as_str()).collect();
        assert_eq!(sels, vec!["/open.txt"]);
    }

    #[test]
    fn test_remote_link_appended() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("local.txt"), "x").unwrap();
        std::fs::write(
            dir.path().join(".Links"),
            "Name=Elsewhere\nType=1\nPath=/\nHost=gopher.floodgap.com\nPort=70\n",
        )
        .unwrap();
        let entries = menu(&dir, "/", no_cache);
        assert_eq!(entries.len(), 2);
        let remote = entries.iter().find(|e| e.host.is_some()).unwrap();
        assert_eq!(remote.name.as_deref(), Some("Elsewhere"));
        assert!(!remote.populated);
    }

    #[test]
    fn test_cap_file_overrides_and_hides() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::write(dir.path().join("b.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join(".cap")).unwrap();
        std::fs::write(dir.path().join(".cap/a.txt"), "Name=Alpha\n").unwrap();
        std::fs::write(dir.path().join(".cap/b.txt"), "Type=-\n").unwrap();
        let entries = menu(&dir, "/", no_cache);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name.as_deref(), Some("Alpha"));
    }

    #[test]
    fn test_extension_stripping() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "x").unwrap();
        let entries = menu(&dir, "/", no_cache);
        assert_eq!(entries[0].name.as_deref(), Some("readme"));

        let entries = menu(&dir, "/", |c| {
            c.handlers.dir.cachetime = 0;
            c.handlers.umn.extstrip = ExtStrip::None;
        });
        assert_eq!(entries[0].name.as_deref(), Some("readme.txt"));
    }

    #[test]
    fn test_numb_ordering() {
        let dir = TempDir::new().unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        std::fs::write(
            dir.path().join(".names"),
            "Path=./a.txt\nNumb=2\n\nPath=./c.txt\nNumb=-1\n",
        )
        .unwrap();
        let entries = menu(&dir, "/", no_cache);
        let sels: Vec<&str> = entries.iter().map(|e| e.selector.as_str()).collect();
        assert_eq!(sels, vec!["/c.txt", "/b.txt", "/a.txt"]);
    }

    #[test]
    fn test_umn_cmp_unnamed_last() {
        let named = Entry {
            name: Some("z".into()),
            num: 5,
            ..Default::default()
        };
        let unnamed = Entry::default();
        assert_eq!(umn_cmp(&named, &unnamed), Ordering::Less);
        assert_eq!(umn_cmp(&unnamed, &named), Ordering::Greater);
    }
}
