// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Bucktooth Gophermap Handler
//!
//! Serves a directory containing a `gophermap` file, or a `*.gophermap` file
//! itself, as a hand-written menu. Lines with a tab are links
//! (`<type><name>\t<selector>\t<host>\t<port>`); everything else is an
//! informational line.

use std::io::Write;

use crate::application::handlers::{Handler, HandlerBase, HandlerRequest};
use crate::domain::entry::Entry;
use crate::domain::error::Result;
use crate::domain::selector;
use crate::domain::vfs::VfsStat;

pub struct BuckGophermapHandler {
    base: HandlerBase,
    entries: Vec<Entry>,
}

impl BuckGophermapHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
            entries: Vec::new(),
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }

    /// The map file and the directory its relative selectors resolve against.
    fn map_location(&self) -> (String, String) {
        let sel = self.base.selector();
        if self.base.is_dir() {
            (selector::join(sel, "gophermap"), sel.to_string())
        } else {
            (sel.to_string(), selector::dirname(sel).to_string())
        }
    }

    fn parse_line(&self, line: &str, selector_base: &str) -> Entry {
        if !line.contains('\t') {
            return Entry::info(line.trim_end());
        }
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        let mut chars = fields[0].chars();
        let gopher_type = chars.next();
        let name = chars.as_str().to_string();

        let raw_selector = fields.get(1).copied().filter(|s| !s.is_empty());
        let mut sel = raw_selector.unwrap_or(name.as_str()).to_string();
        if !sel.starts_with('/') && !sel.starts_with("URL:") {
            sel = selector::join(selector_base, &sel);
        }

        let mut entry = Entry::new(sel);
        entry.gopher_type = gopher_type;
        entry.name = Some(name);
        if let Some(host) = fields.get(2).filter(|h| !h.is_empty()) {
            entry.host = Some(host.to_string());
        }
        if let Some(port) = fields.get(3).and_then(|p| p.trim().parse().ok()) {
            entry.port = Some(port);
        }
        if !entry.is_remote() && !selector::is_url_selector(&entry.selector) {
            let fs_path = entry.selector.clone();
            entry.populate_from_vfs(self.base.vfs(), &fs_path, None, &self.base.ctx().policy);
        }
        entry
    }
}

impl Handler for BuckGophermapHandler {
    fn name(&self) -> &'static str {
        "BuckGophermapHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        if self.base.is_dir() {
            let map = selector::join(self.base.selector(), "gophermap");
            return self.base.vfs().isfile(&map);
        }
        self.base.is_file() && self.base.selector().ends_with(".gophermap")
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        Ok(self)
    }

    fn prepare(&mut self) -> Result<()> {
        let (map, selector_base) = self.map_location();
        let text = selector::decode_bytes(&self.base.vfs().read_all(&map)?);
        let mut entries = Vec::new();
        for line in text.lines() {
            if line.trim_end() == "." {
                break;
            }
            entries.push(self.parse_line(line, &selector_base));
        }
        tracing::debug!(map = %map, entries = entries.len(), "Parsed gophermap");
        self.entries = entries;
        Ok(())
    }

    fn get_entry(&mut self) -> Entry {
        self.base
            .entry_with(|e| {
                e.gopher_type = Some('1');
                e.mime_type = Some(crate::domain::entry::GOPHER_MENU_MIME.to_string());
            })
            .clone()
    }

    fn is_dir(&self) -> bool {
        true
    }

    fn dir_entries(&self) -> &[Entry] {
        &self.entries
    }

    fn write(&mut self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::dispatch;
    use crate::application::handlers::test_support::{context, request};
    use tempfile::TempDir;

    const MAP: &str = "Welcome to the hole   \n\
0About this server\tabout.txt\n\
1Floodgap\t/\tgopher.floodgap.com\t70\n\
hWeb\tURL:http://example.org/\n\
0about.txt\n\
.\n\
ignored after terminator\n";

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("hole")).unwrap();
        std::fs::write(dir.path().join("hole/gophermap"), MAP).unwrap();
        std::fs::write(dir.path().join("hole/about.txt"), "about").unwrap();
        std::fs::write(dir.path().join("menu.gophermap"), "iinfo only\n").unwrap();
        dir
    }

    #[test]
    fn test_directory_gophermap() {
        let dir = tree();
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/hole")).unwrap();
        assert_eq!(handler.name(), "BuckGophermapHandler");
        handler.prepare().unwrap();
        let entries = handler.dir_entries();
        assert_eq!(entries.len(), 5);

        assert_eq!(entries[0].gopher_type, Some('i'));
        assert_eq!(entries[0].name.as_deref(), Some("Welcome to the hole"));

        assert_eq!(entries[1].selector, "/hole/about.txt");
        assert_eq!(entries[1].name.as_deref(), Some("About this server"));
        assert_eq!(entries[1].size, Some(5));

        assert_eq!(entries[2].host.as_deref(), Some("gopher.floodgap.com"));
        assert_eq!(entries[2].port, Some(70));
        assert_eq!(entries[2].selector, "/");

        assert_eq!(entries[3].selector, "URL:http://example.org/");

        assert_eq!(entries[4].selector, "/hole/about.txt");
    }

    #[test]
    fn test_gophermap_file() {
        let dir = tree();
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/menu.gophermap")).unwrap();
        assert_eq!(handler.name(), "BuckGophermapHandler");
        handler.prepare().unwrap();
        assert_eq!(handler.dir_entries().len(), 1);
        assert_eq!(handler.get_entry().gopher_type, Some('1'));
    }
}
