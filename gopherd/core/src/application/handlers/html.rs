// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTML files, labelled in menus by their `<title>`.

use regex::Regex;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::LazyLock;

use crate::application::handlers::{Handler, HandlerBase, HandlerRequest};
use crate::domain::entry::Entry;
use crate::domain::error::Result;
use crate::domain::selector;
use crate::domain::vfs::VfsStat;

/// Only the head of the document is scanned.
const TITLE_SCAN_LINES: usize = 20;

static TITLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)<title>\s*(.*?)\s*</title>").ok());

static HEAD_END: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)</head>|<body").ok());

pub struct HtmlFileTitleHandler {
    base: HandlerBase,
}

impl HtmlFileTitleHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }

    fn find_title(&self) -> Option<String> {
        let title_re = TITLE.as_ref()?;
        let file = self.base.vfs().open(self.base.selector()).ok()?;
        let mut reader = BufReader::new(file);
        let mut raw = Vec::new();
        for _ in 0..TITLE_SCAN_LINES {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = selector::decode_bytes(&raw);
            if let Some(caps) = title_re.captures(&line) {
                let title = caps[1].to_string();
                return (!title.is_empty()).then_some(title);
            }
            if HEAD_END.as_ref().is_some_and(|re| re.is_match(&line)) {
                break;
            }
        }
        None
    }
}

impl Handler for HtmlFileTitleHandler {
    fn name(&self) -> &'static str {
        "HTMLFileTitleHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        self.base.is_file() && self.base.entry().mime_type.as_deref() == Some("text/html")
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        Ok(self)
    }

    fn get_entry(&mut self) -> Entry {
        let title = self.find_title();
        let entry = self.base.entry();
        if let Some(title) = title {
            entry.name = Some(title);
        }
        entry.clone()
    }

    fn write(&mut self, out: &mut dyn Write) -> Result<()> {
        let mut file = self.base.vfs().open(self.base.selector())?;
        io::copy(&mut file, out)?;
        Ok(())
    }
}
