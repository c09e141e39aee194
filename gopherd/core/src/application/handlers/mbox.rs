// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mail Folder Handlers
//!
//! An mbox file or a Maildir directory is served as a menu with one item
//! per message. Message items use a virtual selector: the folder selector,
//! a `|`, then `/MBOX-MESSAGE/<n>` or `/MAILDIR-MESSAGE/<n>` (numbered from
//! one). The message handlers resolve those selectors back to a single
//! message and stream it as plain text.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** mbox and Maildir folders as gopher menus

use std::io::Write;

use crate::application::handlers::{split_virtual, Handler, HandlerBase, HandlerRequest};
use crate::domain::entry::{Entry, GOPHER_MENU_MIME};
use crate::domain::error::{GopherError, Result};
use crate::domain::vfs::VfsStat;
use crate::infrastructure::mail::{
    is_maildir, looks_like_mbox, maildir_messages, read_mbox, MailMessage,
};

const MBOX_MESSAGE: &str = "/MBOX-MESSAGE/";
const MAILDIR_MESSAGE: &str = "/MAILDIR-MESSAGE/";

fn message_entry(folder: &str, marker: &str, number: usize, message: &MailMessage) -> Entry {
    let mut entry = Entry::new(format!("{}|{}{}", folder, marker, number));
    entry.gopher_type = Some('0');
    entry.mime_type = Some("text/plain".to_string());
    entry.name = Some(
        message
            .subject()
            .unwrap_or_else(|| "<no subject>".to_string()),
    );
    entry.gopher_plus = false;
    entry.populated = true;
    entry
}

fn folder_entry(base: &mut HandlerBase) -> Entry {
    base.entry_with(|e| {
        e.gopher_type = Some('1');
        e.mime_type = Some(GOPHER_MENU_MIME.to_string());
    })
    .clone()
}

/// `(folder selector, message number)` for a virtual message selector
/// carrying `marker`.
fn parse_message_selector<'a>(sel: &'a str, marker: &str) -> Option<(&'a str, usize)> {
    let (folder, rest) = split_virtual(sel);
    let number = rest?.strip_prefix(marker)?.parse().ok()?;
    (number > 0).then_some((folder, number))
}

pub struct MboxFolderHandler {
    base: HandlerBase,
    entries: Vec<Entry>,
}

impl MboxFolderHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
            entries: Vec::new(),
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }
}

impl Handler for MboxFolderHandler {
    fn name(&self) -> &'static str {
        "MBoxFolderHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        self.base.is_file() && looks_like_mbox(self.base.vfs(), self.base.selector())
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        Ok(self)
    }

    fn prepare(&mut self) -> Result<()> {
        let folder = self.base.selector().to_string();
        let messages = read_mbox(self.base.vfs(), &folder)?;
        self.entries = messages
            .iter()
            .enumerate()
            .map(|(idx, msg)| message_entry(&folder, MBOX_MESSAGE, idx + 1, msg))
            .collect();
        Ok(())
    }

    fn get_entry(&mut self) -> Entry {
        folder_entry(&mut self.base)
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

pub struct MboxMessageHandler {
    base: HandlerBase,
    message: Option<MailMessage>,
}

impl MboxMessageHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
            message: None,
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }
}

impl Handler for MboxMessageHandler {
    fn name(&self) -> &'static str {
        "MBoxMessageHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        let Some((folder, _)) = parse_message_selector(self.base.selector(), MBOX_MESSAGE) else {
            return false;
        };
        self.base.vfs().isfile(folder) && looks_like_mbox(self.base.vfs(), folder)
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        Ok(self)
    }

    fn prepare(&mut self) -> Result<()> {
        let sel = self.base.selector().to_string();
        let (folder, number) = parse_message_selector(&sel, MBOX_MESSAGE)
            .ok_or_else(|| GopherError::missing(&sel))?;
        let message = read_mbox(self.base.vfs(), folder)?
            .into_iter()
            .nth(number - 1)
            .ok_or_else(|| GopherError::not_found(&sel, "no such message"))?;
        self.message = Some(message);
        Ok(())
    }

    fn get_entry(&mut self) -> Entry {
        let sel = self.base.selector();
        match (&self.message, parse_message_selector(sel, MBOX_MESSAGE)) {
            (Some(msg), Some((folder, number))) => message_entry(folder, MBOX_MESSAGE, number, msg),
            _ => {
                let mut entry = Entry::new(sel);
                entry.gopher_type = Some('0');
                entry.mime_type = Some("text/plain".to_string());
                entry
            }
        }
    }

    fn write(&mut self, out: &mut dyn Write) -> Result<()> {
        if let Some(msg) = &self.message {
            out.write_all(msg.as_bytes())?;
        }
        Ok(())
    }
}

pub struct MaildirFolderHandler {
    base: HandlerBase,
    entries: Vec<Entry>,
}

impl MaildirFolderHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
            entries: Vec::new(),
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }
}

impl Handler for MaildirFolderHandler {
    fn name(&self) -> &'static str {
        "MaildirFolderHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        self.base.is_dir() && is_maildir(self.base.vfs(), self.base.selector())
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        Ok(self)
    }

    fn prepare(&mut self) -> Result<()> {
        let folder = self.base.selector().to_string();
        let mut entries = Vec::new();
        for (idx, path) in maildir_messages(self.base.vfs(), &folder)?.iter().enumerate() {
            let message = MailMessage::new(self.base.vfs().read_all(path)?);
            entries.push(message_entry(&folder, MAILDIR_MESSAGE, idx + 1, &message));
        }
        self.entries = entries;
        Ok(())
    }

    fn get_entry(&mut self) -> Entry {
        folder_entry(&mut self.base)
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

pub struct MaildirMessageHandler {
    base: HandlerBase,
    message: Option<MailMessage>,
}

impl MaildirMessageHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
            message: None,
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }
}

impl Handler for MaildirMessageHandler {
    fn name(&self) -> &'static str {
        "MaildirMessageHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        parse_message_selector(self.base.selector(), MAILDIR_MESSAGE)
            .is_some_and(|(folder, _)| is_maildir(self.base.vfs(), folder))
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        Ok(self)
    }

    fn prepare(&mut self) -> Result<()> {
        let sel = self.base.selector().to_string();
        let (folder, number) = parse_message_selector(&sel, MAILDIR_MESSAGE)
            .ok_or_else(|| GopherError::missing(&sel))?;
        let path = maildir_messages(self.base.vfs(), folder)?
            .into_iter()
            .nth(number - 1)
            .ok_or_else(|| GopherError::not_found(&sel, "no such message"))?;
        self.message = Some(MailMessage::new(self.base.vfs().read_all(&path)?));
        Ok(())
    }

    fn get_entry(&mut self) -> Entry {
        let sel = self.base.selector();
        match (&self.message, parse_message_selector(sel, MAILDIR_MESSAGE)) {
            (Some(msg), Some((folder, number))) => {
                message_entry(folder, MAILDIR_MESSAGE, number, msg)
            }
            _ => {
                let mut entry = Entry::new(sel);
                entry.gopher_type = Some('0');
                entry.mime_type = Some("text/plain".to_string());
                entry
            }
        }
    }

    fn write(&mut self, out: &mut dyn Write) -> Result<()> {
        if let Some(msg) = &self.message {
            out.write_all(msg.as_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::dispatch;
    use crate::application::handlers::test_support::{context, request};
    use tempfile::TempDir;

    const MBOX: &str = "From alice@example.org Mon Jan  1 10:00:00 2001\n\
Subject: Hello\n\
\n\
first body\n\
\n\
From bob@example.org Tue Jan  2 11:00:00 2001\n\
Subject: Second\n\
\n\
second body\n";

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("inbox"), MBOX).unwrap();
        let maildir = dir.path().join("Maildir");
        std::fs::create_dir_all(maildir.join("new")).unwrap();
        std::fs::create_dir_all(maildir.join("cur")).unwrap();
        std::fs::create_dir_all(maildir.join("tmp")).unwrap();
        std::fs::write(maildir.join("new/1.msg"), "Subject: Fresh\n\nnew mail\n").unwrap();
        std::fs::write(maildir.join("cur/2.msg"), "Subject: Seen\n\nold mail\n").unwrap();
        dir
    }

    #[test]
    fn test_mbox_folder_lists_messages() {
        let dir = tree();
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/inbox")).unwrap();
        assert_eq!(handler.name(), "MBoxFolderHandler");
        handler.prepare().unwrap();
        let entries = handler.dir_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].selector, "/inbox|/MBOX-MESSAGE/1");
        assert_eq!(entries[0].name.as_deref(), Some("Hello"));
        assert_eq!(entries[1].selector, "/inbox|/MBOX-MESSAGE/2");
        let folder = handler.get_entry();
        assert_eq!(folder.gopher_type, Some('1'));
        assert_eq!(folder.mime_type.as_deref(), Some(GOPHER_MENU_MIME));
    }

    #[test]
    fn test_mbox_message_streams_body() {
        let dir = tree();
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/inbox|/MBOX-MESSAGE/2")).unwrap();
        assert_eq!(handler.name(), "MBoxMessageHandler");
        handler.prepare().unwrap();
        let mut out = Vec::new();
        handler.write(&mut out).unwrap();
        assert_eq!(out, b"Subject: Second\n\nsecond body\n");
        assert_eq!(handler.get_entry().name.as_deref(), Some("Second"));
    }

    #[test]
    fn test_mbox_message_out_of_range() {
        let dir = tree();
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/inbox|/MBOX-MESSAGE/9")).unwrap();
        assert!(handler.prepare().unwrap_err().is_not_found());
    }

    #[test]
    fn test_maildir_new_before_cur() {
        let dir = tree();
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/Maildir")).unwrap();
        assert_eq!(handler.name(), "MaildirFolderHandler");
        handler.prepare().unwrap();
        let names: Vec<&str> = handler
            .dir_entries()
            .iter()
            .map(|e| e.display_name())
            .collect();
        assert_eq!(names, vec!["Fresh", "Seen"]);

        let mut message = dispatch(&request(&ctx, "/Maildir|/MAILDIR-MESSAGE/2")).unwrap();
        assert_eq!(message.name(), "MaildirMessageHandler");
        message.prepare().unwrap();
        let mut out = Vec::new();
        message.write(&mut out).unwrap();
        assert_eq!(out, b"Subject: Seen\n\nold mail\n");
    }

    #[test]
    fn test_plain_file_is_not_mbox() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes"), "From here on\n").unwrap();
        let ctx = context(dir.path());
        let handler = dispatch(&request(&ctx, "/notes")).unwrap();
        assert_eq!(handler.name(), "FileHandler");
    }
}
