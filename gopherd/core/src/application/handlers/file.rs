// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! File Handlers
//!
//! `FileHandler` streams any regular file unchanged. `CompressedFileHandler`
//! serves files whose encoding has a configured decompressor: clients see
//! the inner MIME type and receive the decompressed bytes.

use std::io::{self, Write};
use std::process::{Command, Stdio};

use crate::application::handlers::{Handler, HandlerBase, HandlerRequest};
use crate::domain::entry::Entry;
use crate::domain::error::{GopherError, Result};
use crate::domain::vfs::{VFile, VfsStat};

/// Plain file: open in `prepare`, copy in `write`.
pub struct FileHandler {
    base: HandlerBase,
    file: Option<Box<dyn VFile>>,
}

impl FileHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
            file: None,
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }
}

impl Handler for FileHandler {
    fn name(&self) -> &'static str {
        "FileHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        self.base.is_file()
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        Ok(self)
    }

    fn prepare(&mut self) -> Result<()> {
        self.file = Some(self.base.vfs().open(self.base.selector())?);
        Ok(())
    }

    fn get_entry(&mut self) -> Entry {
        self.base.entry().clone()
    }

    fn write(&mut self, out: &mut dyn Write) -> Result<()> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.base.vfs().open(self.base.selector())?,
        };
        io::copy(&mut file, out)?;
        Ok(())
    }
}

/// Transparently decompressed file.
pub struct CompressedFileHandler {
    base: HandlerBase,
    file: Option<Box<dyn VFile>>,
    command: Option<String>,
}

impl CompressedFileHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
            file: None,
            command: None,
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }

    /// Rewrite an encoded entry so clients see the inner type.
    fn client_entry(&mut self) -> Entry {
        let mut entry = self.base.entry().clone();
        if entry.encoding.is_some() {
            if let Some(inner) = entry.encoded_mime_type.clone() {
                entry.gopher_type = Some(self.base.ctx().policy.type_map.gopher_type(&inner));
                entry.mime_type = Some(inner);
            } else {
                entry.mime_type = Some(self.base.ctx().policy.default_mime_type.clone());
                entry.gopher_type = Some('0');
            }
            entry.encoding = None;
            entry.size = None;
        }
        entry
    }
}

impl Handler for CompressedFileHandler {
    fn name(&self) -> &'static str {
        "CompressedFileHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        if !self.base.is_file() {
            return false;
        }
        let Some(encoding) = self.base.entry().encoding.clone() else {
            return false;
        };
        let ctx = self.base.ctx();
        match ctx.config.handlers.compressed.decompressors.get(&encoding) {
            Some(command) if ctx.decompress_pattern.is_match(self.base.selector()) => {
                self.command = Some(command.clone());
                true
            }
            _ => false,
        }
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        Ok(self)
    }

    fn prepare(&mut self) -> Result<()> {
        self.file = Some(self.base.vfs().open(self.base.selector())?);
        Ok(())
    }

    fn get_entry(&mut self) -> Entry {
        self.client_entry()
    }

    fn write(&mut self, out: &mut dyn Write) -> Result<()> {
        let command = self
            .command
            .clone()
            .ok_or_else(|| GopherError::Fatal("no decompressor selected".into()))?;
        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.base.vfs().open(self.base.selector())?,
        };
        let mut words = command.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| GopherError::Config(format!("empty decompressor for {}", self.base.selector())))?;

        let mut child = Command::new(program)
            .args(words)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GopherError::Fatal("decompressor stdin unavailable".into()))?;
        let feeder = std::thread::spawn(move || io::copy(&mut file, &mut stdin).map(|_| ()));

        let copied = match child.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, out).map(|_| ()),
            None => Ok(()),
        };
        let fed = feeder.join().unwrap_or_else(|_| {
            Err(io::Error::new(io::ErrorKind::Other, "decompressor feeder panicked"))
        });
        let status = child.wait()?;
        copied?;
        if let Err(e) = fed {
            if e.kind() != io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }
        if !status.success() {
            tracing::warn!(selector = %self.base.selector(), %status, "Decompressor exited with failure");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::dispatch;
    use crate::application::handlers::test_support::{context, context_with, request};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_file_handler_streams_bytes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("testfile.txt"), "Test\n").unwrap();
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/testfile.txt")).unwrap();
        assert_eq!(handler.name(), "FileHandler");
        handler.prepare().unwrap();
        let mut out = Vec::new();
        handler.write(&mut out).unwrap();
        assert_eq!(out, b"Test\n");
        let entry = handler.get_entry();
        assert_eq!(entry.gopher_type, Some('0'));
        assert_eq!(entry.size, Some(5));
    }

    #[test]
    fn test_compressed_entry_rewritten() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt.gz"), b"not really gzip").unwrap();
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/notes.txt.gz")).unwrap();
        assert_eq!(handler.name(), "CompressedFileHandler");
        let entry = handler.get_entry();
        assert_eq!(entry.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(entry.encoding, None);
        assert_eq!(entry.size, None);
        assert_eq!(entry.gopher_type, Some('0'));
    }

    #[test]
    fn test_compressed_pipes_through_command() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt.gz"), b"pass through\n").unwrap();
        let ctx = context_with(dir.path(), |c| {
            c.handlers.compressed.decompressors =
                BTreeMap::from([("gzip".to_string(), "cat".to_string())]);
        });
        let mut handler = dispatch(&request(&ctx, "/notes.txt.gz")).unwrap();
        handler.prepare().unwrap();
        let mut out = Vec::new();
        handler.write(&mut out).unwrap();
        assert_eq!(out, b"pass through\n");
    }

    #[test]
    fn test_unknown_encoding_falls_back_to_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("data.bz2"), b"x").unwrap();
        let ctx = context(dir.path());
        let handler = dispatch(&request(&ctx, "/data.bz2")).unwrap();
        assert_eq!(handler.name(), "FileHandler");
    }
}
