// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mailbox Scanning
//!
//! Reads Unix mbox files and Maildir directories through the VFS and splits
//! them into individual RFC 822 messages. Only the headers needed for menu
//! labels are parsed; bodies are passed through untouched.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** mbox/Maildir message enumeration for the mail handlers

use regex::bytes::Regex;
use std::io::{self, BufRead, BufReader};
use std::sync::LazyLock;

use crate::domain::selector;
use crate::domain::vfs::Vfs;

/// The strict `From ` separator accepted as the first line of an mbox.
static FROM_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^From \s*[^\s]+\s+\w\w\w\s+\w\w\w\s+\d?\d\s+\d?\d:\d\d(:\d\d)?(\s+[^\s]+)?\s+\d\d\d\d\s*[^\s]*\s*$",
    )
    .ok()
});

/// True when `line` (without its newline) is a valid mbox separator.
pub fn is_mbox_from_line(line: &[u8]) -> bool {
    let line = trim_eol(line);
    FROM_LINE.as_ref().is_some_and(|re| re.is_match(line))
}

/// True when the file at `sel` starts with a valid mbox separator.
pub fn looks_like_mbox(vfs: &dyn Vfs, sel: &str) -> bool {
    let Ok(file) = vfs.open(sel) else {
        return false;
    };
    let mut first = Vec::new();
    let mut reader = BufReader::new(file);
    match reader.read_until(b'\n', &mut first) {
        Ok(n) if n > 0 => is_mbox_from_line(&first),
        _ => false,
    }
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// One message: header block and body, without the mbox separator line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    raw: Vec<u8>,
}

impl MailMessage {
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// First header named `name` (case-insensitive), with folded
    /// continuation lines joined by a single space.
    pub fn header(&self, name: &str) -> Option<String> {
        let mut found: Option<String> = None;
        for line in self.raw.split(|&b| b == b'\n') {
            let line = trim_eol(line);
            if line.is_empty() {
                break;
            }
            if line[0] == b' ' || line[0] == b'\t' {
                if let Some(value) = found.as_mut() {
                    value.push(' ');
                    value.push_str(selector::decode_bytes(line).trim());
                }
                continue;
            }
            if found.is_some() {
                break;
            }
            if let Some(colon) = line.iter().position(|&b| b == b':') {
                let key = &line[..colon];
                if key.eq_ignore_ascii_case(name.as_bytes()) {
                    found = Some(selector::decode_bytes(&line[colon + 1..]).trim().to_string());
                }
            }
        }
        found
    }

    pub fn subject(&self) -> Option<String> {
        self.header("Subject")
    }
}

/// Split mbox data into messages. A line starting with `From ` that opens
/// the file or follows a blank line starts a new message.
pub fn parse_mbox(data: &[u8]) -> Vec<MailMessage> {
    let mut messages = Vec::new();
    let mut current: Option<Vec<u8>> = None;
    let mut previous_blank = true;

    for line in data.split_inclusive(|&b| b == b'\n') {
        if previous_blank && line.starts_with(b"From ") {
            if let Some(body) = current.take() {
                messages.push(MailMessage::new(strip_trailing_blank(body)));
            }
            current = Some(Vec::new());
            previous_blank = false;
            continue;
        }
        previous_blank = trim_eol(line).is_empty();
        if let Some(body) = current.as_mut() {
            body.extend_from_slice(line);
        }
    }
    if let Some(body) = current.take() {
        messages.push(MailMessage::new(strip_trailing_blank(body)));
    }
    messages
}

/// Drop the single blank separator line mbox puts before the next `From `.
fn strip_trailing_blank(mut body: Vec<u8>) -> Vec<u8> {
    if body.ends_with(b"\n\n") {
        body.pop();
    } else if body.ends_with(b"\r\n\r\n") {
        body.truncate(body.len() - 2);
    }
    body
}

/// Read and split the mbox at `sel`.
pub fn read_mbox(vfs: &dyn Vfs, sel: &str) -> io::Result<Vec<MailMessage>> {
    let data = vfs.read_all(sel)?;
    Ok(parse_mbox(&data))
}

/// A directory with `new/` and `cur/` subdirectories.
pub fn is_maildir(vfs: &dyn Vfs, sel: &str) -> bool {
    vfs.isdir(sel)
        && vfs.isdir(&selector::join(sel, "new"))
        && vfs.isdir(&selector::join(sel, "cur"))
}

/// Message selectors of a Maildir: `new/` sorted, then `cur/` sorted,
/// skipping dotfiles.
pub fn maildir_messages(vfs: &dyn Vfs, sel: &str) -> io::Result<Vec<String>> {
    let mut paths = Vec::new();
    for sub in ["new", "cur"] {
        let dir = selector::join(sel, sub);
        let mut names: Vec<String> = vfs
            .listdir(&dir)?
            .into_iter()
            .filter(|n| !n.starts_with('.'))
            .collect();
        names.sort();
        paths.extend(names.iter().map(|n| selector::join(&dir, n)));
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::vfs::real::RealVfs;
    use tempfile::TempDir;

    const MBOX: &str = "From alice@example.org Mon Jan  1 10:00:00 2001\n\
Subject: First message\n\
From: alice@example.org\n\
\n\
Hello there.\n\
\n\
From bob@example.org Tue Jan  2 11:30 2001\n\
Subject: Second\n\
\x20continued\n\
\n\
Body two.\n";

    #[test]
    fn test_from_line_pattern() {
        assert!(is_mbox_from_line(b"From alice@example.org Mon Jan  1 10:00:00 2001\n"));
        assert!(is_mbox_from_line(b"From bob Tue Jan 2 11:30 2001"));
        assert!(!is_mbox_from_line(b"From: alice@example.org"));
        assert!(!is_mbox_from_line(b"Subject: hi"));
    }

    #[test]
    fn test_parse_mbox_messages() {
        let messages = parse_mbox(MBOX.as_bytes());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].subject().as_deref(), Some("First message"));
        assert_eq!(messages[1].subject().as_deref(), Some("Second continued"));
        assert!(messages[0].as_bytes().ends_with(b"Hello there.\n"));
        assert!(!messages[0].as_bytes().starts_with(b"From "));
    }

    #[test]
    fn test_missing_header() {
        let msg = MailMessage::new(b"From: x\n\nSubject: not a header\n".to_vec());
        assert_eq!(msg.subject(), None);
    }

    #[test]
    fn test_maildir_ordering() {
        let dir = TempDir::new().unwrap();
        for sub in ["new", "cur", "tmp"] {
            std::fs::create_dir_all(dir.path().join("box").join(sub)).unwrap();
        }
        std::fs::write(dir.path().join("box/new/2"), "Subject: n2\n\n").unwrap();
        std::fs::write(dir.path().join("box/new/1"), "Subject: n1\n\n").unwrap();
        std::fs::write(dir.path().join("box/cur/0"), "Subject: c0\n\n").unwrap();
        std::fs::write(dir.path().join("box/cur/.hidden"), "").unwrap();
        let vfs = RealVfs::new(dir.path());
        assert!(is_maildir(&vfs, "/box"));
        let paths = maildir_messages(&vfs, "/box").unwrap();
        assert_eq!(paths, vec!["/box/new/1", "/box/new/2", "/box/cur/0"]);
    }

    #[test]
    fn test_looks_like_mbox() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("mbox"), MBOX).unwrap();
        std::fs::write(dir.path().join("plain"), "From here on\n").unwrap();
        let vfs = RealVfs::new(dir.path());
        assert!(looks_like_mbox(&vfs, "/mbox"));
        assert!(!looks_like_mbox(&vfs, "/plain"));
    }
}
