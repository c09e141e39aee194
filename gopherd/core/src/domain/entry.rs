// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Gopher Entry
//!
//! The record every handler produces and every protocol renders: one served
//! item with its selector, gopher type, MIME information and extended
//! attributes. Fields are filled lazily; each inference step only sets a
//! field that is still empty, so callers may pre-populate anything they want
//! to override.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Per-item descriptor and the filesystem populator

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use crate::domain::mime::{GopherTypeMap, MimeTypes};
use crate::domain::selector;
use crate::domain::vfs::{Vfs, VfsStat};

pub const GOPHER_MENU_MIME: &str = "application/gopher-menu";

/// Upper bound on how much of an extended-attribute sidecar is read.
const EA_READ_LIMIT: u64 = 20480;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub selector: String,
    pub fs_path: Option<String>,
    pub gopher_type: Option<char>,
    pub name: Option<String>,
    /// Remote host; `None` means this server.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub mime_type: Option<String>,
    pub encoded_mime_type: Option<String>,
    pub encoding: Option<String>,
    pub size: Option<u64>,
    pub mtime: Option<i64>,
    pub ctime: Option<i64>,
    pub language: Option<String>,
    pub gopher_plus: bool,
    /// Ordering hint from `.names`/`.Links` (`Numb=`).
    pub num: i64,
    /// Extended attributes keyed by upper-case name (`ABSTRACT`).
    pub ea: BTreeMap<String, Vec<u8>>,
    /// UMN link whose path began with `./` or `~/`.
    pub needs_merge: bool,
    /// UMN link with a bare relative path.
    pub needs_abspath: bool,
    pub populated: bool,
}

/// Everything the populator needs besides the VFS: the MIME tables, the
/// MIME → gopher-type table, the EA sidecar extensions and the fallback type.
#[derive(Debug, Clone)]
pub struct EntryPolicy {
    pub mimetypes: Arc<MimeTypes>,
    pub type_map: GopherTypeMap,
    /// `(sidecar extension, EA name)`, e.g. `(".abstract", "ABSTRACT")`.
    pub eaexts: Vec<(String, String)>,
    pub default_mime_type: String,
}

impl Entry {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            ..Default::default()
        }
    }

    /// An informational (type `i`) line.
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            selector: "fake".to_string(),
            gopher_type: Some('i'),
            name: Some(text.into()),
            populated: true,
            ..Default::default()
        }
    }

    pub fn gopher_type(&self) -> char {
        self.gopher_type.unwrap_or('0')
    }

    /// Display label, falling back to the selector.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.selector)
    }

    pub fn is_remote(&self) -> bool {
        self.host.is_some() || self.port.is_some()
    }

    pub fn is_menu(&self) -> bool {
        self.gopher_type == Some('1') || self.mime_type.as_deref() == Some(GOPHER_MENU_MIME)
    }

    /// Fill the entry from a stat of `fs_path`. A `stat` the caller already
    /// holds is reused; a failed stat leaves the entry untouched.
    pub fn populate_from_vfs(
        &mut self,
        vfs: &dyn Vfs,
        fs_path: &str,
        stat: Option<&VfsStat>,
        policy: &EntryPolicy,
    ) {
        if self.populated || self.is_remote() {
            return;
        }
        let stat = match stat {
            Some(stat) => stat.clone(),
            None => match vfs.stat(fs_path) {
                Ok(stat) => stat,
                Err(e) => {
                    tracing::trace!(path = %fs_path, error = %e, "Cannot stat entry");
                    return;
                }
            },
        };

        self.fs_path = Some(fs_path.to_string());
        self.populated = true;
        self.mtime.get_or_insert(stat.mtime);
        self.ctime.get_or_insert(stat.ctime);
        if self.name.is_none() {
            self.name = Some(selector::basename(&self.selector).to_string());
        }
        self.gopher_plus = true;

        if stat.is_dir() {
            self.gopher_type.get_or_insert('1');
            self.mime_type
                .get_or_insert_with(|| GOPHER_MENU_MIME.to_string());
            for (ext, ea_name) in &policy.eaexts {
                let sidecar = selector::join(fs_path, ext);
                self.read_ea(vfs, &sidecar, ea_name);
            }
            return;
        }

        for (ext, ea_name) in &policy.eaexts {
            let sidecar = format!("{}{}", fs_path, ext);
            self.read_ea(vfs, &sidecar, ea_name);
        }

        self.size.get_or_insert(stat.size);

        if self.mime_type.is_none() {
            let guess = policy.mimetypes.guess_type(fs_path);
            match guess.encoding {
                Some(encoding) => {
                    self.mime_type = Some("application/octet-stream".to_string());
                    self.encoding = Some(encoding);
                    self.encoded_mime_type = guess.mime_type;
                }
                None => self.mime_type = guess.mime_type,
            }
        }
        if self.mime_type.is_none() {
            self.mime_type = Some(policy.default_mime_type.clone());
        }
        if self.gopher_type.is_none() {
            let mime = self.mime_type.as_deref().unwrap_or("");
            self.gopher_type = Some(policy.type_map.gopher_type(mime));
        }
    }

    fn read_ea(&mut self, vfs: &dyn Vfs, sidecar: &str, ea_name: &str) {
        if self.ea.contains_key(ea_name) || !vfs.isfile(sidecar) {
            return;
        }
        let mut raw = Vec::new();
        let read = vfs
            .open(sidecar)
            .and_then(|f| f.take(EA_READ_LIMIT).read_to_end(&mut raw));
        match read {
            Ok(_) => {
                self.ea.insert(ea_name.to_string(), rstrip_lines(&raw));
            }
            Err(e) => tracing::debug!(sidecar = %sidecar, error = %e, "Cannot read EA sidecar"),
        }
    }

    /// Copy every field `other` sets onto this entry (UMN merge).
    pub fn merge_from(&mut self, other: &Entry) {
        self.selector = other.selector.clone();
        if other.gopher_type.is_some() {
            self.gopher_type = other.gopher_type;
        }
        if other.name.is_some() {
            self.name = other.name.clone();
        }
        if other.host.is_some() {
            self.host = other.host.clone();
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.num != 0 {
            self.num = other.num;
        }
        for (k, v) in &other.ea {
            self.ea.insert(k.clone(), v.clone());
        }
    }
}

/// Right-strip every line and re-join with `\n`.
fn rstrip_lines(raw: &[u8]) -> Vec<u8> {
    let lines: Vec<&[u8]> = raw
        .split(|&b| b == b'\n')
        .map(|line| {
            let end = line
                .iter()
                .rposition(|b| !b.is_ascii_whitespace())
                .map(|i| i + 1)
                .unwrap_or(0);
            &line[..end]
        })
        .collect();
    let mut joined = lines.join(&b'\n');
    while joined.last() == Some(&b'\n') {
        joined.pop();
    }
    joined
}
