// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! MIME Type Tables
//!
//! Process-wide extension tables used to infer the MIME type, the transfer
//! encoding and, through a regex table, the gopher type of served files.
//! Built once at startup and shared read-only (`Arc<MimeTypes>`) by every
//! worker afterwards.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Extension → MIME/encoding inference and the extension comparator

use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use crate::domain::error::{GopherError, Result};

const BUILTIN_TYPES: &[(&str, &str)] = &[
    (".a", "application/octet-stream"),
    (".ai", "application/postscript"),
    (".aif", "audio/x-aiff"),
    (".aifc", "audio/x-aiff"),
    (".aiff", "audio/x-aiff"),
    (".au", "audio/basic"),
    (".avi", "video/x-msvideo"),
    (".bin", "application/octet-stream"),
    (".bmp", "image/bmp"),
    (".c", "text/plain"),
    (".css", "text/css"),
    (".csv", "text/csv"),
    (".doc", "application/msword"),
    (".dvi", "application/x-dvi"),
    (".eml", "message/rfc822"),
    (".eps", "application/postscript"),
    (".exe", "application/octet-stream"),
    (".flac", "audio/flac"),
    (".gemini", "text/gemini"),
    (".gif", "image/gif"),
    (".gmi", "text/gemini"),
    (".gophermap", "application/gopher-menu"),
    (".gtar", "application/x-gtar"),
    (".h", "text/plain"),
    (".hqx", "application/mac-binhex40"),
    (".htm", "text/html"),
    (".html", "text/html"),
    (".ico", "image/vnd.microsoft.icon"),
    (".ief", "image/ief"),
    (".iso", "application/x-iso9660-image"),
    (".jpe", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".jpg", "image/jpeg"),
    (".js", "application/javascript"),
    (".json", "application/json"),
    (".ksh", "text/plain"),
    (".latex", "application/x-latex"),
    (".m3u", "application/vnd.apple.mpegurl"),
    (".man", "application/x-troff-man"),
    (".md", "text/markdown"),
    (".me", "application/x-troff-me"),
    (".mid", "audio/midi"),
    (".midi", "audio/midi"),
    (".mov", "video/quicktime"),
    (".mp2", "audio/mpeg"),
    (".mp3", "audio/mpeg"),
    (".mp4", "video/mp4"),
    (".mpeg", "video/mpeg"),
    (".mpg", "video/mpeg"),
    (".ms", "application/x-troff-ms"),
    (".nc", "application/x-netcdf"),
    (".o", "application/octet-stream"),
    (".oga", "audio/ogg"),
    (".ogg", "audio/ogg"),
    (".ogv", "video/ogg"),
    (".pbm", "image/x-portable-bitmap"),
    (".pdf", "application/pdf"),
    (".pgm", "image/x-portable-graymap"),
    (".pl", "text/plain"),
    (".png", "image/png"),
    (".pnm", "image/x-portable-anymap"),
    (".ppm", "image/x-portable-pixmap"),
    (".ps", "application/postscript"),
    (".py", "text/x-python"),
    (".qt", "video/quicktime"),
    (".ra", "audio/x-pn-realaudio"),
    (".ras", "image/x-cmu-raster"),
    (".rgb", "image/x-rgb"),
    (".roff", "application/x-troff"),
    (".rs", "text/x-rust"),
    (".rtf", "application/rtf"),
    (".rtx", "text/richtext"),
    (".sgm", "text/x-sgml"),
    (".sgml", "text/x-sgml"),
    (".sh", "application/x-sh"),
    (".shar", "application/x-shar"),
    (".snd", "audio/basic"),
    (".svg", "image/svg+xml"),
    (".tar", "application/x-tar"),
    (".tcl", "application/x-tcl"),
    (".tex", "application/x-tex"),
    (".texi", "application/x-texinfo"),
    (".texinfo", "application/x-texinfo"),
    (".tif", "image/tiff"),
    (".tiff", "image/tiff"),
    (".tr", "application/x-troff"),
    (".tsv", "text/tab-separated-values"),
    (".txt", "text/plain"),
    (".wav", "audio/x-wav"),
    (".webm", "video/webm"),
    (".webp", "image/webp"),
    (".wml", "text/vnd.wap.wml"),
    (".xbm", "image/x-xbitmap"),
    (".xhtml", "application/xhtml+xml"),
    (".xls", "application/vnd.ms-excel"),
    (".xml", "text/xml"),
    (".xpm", "image/x-xpixmap"),
    (".xwd", "image/x-xwindowdump"),
    (".zip", "application/zip"),
];

const BUILTIN_ENCODINGS: &[(&str, &str)] = &[
    (".Z", "compress"),
    (".br", "br"),
    (".bz2", "bzip2"),
    (".gz", "gzip"),
    (".xz", "xz"),
];

const BUILTIN_SUFFIXES: &[(&str, &str)] = &[
    (".svgz", ".svg.gz"),
    (".taz", ".tar.gz"),
    (".tbz2", ".tar.bz2"),
    (".tgz", ".tar.gz"),
    (".txz", ".tar.xz"),
    (".tz", ".tar.gz"),
];

/// Result of a MIME guess: the inner type and the wrapping encoding, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MimeGuess {
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
}

/// Extension tables: extension → type, extension → encoding, suffix aliases,
/// and for every type the ordered list of extensions that name it.
#[derive(Debug, Clone)]
pub struct MimeTypes {
    types: HashMap<String, String>,
    encodings: HashMap<String, String>,
    suffixes: HashMap<String, String>,
    extensions: HashMap<String, Vec<String>>,
}

impl Default for MimeTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeTypes {
    /// Built-in tables only.
    pub fn new() -> Self {
        let mut table = Self {
            types: BUILTIN_TYPES
                .iter()
                .map(|(e, t)| (e.to_string(), t.to_string()))
                .collect(),
            encodings: BUILTIN_ENCODINGS
                .iter()
                .map(|(e, t)| (e.to_string(), t.to_string()))
                .collect(),
            suffixes: BUILTIN_SUFFIXES
                .iter()
                .map(|(e, t)| (e.to_string(), t.to_string()))
                .collect(),
            extensions: HashMap::new(),
        };
        table.rebuild_extensions();
        table
    }

    /// Built-in tables merged with every readable `mime.types`-format file.
    /// Unreadable files are skipped.
    pub fn with_files<P: AsRef<Path>>(files: &[P]) -> Self {
        let mut table = Self::new();
        for file in files {
            let path = file.as_ref();
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let added = table.merge_mime_types(&content);
                    tracing::debug!(path = %path.display(), added, "Loaded MIME types file");
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Skipping MIME types file");
                }
            }
        }
        table.rebuild_extensions();
        table
    }

    /// Merge `type ext ext ...` lines; returns the number of extensions added.
    pub fn merge_mime_types(&mut self, content: &str) -> usize {
        let mut added = 0;
        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("");
            let mut words = line.split_whitespace();
            let Some(mime) = words.next() else { continue };
            for ext in words {
                self.types.insert(format!(".{}", ext), mime.to_string());
                added += 1;
            }
        }
        self.rebuild_extensions();
        added
    }

    /// Register one extension (with its leading dot).
    pub fn add_type(&mut self, ext: &str, mime: &str) {
        self.types.insert(ext.to_string(), mime.to_string());
        self.rebuild_extensions();
    }

    fn rebuild_extensions(&mut self) {
        let mut extensions: HashMap<String, Vec<String>> = HashMap::new();
        for (ext, mime) in &self.types {
            let list = extensions.entry(mime.clone()).or_default();
            list.push(ext.clone());
            for enc_ext in self.encodings.keys() {
                list.push(format!("{}{}", ext, enc_ext));
            }
        }
        for (alias, target) in &self.suffixes {
            let guess = self.guess_type(&format!("x{}", target));
            if let Some(mime) = guess.mime_type {
                extensions.entry(mime).or_default().push(alias.clone());
            }
        }
        for list in extensions.values_mut() {
            list.sort_by(|a, b| ext_cmp(a, b));
            list.dedup();
        }
        self.extensions = extensions;
    }

    /// Guess type and encoding from a file name or selector.
    ///
    /// Suffix aliases are expanded first (`.tgz` → `.tar.gz`), then one
    /// encoding extension is peeled off, then the remaining extension is
    /// looked up exactly and, failing that, lower-cased.
    pub fn guess_type(&self, name: &str) -> MimeGuess {
        let (mut base, mut ext) = split_ext(name);
        while let Some(expanded) = self.suffixes.get(&ext) {
            let joined = format!("{}{}", base, expanded);
            let (b, e) = split_ext(&joined);
            base = b;
            ext = e;
        }
        let mut encoding = None;
        if let Some(enc) = self.encodings.get(&ext) {
            encoding = Some(enc.clone());
            let (b, e) = split_ext(&base);
            base = b;
            ext = e;
        } else if let Some(enc) = self.encodings.get(&ext.to_lowercase()) {
            encoding = Some(enc.clone());
            let (b, e) = split_ext(&base);
            base = b;
            ext = e;
        }
        let _ = base;
        let mime_type = self
            .types
            .get(&ext)
            .or_else(|| self.types.get(&ext.to_lowercase()))
            .cloned();
        MimeGuess {
            mime_type,
            encoding,
        }
    }

    /// Every registered extension (single and multi-part) for `mime`,
    /// ordered by [`ext_cmp`].
    pub fn extensions_for(&self, mime: &str) -> &[String] {
        self.extensions
            .get(mime)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The first extension of `mime` that `filename` ends with.
    pub fn matching_extension(&self, mime: &str, filename: &str) -> Option<&str> {
        self.extensions_for(mime)
            .iter()
            .find(|ext| filename.len() > ext.len() && filename.ends_with(ext.as_str()))
            .map(|s| s.as_str())
    }
}

/// Split the final extension off the last path component. Leading dots of
/// the component do not start an extension (`.abstract` has none).
fn split_ext(name: &str) -> (String, String) {
    let start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let component = &name[start..];
    let leading = component.len() - component.trim_start_matches('.').len();
    match component[leading..].rfind('.') {
        Some(idx) => {
            let cut = start + leading + idx;
            (name[..cut].to_string(), name[cut..].to_string())
        }
        None => (name.to_string(), String::new()),
    }
}

/// Extension ordering: more dots first, then shorter, then lexicographic.
///
/// For `a.txt.gz` this yields `.txt.gz`, `.gz`, `.txt`, so the most
/// specific multi-part extension is tried first.
pub fn ext_cmp(a: &str, b: &str) -> Ordering {
    let dots_a = a.matches('.').count();
    let dots_b = b.matches('.').count();
    dots_b
        .cmp(&dots_a)
        .then_with(|| a.len().cmp(&b.len()))
        .then_with(|| a.cmp(b))
}

/// Ordered `(mime regex → gopher type)` table. Patterns match at the start
/// of the MIME type; the first hit wins and `0` is the fallback.
#[derive(Debug, Clone)]
pub struct GopherTypeMap {
    rules: Vec<(Regex, char)>,
}

impl GopherTypeMap {
    pub fn new(rules: &[(String, String)]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (pattern, gopher_type) in rules {
            let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
                GopherError::Config(format!("bad MIME mapping pattern '{}': {}", pattern, e))
            })?;
            let ch = gopher_type.chars().next().ok_or_else(|| {
                GopherError::Config(format!("empty gopher type for pattern '{}'", pattern))
            })?;
            compiled.push((regex, ch));
        }
        Ok(Self { rules: compiled })
    }

    pub fn gopher_type(&self, mime_type: &str) -> char {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(mime_type))
            .map(|(_, t)| *t)
            .unwrap_or('0')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_plain() {
        let m = MimeTypes::new();
        let g = m.guess_type("/docs/readme.txt");
        assert_eq!(g.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(g.encoding, None);
    }

    #[test]
    fn test_guess_encoded() {
        let m = MimeTypes::new();
        let g = m.guess_type("/a/file.txt.gz");
        assert_eq!(g.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(g.encoding.as_deref(), Some("gzip"));
    }

    #[test]
    fn test_guess_suffix_alias() {
        let m = MimeTypes::new();
        let g = m.guess_type("dist.tgz");
        assert_eq!(g.mime_type.as_deref(), Some("application/x-tar"));
        assert_eq!(g.encoding.as_deref(), Some("gzip"));
    }

    #[test]
    fn test_guess_case_fallback_and_unknown() {
        let m = MimeTypes::new();
        assert_eq!(
            m.guess_type("PIC.GIF").mime_type.as_deref(),
            Some("image/gif")
        );
        assert_eq!(m.guess_type("README").mime_type, None);
        assert_eq!(m.guess_type("/dir/.abstract").mime_type, None);
    }

    #[test]
    fn test_ext_cmp_order() {
        let mut exts = vec![".txt".to_string(), ".gz".to_string(), ".txt.gz".to_string()];
        exts.sort_by(|a, b| ext_cmp(a, b));
        assert_eq!(exts, vec![".txt.gz", ".gz", ".txt"]);
    }

    #[test]
    fn test_matching_extension_prefers_multipart() {
        let m = MimeTypes::new();
        assert_eq!(m.matching_extension("text/plain", "a.txt.gz"), Some(".txt.gz"));
        assert_eq!(m.matching_extension("text/plain", "a.txt"), Some(".txt"));
        assert_eq!(m.matching_extension("text/plain", "README"), None);
    }

    #[test]
    fn test_merge_mime_types_file_format() {
        let mut m = MimeTypes::new();
        let added = m.merge_mime_types("# comment\ntext/x-foo foo fooz\n\n");
        assert_eq!(added, 2);
        assert_eq!(
            m.guess_type("a.fooz").mime_type.as_deref(),
            Some("text/x-foo")
        );
    }

    #[test]
    fn test_gopher_type_map_first_match() {
        let map = GopherTypeMap::new(&[
            ("text/html".to_string(), "h".to_string()),
            ("text/.+".to_string(), "0".to_string()),
            ("image/gif".to_string(), "g".to_string()),
            ("image/.+".to_string(), "I".to_string()),
        ])
        .unwrap();
        assert_eq!(map.gopher_type("text/html"), 'h');
        assert_eq!(map.gopher_type("text/plain"), '0');
        assert_eq!(map.gopher_type("image/png"), 'I');
        assert_eq!(map.gopher_type("application/zip"), '0');
    }
}
