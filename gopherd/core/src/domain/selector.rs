// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Selector normalization and lossless byte/string conversion.
//!
//! Requests and filenames may carry bytes that are not valid UTF-8. They are
//! decoded with an escape scheme: every byte that cannot be decoded is mapped
//! to a code point in `U+10DC80..=U+10DCFF` (plane 16 private use), so the
//! value survives string handling and is written back as the original byte.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Selector validation (traversal rejection) and the escape codec

use crate::domain::error::{GopherError, Result};
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};

const ESCAPE_BASE: u32 = 0x10DC00;

/// Decode bytes into a string, escaping undecodable bytes.
pub fn decode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let bad = e.error_len().unwrap_or(after.len());
                for &b in &after[..bad] {
                    out.push(escape_byte(b));
                }
                rest = &after[bad..];
            }
        }
    }
}

fn escape_byte(b: u8) -> char {
    char::from_u32(ESCAPE_BASE + b as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Encode a string produced by [`decode_bytes`] back to its original bytes.
pub fn encode_str(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut buf = [0u8; 4];
    for ch in s.chars() {
        let cp = ch as u32;
        if (ESCAPE_BASE + 0x80..=ESCAPE_BASE + 0xFF).contains(&cp) {
            out.push((cp - ESCAPE_BASE) as u8);
        } else {
            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        }
    }
    out
}

/// Convert an escaped string into an OS path component losslessly.
pub fn to_os_string(s: &str) -> OsString {
    OsString::from_vec(encode_str(s))
}

/// Convert an OS string (e.g. a directory entry name) into an escaped string.
pub fn from_os_str(s: &OsStr) -> String {
    decode_bytes(s.as_bytes())
}

/// Percent-decode `input` and run the result through the escape codec.
pub fn percent_decode(input: &str) -> String {
    let bytes: Vec<u8> = percent_encoding::percent_decode_str(input).collect();
    decode_bytes(&bytes)
}

/// Characters left alone when percent-encoding a selector for a URL path.
const PATH_SET: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a selector (after restoring its raw bytes) for use in a URL.
pub fn percent_encode(selector: &str) -> String {
    percent_encoding::percent_encode(&encode_str(selector), PATH_SET).to_string()
}

/// Reject selectors that try to walk out of the served tree. `URL:` links
/// never reach a filesystem and are exempt.
pub fn check_secure(selector: &str) -> Result<()> {
    if is_url_selector(selector) {
        return Ok(());
    }
    if selector.contains("./") || selector.contains("../") || selector.contains("//") {
        tracing::warn!(selector = %selector, "Rejected selector containing traversal sequence");
        return Err(GopherError::not_found(
            selector,
            "Request may not contain ./, ../, or //",
        ));
    }
    Ok(())
}

/// Normalize slashes: strip one trailing `/` (unless the selector is `/`)
/// and ensure a leading `/`. An empty selector becomes `/`.
pub fn slash_normalize(selector: &str) -> String {
    let mut selector = selector;
    if selector.len() > 1 && selector.ends_with('/') {
        selector = &selector[..selector.len() - 1];
    }
    if selector.starts_with('/') {
        selector.to_string()
    } else {
        format!("/{}", selector)
    }
}

/// Full normalization applied to every selector taken off the wire.
pub fn normalize(selector: &str) -> Result<String> {
    check_secure(selector)?;
    Ok(slash_normalize(selector))
}

/// Last path component of a selector (`""` for the root).
pub fn basename(selector: &str) -> &str {
    match selector.rfind('/') {
        Some(idx) => &selector[idx + 1..],
        None => selector,
    }
}

/// Everything before the last `/` of a selector; the root for top-level items.
pub fn dirname(selector: &str) -> &str {
    match selector.rfind('/') {
        Some(0) => "/",
        Some(idx) => &selector[..idx],
        None => "",
    }
}

/// Join a directory selector and a child name without doubling the slash.
pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() || base == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Lexically normalize a `/`-separated path: drops `.` and empty segments and
/// folds `..` into its parent. Never climbs above the root.
pub fn normpath(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// True when the selector is a `URL:` link, with or without a leading `/`.
pub fn is_url_selector(selector: &str) -> bool {
    url_target(selector).is_some()
}

/// The target of a `URL:` selector, with or without a leading `/`.
pub fn url_target(selector: &str) -> Option<&str> {
    let trimmed = selector.strip_prefix('/').unwrap_or(selector);
    trimmed.strip_prefix("URL:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rejects_traversal() {
        for bad in ["/foo/../bar", "/./foo", "/foo//bar", "../etc"] {
            let err = normalize(bad).unwrap_err();
            assert!(err.is_not_found(), "{} should be rejected", bad);
            assert!(err
                .to_string()
                .contains("Request may not contain ./, ../, or //"));
        }
    }

    #[test]
    fn test_url_selectors_pass_through() {
        assert_eq!(
            normalize("URL:http://example.org/").unwrap(),
            "/URL:http://example.org"
        );
        assert!(check_secure("/URL:gopher://host//x").is_ok());
    }

    #[test]
    fn test_normalize_slashes() {
        assert_eq!(normalize("").unwrap(), "/");
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("foo").unwrap(), "/foo");
        assert_eq!(normalize("/foo/").unwrap(), "/foo");
        assert_eq!(normalize("/foo").unwrap(), normalize("/foo/").unwrap());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for sel in ["", "/", "a/b/", "/a/b", "x"] {
            let once = normalize(sel).unwrap();
            assert_eq!(normalize(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_escape_roundtrip_invalid_bytes() {
        let raw = b"/caf\xe9/\xae".to_vec();
        let decoded = decode_bytes(&raw);
        assert!(decoded.starts_with("/caf"));
        assert_eq!(encode_str(&decoded), raw);
    }

    #[test]
    fn test_escape_keeps_valid_utf8() {
        let decoded = decode_bytes("/päth".as_bytes());
        assert_eq!(decoded, "/päth");
    }

    #[test]
    fn test_percent_decode_escapes() {
        let decoded = percent_decode("%AE");
        assert_eq!(encode_str(&decoded), vec![0xAE]);
        assert_eq!(percent_encode(&decoded), "%AE");
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(basename("/a/b.txt"), "b.txt");
        assert_eq!(basename("/"), "");
        assert_eq!(dirname("/a/b.txt"), "/a");
        assert_eq!(dirname("/b.txt"), "/");
        assert_eq!(join("/", "x"), "/x");
        assert_eq!(join("", "x"), "/x");
        assert_eq!(join("/a", "x"), "/a/x");
        assert_eq!(normpath("/a/./b/../c"), "/a/c");
        assert_eq!(normpath("/../../x"), "/x");
    }

    #[test]
    fn test_url_selector_forms() {
        assert_eq!(url_target("URL:http://x/"), Some("http://x/"));
        assert_eq!(url_target("/URL:http://x/"), Some("http://x/"));
        assert!(!is_url_selector("/docs/URL:x"));
    }
}
