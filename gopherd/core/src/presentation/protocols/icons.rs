// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Menu icons served under `/PYGOPHERD-HTTPPROTO-ICONS/<name>`.

/// URL prefix the HTML menus reference icons under.
pub const ICON_PREFIX: &str = "/PYGOPHERD-HTTPPROTO-ICONS/";

/// 1x1 transparent GIF; menus scale it with WIDTH/HEIGHT.
const BLANK_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

const ICON_NAMES: &[&str] = &[
    "binary",
    "error",
    "generic",
    "gopherdir",
    "html",
    "image",
    "search",
    "sound",
    "telnet",
    "text",
    "tn3270",
];

/// GIF bytes for a named icon.
pub fn icon(name: &str) -> Option<&'static [u8]> {
    ICON_NAMES.contains(&name).then_some(BLANK_GIF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_icons_are_gifs() {
        for name in ICON_NAMES {
            assert!(icon(name).unwrap().starts_with(b"GIF89a"));
        }
        assert!(icon("../etc").is_none());
    }
}
