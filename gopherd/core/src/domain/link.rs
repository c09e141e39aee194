// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! UMN link file records.
//!
//! `.Links`/`.names` files and `.cap/<name>` overrides hold `Key=Value`
//! records separated by blank lines. Parsing is bug-compatible with the UMN
//! gopherd reader: a `#` line is a comment until `Path=` has been seen and
//! ends the record afterwards.

use crate::domain::entry::Entry;
use crate::domain::selector;

/// Parse every record of a link file found in directory `selector_base`.
pub fn parse_link_file(content: &str, selector_base: &str) -> Vec<Entry> {
    let mut lines = content.lines();
    let mut entries = Vec::new();
    while let Some(parsed) = next_record(&mut lines, selector_base) {
        match parsed {
            Record::Entry(entry) => entries.push(entry),
            Record::Incomplete => {}
        }
    }
    entries
}

/// Parse a `.cap/<name>` override for the file `name` in `selector_base`.
/// The path is fixed to the file itself, so the result always needs merging.
pub fn parse_cap_file(content: &str, name: &str, selector_base: &str) -> Option<Entry> {
    let full = format!("Path=./{}\n{}", name, content);
    let mut lines = full.lines();
    match next_record(&mut lines, selector_base)? {
        Record::Entry(entry) => Some(entry),
        Record::Incomplete => None,
    }
}

enum Record {
    Entry(Entry),
    /// The input ran out, or the record had no `Path=`.
    Incomplete,
}

/// Read one record. `None` once the input is exhausted with nothing pending.
fn next_record<'a, I>(lines: &mut I, selector_base: &str) -> Option<Record>
where
    I: Iterator<Item = &'a str>,
{
    let mut entry = Entry::new("");
    let mut has_path = false;
    let mut consumed = false;

    while let Some(raw) = lines.next() {
        consumed = true;
        let line = raw.trim();
        if line.starts_with('#') {
            if has_path {
                return Some(Record::Entry(finish(entry, selector_base)));
            }
            continue;
        }
        if line.is_empty() {
            if has_path {
                return Some(Record::Entry(finish(entry, selector_base)));
            }
            continue;
        }

        if let Some(value) = line.strip_prefix("Type=") {
            entry.gopher_type = value.chars().next();
        } else if let Some(value) = line.strip_prefix("Name=") {
            entry.name = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("Path=") {
            set_path(&mut entry, value, selector_base);
            has_path = true;
        } else if let Some(value) = line.strip_prefix("Host=") {
            if value != "+" && !value.is_empty() {
                entry.host = Some(value.to_string());
            }
        } else if let Some(value) = line.strip_prefix("Port=") {
            if value != "+" {
                if let Ok(port) = value.parse() {
                    entry.port = Some(port);
                }
            }
        } else if let Some(value) = line.strip_prefix("Numb=") {
            if let Ok(num) = value.parse() {
                entry.num = num;
            }
        } else if let Some(value) = line.strip_prefix("Abstract=") {
            let mut text = String::new();
            let mut current = value.to_string();
            while let Some(stripped) = current.strip_suffix('\\') {
                text.push_str(stripped);
                text.push('\n');
                match lines.next() {
                    Some(next) => current = next.trim().to_string(),
                    None => {
                        current = String::new();
                        break;
                    }
                }
            }
            text.push_str(&current);
            entry.ea.insert("ABSTRACT".to_string(), text.into_bytes());
        }
        // Admin=, URL=, TTL= and anything unknown are ignored.
    }

    if has_path {
        Some(Record::Entry(finish(entry, selector_base)))
    } else if consumed {
        Some(Record::Incomplete)
    } else {
        None
    }
}

fn set_path(entry: &mut Entry, path: &str, selector_base: &str) {
    let rest = path.strip_prefix("./").or_else(|| path.strip_prefix("~/"));
    if let Some(rest) = rest {
        entry.selector = selector::join(selector_base, rest);
        entry.needs_merge = true;
    } else if !path.starts_with('/') && !path.starts_with("URL:") {
        entry.selector = path.to_string();
        entry.needs_abspath = true;
    } else {
        entry.selector = path.to_string();
    }
}

/// Local bare-relative paths are resolved against the directory.
fn finish(mut entry: Entry, selector_base: &str) -> Entry {
    if entry.needs_abspath && !entry.is_remote() {
        entry.selector = selector::normpath(&format!("{}/{}", selector_base, entry.selector));
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_link() {
        let content = "Type=1\nName=Cheese Ball Recipes\nPath=./file.txt\nHost=zippy.example\nPort=150\n";
        let entries = parse_link_file(content, "/dir");
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.selector, "/dir/file.txt");
        assert!(e.needs_merge);
        assert_eq!(e.gopher_type, Some('1'));
        assert_eq!(e.name.as_deref(), Some("Cheese Ball Recipes"));
        assert_eq!(e.host.as_deref(), Some("zippy.example"));
        assert_eq!(e.port, Some(150));
    }

    #[test]
    fn test_multiple_records_and_comments() {
        let content = "# leading comment\nName=One\nType=0\nPath=/one\nHost=+\nPort=+\n\n\
                       Name=Two\nPath=two\nNumb=3\n# ends record\nName=Ignored\n";
        let entries = parse_link_file(content, "/base");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].selector, "/one");
        assert_eq!(entries[0].host, None);
        assert_eq!(entries[0].port, None);
        assert_eq!(entries[1].selector, "/base/two");
        assert!(entries[1].needs_abspath);
        assert_eq!(entries[1].num, 3);
    }

    #[test]
    fn test_record_without_path_is_dropped() {
        let entries = parse_link_file("Name=Orphan\nType=0\n", "/");
        assert!(entries.is_empty());
    }

    #[test]
    fn test_abstract_continuation() {
        let content = "Name=A\nPath=/a\nAbstract=line one\\\nline two\\\nline three\n";
        let entries = parse_link_file(content, "/");
        let abs = entries[0].ea.get("ABSTRACT").unwrap();
        assert_eq!(abs, b"line one\nline two\nline three");
    }

    #[test]
    fn test_root_relative_merge_path() {
        let entries = parse_link_file("Path=~/x\n", "/");
        assert_eq!(entries[0].selector, "/x");
    }

    #[test]
    fn test_cap_file() {
        let cap = parse_cap_file("Name=Nicer Name\nNumb=2\n", "file.txt", "/d").unwrap();
        assert_eq!(cap.selector, "/d/file.txt");
        assert!(cap.needs_merge);
        assert_eq!(cap.name.as_deref(), Some("Nicer Name"));

        let hidden = parse_cap_file("Type=X\n", "file.txt", "/d").unwrap();
        assert_eq!(hidden.gopher_type, Some('X'));
    }

    #[test]
    fn test_remote_relative_path_kept() {
        let entries = parse_link_file("Path=foo\nHost=far.example\nPort=70\n", "/d");
        assert_eq!(entries[0].selector, "foo");
    }
}
