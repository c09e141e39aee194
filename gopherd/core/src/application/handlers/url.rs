// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! URL Handlers
//!
//! `HtmlUrlHandler` answers `URL:<scheme>:...` selectors with a small HTML
//! page that forwards the client to the target. `UrlTypeRewriter` strips a
//! leading `/<type>` component from selectors that do not exist as written,
//! so `/0/docs/readme.txt` resolves to `/docs/readme.txt`.

use regex::Regex;
use std::io::Write;
use std::sync::LazyLock;

use crate::application::handlers::{dispatch, Handler, HandlerBase, HandlerRequest};
use crate::domain::entry::Entry;
use crate::domain::error::Result;
use crate::domain::selector;
use crate::domain::vfs::VfsStat;

static URL_SELECTOR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(/)?URL:[^:]+:").ok());

static TYPED_SELECTOR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^/[^/]/(.+)$").ok());

/// Escape text for inclusion in HTML/XML markup.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

pub struct HtmlUrlHandler {
    base: HandlerBase,
}

impl HtmlUrlHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }

    fn target(&self) -> &str {
        selector::url_target(self.base.selector()).unwrap_or_default()
    }
}

impl Handler for HtmlUrlHandler {
    fn name(&self) -> &'static str {
        "HTMLURLHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        URL_SELECTOR
            .as_ref()
            .is_some_and(|re| re.is_match(self.base.selector()))
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        Ok(self)
    }

    fn get_entry(&mut self) -> Entry {
        let mut entry = Entry::new(self.base.selector());
        entry.gopher_type = Some('h');
        entry.mime_type = Some("text/html".to_string());
        entry.name = Some(self.target().to_string());
        entry.populated = true;
        entry
    }

    fn write(&mut self, out: &mut dyn Write) -> Result<()> {
        let url = html_escape(self.target());
        write!(
            out,
            "<html>\n<head>\n<title>Gopher link to {url}</title>\n\
             <meta http-equiv=\"refresh\" content=\"5;URL={url}\">\n</head>\n<body>\n\
             <p>You are following a link from gopher to another site. You will be \
             taken there shortly. If that does not happen, follow \
             <a href=\"{url}\">this link</a>.</p>\n\
             <p>The URL linked is: <a href=\"{url}\">{url}</a></p>\n\
             <hr>\n<p>Generated by gopherd</p>\n</body>\n</html>\n"
        )?;
        Ok(())
    }
}

pub struct UrlTypeRewriter {
    base: HandlerBase,
}

impl UrlTypeRewriter {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }

    fn rewritten(&self) -> Option<String> {
        let re = TYPED_SELECTOR.as_ref()?;
        let caps = re.captures(self.base.selector())?;
        Some(format!("/{}", &caps[1]))
    }
}

impl Handler for UrlTypeRewriter {
    fn name(&self) -> &'static str {
        "URLTypeRewriter"
    }

    fn can_handle_request(&mut self) -> bool {
        self.base.stat.is_none() && self.rewritten().is_some()
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        let Some(target) = self.rewritten() else {
            return Ok(self);
        };
        tracing::debug!(from = %self.base.selector(), to = %target, "Rewriting typed selector");
        let mut req = self.base.req.clone();
        req.selector = target;
        dispatch(&req)
    }

    fn get_entry(&mut self) -> Entry {
        self.base.entry().clone()
    }

    fn write(&mut self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::test_support::{context, request};
    use tempfile::TempDir;

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn test_url_selector_with_and_without_slash() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        for sel in ["URL:http://example.org/?a=1&b=2", "/URL:http://example.org/?a=1&b=2"] {
            let mut handler = dispatch(&request(&ctx, sel)).unwrap();
            assert_eq!(handler.name(), "HTMLURLHandler");
            let entry = handler.get_entry();
            assert_eq!(entry.gopher_type, Some('h'));
            assert_eq!(entry.mime_type.as_deref(), Some("text/html"));
            let mut out = Vec::new();
            handler.write(&mut out).unwrap();
            let page = String::from_utf8(out).unwrap();
            assert!(page.contains("URL=http://example.org/?a=1&amp;b=2"));
        }
    }

    #[test]
    fn test_type_prefix_rewritten() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/readme.txt"), "hi").unwrap();
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/0/docs/readme.txt")).unwrap();
        assert_eq!(handler.name(), "FileHandler");
        assert_eq!(handler.get_entry().selector, "/docs/readme.txt");
    }

    #[test]
    fn test_existing_path_not_rewritten() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("a/b"), "x").unwrap();
        let ctx = context(dir.path());
        let mut handler = dispatch(&request(&ctx, "/a/b")).unwrap();
        assert_eq!(handler.get_entry().selector, "/a/b");
    }
}
