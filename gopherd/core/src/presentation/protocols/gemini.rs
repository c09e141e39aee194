// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gemini
//!
//! TLS-only. The request is one absolute `gemini://` URL; the response is a
//! two-digit status, a meta string and, on success, the body. Menus are
//! rendered as `text/gemini`. Search items link to `/GEMINI-QUERY<selector>`,
//! which prompts for input and redirects back with the query attached.

use crate::application::handlers::Handler;
use crate::domain::entry::{Entry, GOPHER_MENU_MIME};
use crate::domain::error::{GopherError, Result};
use crate::domain::selector;
use crate::presentation::connection::Connection;
use crate::presentation::protocols::{write_text, Protocol, ProtocolRequest, RequestState};

pub(crate) const GEMTEXT_MIME: &str = "text/gemini";

const QUERY_PREFIX: &str = "/GEMINI-QUERY";

/// Link target for a gemtext line: `URL:` targets as-is, foreign items as
/// `gopher://` URLs and local items as absolute paths.
pub(crate) fn link_target(state: &RequestState, entry: &Entry) -> String {
    if let Some(target) = selector::url_target(&entry.selector) {
        return target.to_string();
    }
    if state.is_foreign(entry) {
        return state.gopher_url(entry);
    }
    selector::percent_encode(&entry.selector)
}

/// Gemtext uses the menu's own type for directory listings.
pub(crate) fn gemtext_mime(entry: &Entry) -> &str {
    match entry.mime_type.as_deref() {
        Some(GOPHER_MENU_MIME) => GEMTEXT_MIME,
        Some(mime) => mime,
        None => "text/plain",
    }
}

pub struct GeminiProtocol {
    state: RequestState,
    url: Option<url::Url>,
}

impl GeminiProtocol {
    pub fn new(req: &ProtocolRequest) -> Self {
        let mut state = RequestState::new(req);
        let url = url::Url::parse(&state.request).ok();
        if let Some(url) = &url {
            state.selector = selector::percent_decode(url.path());
            if state.selector.is_empty() {
                state.selector = "/".to_string();
            }
            state.search = url.query().map(selector::percent_decode);
        }
        Self { state, url }
    }

    pub fn boxed(req: &ProtocolRequest) -> Box<dyn Protocol> {
        Box::new(Self::new(req))
    }

    /// Prompt for input, or send the client back to the real selector with
    /// its query.
    fn query_redirect(&self, conn: &mut Connection, url: &url::Url) -> Result<()> {
        match url.query() {
            Some(query) if !query.is_empty() => {
                let target = url.path().strip_prefix(QUERY_PREFIX).unwrap_or(url.path());
                write_text(conn, &format!("30 {}?{}\r\n", target, query))?;
            }
            _ => write_text(conn, "10 Enter input\r\n")?,
        }
        Ok(())
    }
}

impl Protocol for GeminiProtocol {
    fn name(&self) -> &'static str {
        "GeminiProtocol"
    }

    fn state(&self) -> &RequestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    fn can_handle_request(&mut self, conn: &mut Connection) -> bool {
        conn.is_secure() && self.state.request.starts_with("gemini://")
    }

    fn handle(&mut self, conn: &mut Connection) -> Result<()> {
        let Some(url) = self.url.clone() else {
            write_text(conn, "59 Bad request\r\n")?;
            return Ok(());
        };
        if self.state.selector.starts_with(&format!("{}/", QUERY_PREFIX)) {
            return self.query_redirect(conn, &url);
        }
        self.serve(conn)
    }

    fn render_document(
        &mut self,
        conn: &mut Connection,
        entry: &Entry,
        handler: &mut dyn Handler,
    ) -> Result<()> {
        write_text(conn, &format!("20 {}\r\n", gemtext_mime(entry)))?;
        handler.write(conn)
    }

    fn render_dir_start(&mut self, conn: &mut Connection, _entry: &Entry) -> Result<()> {
        write_text(conn, &format!("20 {}\r\n", GEMTEXT_MIME))?;
        Ok(())
    }

    fn render_entry(&mut self, conn: &mut Connection, entry: &Entry) -> Result<()> {
        let name = entry.display_name();
        let line = match entry.gopher_type() {
            'i' => format!("{}\r\n", name),
            '7' if !self.state.is_foreign(entry) => format!(
                "=> {}{} {}\r\n",
                QUERY_PREFIX,
                selector::percent_encode(&entry.selector),
                name
            ),
            _ => format!("=> {} {}\r\n", link_target(&self.state, entry), name),
        };
        write_text(conn, &line)?;
        Ok(())
    }

    fn render_error(&mut self, conn: &mut Connection, err: &GopherError) -> Result<()> {
        write_text(conn, &format!("51 {}\r\n", err.client_message()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::application::handlers::test_support::context_with;
    use crate::presentation::protocols::test_support::exchange;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi\n").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        dir
    }

    fn secure(dir: &TempDir, input: &str) -> String {
        let ctx = context_with(dir.path(), |c| c.handlers.dir.cachetime = 0);
        String::from_utf8_lossy(&exchange(&ctx, input.as_bytes(), true)).into_owned()
    }

    #[test]
    fn test_document() {
        let dir = tree();
        assert_eq!(secure(&dir, "gemini://localhost/hello.txt\r\n"), "20 text/plain\r\nhi\n");
    }

    #[test]
    fn test_menu_is_gemtext() {
        let dir = tree();
        assert_eq!(
            secure(&dir, "gemini://localhost/\r\n"),
            "20 text/gemini\r\n=> /docs docs\r\n=> /hello.txt hello\r\n"
        );
    }

    #[test]
    fn test_query_prompt_and_redirect() {
        let dir = tree();
        assert_eq!(
            secure(&dir, "gemini://localhost/GEMINI-QUERY/some/path\r\n"),
            "10 Enter input\r\n"
        );
        assert_eq!(
            secure(&dir, "gemini://localhost/GEMINI-QUERY/some/path?%AE\r\n"),
            "30 /some/path?%AE\r\n"
        );
    }

    #[test]
    fn test_not_found() {
        let dir = tree();
        assert!(secure(&dir, "gemini://localhost/missing\r\n").starts_with("51 '/missing' does not exist"));
    }
}
