// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gopher (RFC 1436)
//!
//! The fallback protocol: it accepts any request line. Documents are sent
//! raw; menus are one tab-separated line per entry, ended by closing the
//! connection.

use crate::domain::entry::Entry;
use crate::domain::error::{GopherError, Result};
use crate::presentation::connection::Connection;
use crate::presentation::protocols::{write_text, Protocol, ProtocolRequest, RequestState};

/// Split a tab-separated gopher request into selector and remaining fields.
pub(crate) fn parse_gopher_request(state: &mut RequestState) -> Vec<String> {
    let mut fields = state.request.split('\t').map(str::to_string);
    state.selector = fields.next().unwrap_or_default();
    fields.collect()
}

/// One menu line: `<type><name>\t<selector>\t<host>\t<port>[\t+]\r\n`.
pub(crate) fn menu_line(state: &RequestState, entry: &Entry) -> String {
    let (host, port) = state.host_port(entry);
    let mut line = format!(
        "{}{}\t{}\t{}\t{}",
        entry.gopher_type(),
        entry.display_name(),
        entry.selector,
        host,
        port
    );
    if entry.gopher_plus {
        line.push_str("\t+");
    }
    line.push_str("\r\n");
    line
}

pub struct GopherProtocol {
    state: RequestState,
}

impl GopherProtocol {
    pub fn new(req: &ProtocolRequest) -> Self {
        let mut state = RequestState::new(req);
        let rest = parse_gopher_request(&mut state);
        state.search = rest.into_iter().next();
        Self { state }
    }

    pub fn boxed(req: &ProtocolRequest) -> Box<dyn Protocol> {
        Box::new(Self::new(req))
    }
}

impl Protocol for GopherProtocol {
    fn name(&self) -> &'static str {
        "GopherProtocol"
    }

    fn state(&self) -> &RequestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    fn can_handle_request(&mut self, _conn: &mut Connection) -> bool {
        true
    }

    fn render_entry(&mut self, conn: &mut Connection, entry: &Entry) -> Result<()> {
        write_text(conn, &menu_line(&self.state, entry))?;
        Ok(())
    }

    fn render_error(&mut self, conn: &mut Connection, err: &GopherError) -> Result<()> {
        write_text(conn, &format!("3{}\terror.host\t1\r\n", err.client_message()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::application::handlers::test_support::{context, context_with};
    use crate::presentation::protocols::test_support::{exchange, exchange_text};
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("testfile.txt"), "Test\n").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        dir
    }

    #[test]
    fn test_file_is_raw() {
        let dir = tree();
        let ctx = context(dir.path());
        assert_eq!(exchange(&ctx, b"/testfile.txt\n", false), b"Test\n");
    }

    #[test]
    fn test_root_menu() {
        let dir = tree();
        let ctx = context_with(dir.path(), |c| c.handlers.dir.cachetime = 0);
        let menu = exchange_text(&ctx, "\r\n");
        assert_eq!(
            menu,
            "1sub\t/sub\tgopher.example\t70\t+\r\n\
             0testfile\t/testfile.txt\tgopher.example\t70\t+\r\n"
        );
        assert_eq!(exchange_text(&ctx, "/\n"), menu);
    }

    #[test]
    fn test_trailing_slash_equivalent() {
        let dir = tree();
        let ctx = context_with(dir.path(), |c| c.handlers.dir.cachetime = 0);
        assert_eq!(exchange_text(&ctx, "/sub/\n"), exchange_text(&ctx, "/sub\n"));
    }

    #[test]
    fn test_not_found_error_item() {
        let dir = tree();
        let ctx = context(dir.path());
        assert_eq!(
            exchange_text(&ctx, "/nope\n"),
            "3'/nope' does not exist (no handler found)\terror.host\t1\r\n"
        );
    }

    #[test]
    fn test_traversal_rejected() {
        let dir = tree();
        let ctx = context(dir.path());
        let reply = exchange_text(&ctx, "/../etc/passwd\n");
        assert!(reply.starts_with("3'/../etc/passwd' does not exist (Request may not contain"));
    }
}
