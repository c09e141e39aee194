// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gopher+
//!
//! Claims gopher requests whose second tab field asks for a Gopher+ method:
//! `+` (document with a size header), `!` (attribute block of one item) or
//! `$` (attribute blocks of every item in a menu).

use chrono::DateTime;

use crate::application::handlers::Handler;
use crate::domain::entry::{Entry, GOPHER_MENU_MIME};
use crate::domain::error::{GopherError, Result};
use crate::presentation::connection::Connection;
use crate::presentation::protocols::gopher::{menu_line, parse_gopher_request};
use crate::presentation::protocols::{
    fail, open_handler, prepare_handler, write_text, Protocol, ProtocolRequest, RequestState,
};

/// Announces a response that lasts until the connection closes.
const UNTIL_CLOSE: &str = "+-2\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    DocumentOnly,
    InfoOnly,
    Directory,
    /// Not a Gopher+ request.
    None,
}

impl Method {
    fn from_field(field: Option<&str>) -> Self {
        match field {
            Some("!") => Method::InfoOnly,
            Some(f) if f.starts_with('+') => Method::DocumentOnly,
            Some(f) if f.starts_with('$') => Method::Directory,
            _ => Method::None,
        }
    }
}

pub struct GopherPlusProtocol {
    state: RequestState,
    method: Method,
}

impl GopherPlusProtocol {
    pub fn new(req: &ProtocolRequest) -> Self {
        let mut state = RequestState::new(req);
        let rest = parse_gopher_request(&mut state);
        let method = Method::from_field(rest.first().map(String::as_str));
        if method == Method::None {
            state.search = rest.into_iter().next();
        }
        Self { state, method }
    }

    pub fn boxed(req: &ProtocolRequest) -> Box<dyn Protocol> {
        Box::new(Self::new(req))
    }

    fn admin(&self) -> &str {
        &self.state.ctx.config.protocols.gopherp.admin
    }

    /// `+INFO`, `+ADMIN`, `+VIEWS` and one block per extended attribute.
    fn info_block(&self, entry: &Entry) -> String {
        let mut block = format!("+INFO: {}", menu_line(&self.state, entry));
        block.push_str(&format!("+ADMIN:\r\n Admin: {}\r\n", self.admin()));
        if let Some(modified) = entry.mtime.and_then(|t| DateTime::from_timestamp(t, 0)) {
            block.push_str(&format!(
                " Mod-Date: {} <{}>\r\n",
                modified.format("%a %b %e %H:%M:%S %Y"),
                modified.format("%Y%m%d%H%M%S")
            ));
        }
        if let Some(mime) = entry.mime_type.as_deref() {
            let mime = if mime == GOPHER_MENU_MIME {
                "application/gopher+-menu"
            } else {
                mime
            };
            block.push_str("+VIEWS:\r\n ");
            block.push_str(mime);
            if let Some(language) = &entry.language {
                block.push(' ');
                block.push_str(language);
            }
            block.push(':');
            if let Some(size) = entry.size {
                block.push_str(&format!(" <{}k>", size.div_ceil(1024)));
            }
            block.push_str("\r\n");
        }
        for (name, value) in &entry.ea {
            block.push_str(&format!("+{}:\r\n", name));
            for line in String::from_utf8_lossy(value).lines() {
                block.push_str(&format!(" {}\r\n", line));
            }
        }
        block
    }

    fn info_only(&mut self, conn: &mut Connection) -> Result<()> {
        let name = self.name();
        let mut handler = match open_handler(&mut self.state, name) {
            Ok(handler) => handler,
            Err(e) => return fail(self, conn, e),
        };
        let entry = handler.get_entry();
        write_text(conn, UNTIL_CLOSE)?;
        write_text(conn, &self.info_block(&entry))?;
        Ok(())
    }

    fn directory(&mut self, conn: &mut Connection) -> Result<()> {
        let name = self.name();
        let mut handler = match prepare_handler(&mut self.state, name) {
            Ok(handler) => handler,
            Err(e) => return fail(self, conn, e),
        };
        write_text(conn, UNTIL_CLOSE)?;
        if handler.is_dir() {
            for child in handler.dir_entries() {
                write_text(conn, &self.info_block(child))?;
            }
        } else {
            let entry = handler.get_entry();
            write_text(conn, &self.info_block(&entry))?;
        }
        Ok(())
    }
}

impl Protocol for GopherPlusProtocol {
    fn name(&self) -> &'static str {
        "GopherPlusProtocol"
    }

    fn state(&self) -> &RequestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    fn can_handle_request(&mut self, _conn: &mut Connection) -> bool {
        self.method != Method::None
    }

    fn handle(&mut self, conn: &mut Connection) -> Result<()> {
        match self.method {
            Method::InfoOnly => self.info_only(conn),
            Method::Directory => self.directory(conn),
            Method::DocumentOnly | Method::None => self.serve(conn),
        }
    }

    fn render_document(
        &mut self,
        conn: &mut Connection,
        entry: &Entry,
        handler: &mut dyn Handler,
    ) -> Result<()> {
        match entry.size {
            Some(size) => write_text(conn, &format!("+{}\r\n", size))?,
            None => write_text(conn, UNTIL_CLOSE)?,
        }
        handler.write(conn)
    }

    fn render_dir_start(&mut self, conn: &mut Connection, _entry: &Entry) -> Result<()> {
        write_text(conn, UNTIL_CLOSE)?;
        Ok(())
    }

    fn render_entry(&mut self, conn: &mut Connection, entry: &Entry) -> Result<()> {
        write_text(conn, &menu_line(&self.state, entry))?;
        Ok(())
    }

    fn render_error(&mut self, conn: &mut Connection, err: &GopherError) -> Result<()> {
        let reply = format!("--2\r\n1 {}\r\n{}\r\n", self.admin(), err.client_message());
        write_text(conn, &reply)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::application::handlers::test_support::context_with;
    use crate::presentation::protocols::test_support::exchange_text;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("README"), "read me\n").unwrap();
        std::fs::write(dir.path().join("README.abstract"), "About this\nserver  \n").unwrap();
        dir
    }

    fn ctx(dir: &TempDir) -> std::sync::Arc<crate::application::server_context::ServerContext> {
        context_with(dir.path(), |c| {
            c.handlers.dir.cachetime = 0;
            c.protocols.gopherp.admin = "Root <root@gopher.example>".to_string();
        })
    }

    #[test]
    fn test_info_only() {
        let dir = tree();
        let reply = exchange_text(&ctx(&dir), "/README\t!\n");
        assert!(reply.starts_with(
            "+-2\r\n+INFO: 0README\t/README\tgopher.example\t70\t+\r\n\
             +ADMIN:\r\n Admin: Root <root@gopher.example>\r\n Mod-Date: "
        ));
        assert!(reply.contains("+VIEWS:\r\n text/plain: <1k>\r\n"));
        assert!(reply.ends_with("+ABSTRACT:\r\n About this\r\n server\r\n"));
    }

    #[test]
    fn test_document_only_has_size() {
        let dir = tree();
        assert_eq!(exchange_text(&ctx(&dir), "/README\t+\n"), "+8\r\nread me\n");
    }

    #[test]
    fn test_directory_info() {
        let dir = tree();
        let reply = exchange_text(&ctx(&dir), "/\t$\n");
        assert!(reply.starts_with("+-2\r\n+INFO: 0README\t/README\t"));
        assert_eq!(reply.matches("+INFO:").count(), 1);
    }

    #[test]
    fn test_error_block() {
        let dir = tree();
        assert_eq!(
            exchange_text(&ctx(&dir), "/missing\t+\n"),
            "--2\r\n1 Root <root@gopher.example>\r\n'/missing' does not exist (no handler found)\r\n"
        );
    }
}
