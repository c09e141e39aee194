// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Spartan
//!
//! Plaintext only. The request line is `<host> <path> <content-length>`;
//! the content that follows is taken as the search text. Responses start
//! with a one-digit status and share gemtext rendering with Gemini, except
//! that search items are `=:` prompts.

use crate::application::handlers::Handler;
use crate::domain::entry::Entry;
use crate::domain::error::{GopherError, Result};
use crate::domain::selector;
use crate::presentation::connection::{Connection, MAX_BODY};
use crate::presentation::protocols::gemini::{gemtext_mime, link_target, GEMTEXT_MIME};
use crate::presentation::protocols::{write_text, Protocol, ProtocolRequest, RequestState};

#[derive(Debug, Clone, PartialEq, Eq)]
struct SpartanRequest {
    path: String,
    content_length: u64,
}

impl SpartanRequest {
    fn parse(line: &[u8]) -> Option<Self> {
        if !line.is_ascii() {
            return None;
        }
        let text = std::str::from_utf8(line).ok()?;
        let fields: Vec<&str> = text.split(' ').collect();
        let [host, path, length] = fields.as_slice() else {
            return None;
        };
        if host.is_empty() || path.is_empty() || length.is_empty() {
            return None;
        }
        if !length.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            path: path.to_string(),
            content_length: length.parse().ok()?,
        })
    }
}

pub struct SpartanProtocol {
    state: RequestState,
    request: Option<SpartanRequest>,
}

impl SpartanProtocol {
    pub fn new(req: &ProtocolRequest) -> Self {
        let mut state = RequestState::new(req);
        let request = SpartanRequest::parse(&req.line);
        if let Some(request) = &request {
            state.selector = selector::percent_decode(&request.path);
        }
        Self { state, request }
    }

    pub fn boxed(req: &ProtocolRequest) -> Box<dyn Protocol> {
        Box::new(Self::new(req))
    }
}

impl Protocol for SpartanProtocol {
    fn name(&self) -> &'static str {
        "SpartanProtocol"
    }

    fn state(&self) -> &RequestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    fn can_handle_request(&mut self, conn: &mut Connection) -> bool {
        !conn.is_secure() && self.request.is_some()
    }

    fn handle(&mut self, conn: &mut Connection) -> Result<()> {
        if let Some(request) = &self.request {
            if request.content_length > MAX_BODY {
                write_text(conn, "4 Request body too large\r\n")?;
                return Ok(());
            }
            if request.content_length > 0 {
                let body = conn.read_body(request.content_length)?;
                if !body.is_empty() {
                    self.state.search = Some(selector::decode_bytes(&body));
                }
            }
        }
        self.serve(conn)
    }

    fn render_document(
        &mut self,
        conn: &mut Connection,
        entry: &Entry,
        handler: &mut dyn Handler,
    ) -> Result<()> {
        write_text(conn, &format!("2 {}\r\n", gemtext_mime(entry)))?;
        handler.write(conn)
    }

    fn render_dir_start(&mut self, conn: &mut Connection, _entry: &Entry) -> Result<()> {
        write_text(conn, &format!("2 {}\r\n", GEMTEXT_MIME))?;
        Ok(())
    }

    fn render_entry(&mut self, conn: &mut Connection, entry: &Entry) -> Result<()> {
        let name = entry.display_name();
        let line = match entry.gopher_type() {
            'i' => format!("{}\r\n", name),
            '7' => format!("=: {} {}\r\n", link_target(&self.state, entry), name),
            _ => format!("=> {} {}\r\n", link_target(&self.state, entry), name),
        };
        write_text(conn, &line)?;
        Ok(())
    }

    fn render_error(&mut self, conn: &mut Connection, err: &GopherError) -> Result<()> {
        let status = if err.is_not_found() { 4 } else { 5 };
        write_text(conn, &format!("{} {}\r\n", status, err.client_message()))?;
        Ok(())
    }
}
