// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! WAP/WML
//!
//! HTTP requests from WAP browsers get WML decks instead of HTML. A request
//! is claimed when its path sits under `waptop`, or when the client accepts
//! `text/vnd.wap.wml` and sends a WAP device header.

use std::io::Write;

use crate::application::handlers::url::html_escape;
use crate::application::handlers::Handler;
use crate::domain::entry::Entry;
use crate::domain::error::{GopherError, Result};
use crate::domain::selector;
use crate::presentation::connection::Connection;
use crate::presentation::protocols::http::{write_ok_header, HttpRequestLine};
use crate::presentation::protocols::{write_text, Protocol, ProtocolRequest, RequestState};

const WML_MIME: &str = "text/vnd.wap.wml";

/// Access keys handed out to the first links of a card.
const ACCESS_KEYS: &[char] = &['1', '2', '3', '4', '5', '6', '7', '8', '9', '0', '*', '#'];

fn deck_start(title: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n\
         <!DOCTYPE wml PUBLIC \"-//WAPFORUM//DTD WML 1.1//EN\" \"http://www.wapforum.org/DTD/wml_1.1.xml\">\n\
         <wml>\n<card id=\"index\" title=\"{}\" newcontext=\"true\">\n<p>\n",
        html_escape(title)
    )
}

const DECK_END: &str = "</p>\n</card>\n</wml>\n";

pub struct WapProtocol {
    state: RequestState,
    line: Option<HttpRequestLine>,
    under_waptop: bool,
    links: usize,
    searches: usize,
}

impl WapProtocol {
    pub fn new(req: &ProtocolRequest) -> Self {
        let mut state = RequestState::new(req);
        let line = HttpRequestLine::parse(&state.request);
        let mut under_waptop = false;
        if let Some(line) = &line {
            let waptop = &req.ctx.config.protocols.wap.waptop;
            let path = match line.path.strip_prefix(waptop.as_str()) {
                Some(rest) => {
                    under_waptop = true;
                    rest
                }
                None => line.path.as_str(),
            };
            state.selector = selector::percent_decode(path);
            if state.selector.is_empty() {
                state.selector = "/".to_string();
            }
            state.search = line.search();
        }
        Self {
            state,
            line,
            under_waptop,
            links: 0,
            searches: 0,
        }
    }

    pub fn boxed(req: &ProtocolRequest) -> Box<dyn Protocol> {
        Box::new(Self::new(req))
    }

    fn is_head(&self) -> bool {
        self.line.as_ref().is_some_and(|l| l.head)
    }

    fn waptop(&self) -> &str {
        &self.state.ctx.config.protocols.wap.waptop
    }

    fn entry_url(&self, entry: &Entry) -> String {
        if let Some(target) = selector::url_target(&entry.selector) {
            return target.to_string();
        }
        if self.state.is_foreign(entry) {
            return self.state.gopher_url(entry);
        }
        format!("{}{}", self.waptop(), selector::percent_encode(&entry.selector))
    }

    fn next_access_key(&mut self) -> Option<char> {
        let key = ACCESS_KEYS.get(self.links).copied();
        self.links += 1;
        key
    }
}

impl Protocol for WapProtocol {
    fn name(&self) -> &'static str {
        "WAPProtocol"
    }

    fn state(&self) -> &RequestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    fn can_handle_request(&mut self, conn: &mut Connection) -> bool {
        if self.line.is_none() {
            return false;
        }
        let headers = match conn.http_headers() {
            Ok(headers) => headers,
            Err(e) => {
                tracing::debug!(error = %e, "Could not read HTTP headers");
                return self.under_waptop;
            }
        };
        if self.under_waptop {
            return true;
        }
        let accepts_wml = headers
            .get("accept")
            .is_some_and(|accept| accept.contains(WML_MIME));
        accepts_wml
            && (headers.contains_key("x-wap-profile") || headers.contains_key("x-up-devcap-max-pdu"))
    }

    fn render_document(
        &mut self,
        conn: &mut Connection,
        entry: &Entry,
        handler: &mut dyn Handler,
    ) -> Result<()> {
        let mime = entry.mime_type.as_deref().unwrap_or("text/plain");
        if mime != "text/plain" {
            write_ok_header(conn, mime, entry)?;
            if self.is_head() {
                return Ok(());
            }
            return handler.write(conn);
        }

        write_ok_header(conn, WML_MIME, entry)?;
        if self.is_head() {
            return Ok(());
        }
        let mut body = Vec::new();
        handler.write(&mut body)?;
        let text = html_escape(&selector::decode_bytes(&body));
        let mut card = deck_start(entry.display_name());
        for line in text.lines() {
            card.push_str(line);
            card.push_str("<br/>\n");
        }
        card.push_str(DECK_END);
        write_text(conn, &card)?;
        Ok(())
    }

    fn render_dir_start(&mut self, conn: &mut Connection, entry: &Entry) -> Result<()> {
        write_ok_header(conn, WML_MIME, entry)?;
        if self.is_head() {
            return Ok(());
        }
        write_text(conn, &deck_start(entry.display_name()))?;
        Ok(())
    }

    fn render_entry(&mut self, conn: &mut Connection, entry: &Entry) -> Result<()> {
        if self.is_head() {
            return Ok(());
        }
        let name = html_escape(entry.display_name());
        let line = match entry.gopher_type() {
            'i' => format!("{}<br/>\n", name),
            '7' => {
                let field = format!("sr{}", self.searches);
                self.searches += 1;
                format!(
                    "<input name=\"{field}\" title=\"{name}\"/>\n\
                     <anchor>{name}<go method=\"get\" href=\"{}\">\
                     <postfield name=\"searchrequest\" value=\"$({field})\"/></go></anchor><br/>\n",
                    html_escape(&self.entry_url(entry))
                )
            }
            _ => {
                let url = html_escape(&self.entry_url(entry));
                match self.next_access_key() {
                    Some(key) => format!("<a href=\"{url}\" accesskey=\"{key}\">{name}</a><br/>\n"),
                    None => format!("<a href=\"{url}\">{name}</a><br/>\n"),
                }
            }
        };
        write_text(conn, &line)?;
        Ok(())
    }

    fn render_dir_end(&mut self, conn: &mut Connection, _entry: &Entry) -> Result<()> {
        if !self.is_head() {
            write_text(conn, DECK_END)?;
        }
        Ok(())
    }

    fn render_error(&mut self, conn: &mut Connection, err: &GopherError) -> Result<()> {
        let mut reply = format!("HTTP/1.0 404 Not Found\r\nContent-Type: {}\r\n\r\n", WML_MIME);
        reply.push_str(&deck_start("Error"));
        reply.push_str(&html_escape(&err.client_message()));
        reply.push_str("<br/>\n");
        reply.push_str(DECK_END);
        write_text(conn, &reply)?;
        Ok(())
    }
}
