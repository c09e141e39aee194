// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP/1.0
//!
//! Serves the gopher space to web browsers. Documents go out with their
//! MIME type; menus are rendered as an HTML table with one icon per item.
//! One request per connection: no keep-alive, no chunking.
//!
//! # Architecture
//!
//! - **Layer:** Presentation Layer
//! - **Purpose:** Browser access; request-line parsing shared with WAP

use chrono::DateTime;
use std::io::Write;

use crate::application::handlers::url::html_escape;
use crate::application::handlers::Handler;
use crate::domain::entry::{Entry, GOPHER_MENU_MIME};
use crate::domain::error::{GopherError, Result};
use crate::domain::selector;
use crate::presentation::connection::Connection;
use crate::presentation::protocols::icons::{icon, ICON_PREFIX};
use crate::presentation::protocols::{write_text, Protocol, ProtocolRequest, RequestState};

/// `GET|HEAD <path> HTTP/<version>`, path and query still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HttpRequestLine {
    pub head: bool,
    pub path: String,
    pub query: Option<String>,
}

impl HttpRequestLine {
    pub fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let [method, target, version] = parts.as_slice() else {
            return None;
        };
        if !matches!(*method, "GET" | "HEAD") || !version.starts_with("HTTP/") {
            return None;
        }
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (*target, None),
        };
        Some(Self {
            head: *method == "HEAD",
            path: path.to_string(),
            query,
        })
    }

    pub fn selector(&self) -> String {
        selector::percent_decode(&self.path)
    }

    /// Search text from the query; forms submit it as `searchrequest=`.
    pub fn search(&self) -> Option<String> {
        let query = self.query.as_deref()?;
        match query.strip_prefix("searchrequest=") {
            Some(value) => Some(selector::percent_decode(&value.replace('+', " "))),
            None => Some(selector::percent_decode(query)),
        }
    }
}

pub(crate) fn http_date(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

/// Status line and headers for a successful response.
pub(crate) fn write_ok_header(out: &mut dyn Write, content_type: &str, entry: &Entry) -> Result<()> {
    let mut header = String::from("HTTP/1.0 200 OK\r\n");
    if let Some(date) = entry.mtime.and_then(http_date) {
        header.push_str(&format!("Last-Modified: {}\r\n", date));
    }
    header.push_str(&format!("Content-Type: {}\r\n", content_type));
    if let Some(encoding) = &entry.encoding {
        header.push_str(&format!("Content-Encoding: {}\r\n", encoding));
    }
    header.push_str("\r\n");
    out.write_all(header.as_bytes())?;
    Ok(())
}

fn content_type(entry: &Entry) -> &str {
    match entry.mime_type.as_deref() {
        Some(GOPHER_MENU_MIME) => "text/html",
        Some(mime) => mime,
        None => "text/plain",
    }
}

pub struct HttpProtocol {
    state: RequestState,
    line: Option<HttpRequestLine>,
}

impl HttpProtocol {
    pub fn new(req: &ProtocolRequest) -> Self {
        let mut state = RequestState::new(req);
        let line = HttpRequestLine::parse(&state.request);
        if let Some(line) = &line {
            state.selector = line.selector();
            state.search = line.search();
        }
        Self { state, line }
    }

    pub fn boxed(req: &ProtocolRequest) -> Box<dyn Protocol> {
        Box::new(Self::new(req))
    }

    fn is_head(&self) -> bool {
        self.line.as_ref().is_some_and(|l| l.head)
    }

    fn serve_icon(&mut self, conn: &mut Connection) -> Result<()> {
        let name = &self.state.selector[ICON_PREFIX.len()..];
        match icon(name) {
            Some(gif) => {
                conn.write_all(b"HTTP/1.0 200 OK\r\nContent-Type: image/gif\r\n\r\n")?;
                if !self.is_head() {
                    conn.write_all(gif)?;
                }
                Ok(())
            }
            None => {
                let err = GopherError::missing(self.state.selector.clone());
                self.render_error(conn, &err)
            }
        }
    }

    fn entry_url(&self, entry: &Entry) -> String {
        if let Some(target) = selector::url_target(&entry.selector) {
            return target.to_string();
        }
        if self.state.is_foreign(entry) {
            return self.state.gopher_url(entry);
        }
        selector::percent_encode(&entry.selector)
    }

    fn title(entry: &Entry) -> &str {
        match entry.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &entry.selector,
        }
    }
}

impl Protocol for HttpProtocol {
    fn name(&self) -> &'static str {
        "HTTPProtocol"
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
        // Drain the header block.
        if let Err(e) = conn.http_headers() {
            tracing::debug!(error = %e, "Could not read HTTP headers");
        }
        true
    }

    fn handle(&mut self, conn: &mut Connection) -> Result<()> {
        if self.state.selector.starts_with(ICON_PREFIX) {
            return self.serve_icon(conn);
        }
        self.serve(conn)
    }

    fn render_document(
        &mut self,
        conn: &mut Connection,
        entry: &Entry,
        handler: &mut dyn Handler,
    ) -> Result<()> {
        write_ok_header(conn, content_type(entry), entry)?;
        if self.is_head() {
            return Ok(());
        }
        handler.write(conn)
    }

    fn render_dir_start(&mut self, conn: &mut Connection, entry: &Entry) -> Result<()> {
        write_ok_header(conn, "text/html", entry)?;
        if self.is_head() {
            return Ok(());
        }
        let title = html_escape(Self::title(entry));
        let mut page = format!(
            "<html>\n<head><title>Gopher: {title}</title></head>\n\
             <body>\n<h1>Gopher: {title}</h1>\n"
        );
        if let Some(topper) = &self.state.ctx.config.protocols.http.pagetopper {
            page.push_str(&topper.replace("GOPHERURL", &self.state.gopher_url(entry)));
            page.push('\n');
        }
        page.push_str("<table width=\"100%\" cellspacing=\"1\" cellpadding=\"0\">\n");
        write_text(conn, &page)?;
        Ok(())
    }

    fn render_entry(&mut self, conn: &mut Connection, entry: &Entry) -> Result<()> {
        if self.is_head() {
            return Ok(());
        }
        let name = html_escape(entry.display_name());
        let gopher_type = entry.gopher_type();
        if gopher_type == 'i' {
            write_text(conn, &format!("<tr><td>&nbsp;</td><td><pre>{}</pre></td></tr>\n", name))?;
            return Ok(());
        }

        let url = html_escape(&self.entry_url(entry));
        let icon = self.state.ctx.icon_for(gopher_type);
        let mut row = format!(
            "<tr><td>&nbsp;<img alt=\" * \" src=\"{ICON_PREFIX}{icon}\" width=\"20\" height=\"22\" border=\"0\"></td>\
             <td>&nbsp;<a href=\"{url}\"><tt>{name}</tt></a>"
        );
        if gopher_type == '7' {
            row.push_str(&format!(
                "<br>\n<form method=\"get\" action=\"{url}\">\
                 <input type=\"text\" name=\"searchrequest\" size=\"30\">\
                 <input type=\"submit\" value=\"Search\"></form>"
            ));
        }
        if let Some(abstract_text) = entry.ea.get("ABSTRACT") {
            let text = html_escape(&selector::decode_bytes(abstract_text));
            row.push_str(&format!("<br>{}", text.replace('\n', "<br>\n")));
        }
        row.push_str("</td></tr>\n");
        write_text(conn, &row)?;
        Ok(())
    }

    fn render_dir_end(&mut self, conn: &mut Connection, entry: &Entry) -> Result<()> {
        if self.is_head() {
            return Ok(());
        }
        let footer = format!(
            "</table>\n<hr>\n[<a href=\"/\">server top</a>] \
             [<a href=\"{}\">view with gopher</a>]<br>\n\
             Generated by gopherd\n</body>\n</html>\n",
            html_escape(&self.state.gopher_url(entry))
        );
        write_text(conn, &footer)?;
        Ok(())
    }

    fn render_error(&mut self, conn: &mut Connection, err: &GopherError) -> Result<()> {
        let page = format!(
            "HTTP/1.0 404 Not Found\r\nContent-Type: text/html\r\n\r\n\
             <html>\n<head><title>Selector Not Found</title></head>\n<body>\n\
             <h1>Selector Not Found</h1>\n<tt>{}</tt>\n<hr>\ngopherd\n</body>\n</html>\n",
            html_escape(&err.client_message())
        );
        write_text(conn, &page)?;
        Ok(())
    }
}
