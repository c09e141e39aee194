// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wire Protocols
//!
//! Every protocol decodes one request line into a selector and an optional
//! search string, resolves a handler and frames the handler's output for
//! its clients. The [`ProtocolMultiplexer`] offers the first request line to
//! each configured protocol in order; the first that claims it serves the
//! connection.
//!
//! # Architecture
//!
//! - **Layer:** Presentation Layer
//! - **Purpose:** Request decoding, response framing and protocol selection

pub mod gemini;
pub mod gopher;
pub mod gopherp;
pub mod http;
pub mod icons;
pub mod spartan;
pub mod wap;

use std::io::Write;
use std::sync::Arc;

use crate::application::handlers::{dispatch, Handler, HandlerRequest};
use crate::application::server_context::ServerContext;
use crate::domain::entry::Entry;
use crate::domain::error::{GopherError, Result};
use crate::domain::selector;
use crate::domain::server_config::short_name;
use crate::presentation::connection::Connection;

/// The first line of a connection and what is known about its transport.
#[derive(Debug, Clone)]
pub struct ProtocolRequest {
    pub ctx: Arc<ServerContext>,
    /// Request line without its terminator.
    pub line: Vec<u8>,
    pub secure: bool,
    pub peer: Option<String>,
}

impl ProtocolRequest {
    /// The request line decoded with the surrogate-escape codec.
    pub fn text(&self) -> String {
        selector::decode_bytes(&self.line)
    }
}

/// Per-request state shared by every protocol.
#[derive(Debug, Clone)]
pub struct RequestState {
    pub ctx: Arc<ServerContext>,
    /// Decoded request line.
    pub request: String,
    pub selector: String,
    pub search: Option<String>,
    pub secure: bool,
    pub peer: Option<String>,
}

impl RequestState {
    pub fn new(req: &ProtocolRequest) -> Self {
        Self {
            ctx: req.ctx.clone(),
            request: req.text(),
            selector: "/".to_string(),
            search: None,
            secure: req.secure,
            peer: req.peer.clone(),
        }
    }

    /// Normalize the selector and find its handler.
    pub fn dispatch(&mut self, protocol: &'static str) -> Result<Box<dyn Handler>> {
        self.selector = selector::normalize(&self.selector)?;
        let mut req = HandlerRequest::new(
            self.ctx.clone(),
            self.selector.clone(),
            self.search.clone(),
            protocol,
        );
        req.peer = self.peer.clone();
        dispatch(&req)
    }

    pub fn server_name(&self) -> &str {
        self.ctx.server_name()
    }

    pub fn port(&self) -> u16 {
        self.ctx.advertised_port()
    }

    /// Host and port an entry points at, defaulting to this server.
    pub fn host_port<'a>(&'a self, entry: &'a Entry) -> (&'a str, u16) {
        (
            entry.host.as_deref().unwrap_or(self.server_name()),
            entry.port.unwrap_or(self.port()),
        )
    }

    /// Whether an entry lives on another server.
    pub fn is_foreign(&self, entry: &Entry) -> bool {
        let (host, port) = self.host_port(entry);
        host != self.server_name() || port != self.port()
    }

    /// `gopher://` URL for an entry.
    pub fn gopher_url(&self, entry: &Entry) -> String {
        let (host, port) = self.host_port(entry);
        format!(
            "gopher://{}:{}/{}{}",
            host,
            port,
            entry.gopher_type(),
            selector::percent_encode(&entry.selector)
        )
    }
}

/// Write a decoded string back as the bytes it came from.
pub(crate) fn write_text(out: &mut dyn Write, text: &str) -> std::io::Result<()> {
    out.write_all(&selector::encode_str(text))
}

/// A decoded request bound to one protocol.
///
/// `handle` runs the standard flow: dispatch, `prepare`, then either the
/// menu hooks or `render_document`. Failures before any output go to
/// `render_error`.
pub trait Protocol: Send {
    fn name(&self) -> &'static str;

    fn state(&self) -> &RequestState;

    fn state_mut(&mut self) -> &mut RequestState;

    /// Claim the request. May read HTTP headers from the connection.
    fn can_handle_request(&mut self, conn: &mut Connection) -> bool;

    fn handle(&mut self, conn: &mut Connection) -> Result<()> {
        self.serve(conn)
    }

    /// Resolve and serve the current selector.
    fn serve(&mut self, conn: &mut Connection) -> Result<()> {
        let name = self.name();
        let mut handler = match prepare_handler(self.state_mut(), name) {
            Ok(handler) => handler,
            Err(e) => return fail(self, conn, e),
        };
        let entry = handler.get_entry();
        if handler.is_dir() {
            self.render_dir_start(conn, &entry)?;
            for child in handler.dir_entries() {
                self.render_entry(conn, child)?;
            }
            self.render_dir_end(conn, &entry)?;
            Ok(())
        } else {
            self.render_document(conn, &entry, handler.as_mut())
        }
    }

    fn render_document(
        &mut self,
        conn: &mut Connection,
        _entry: &Entry,
        handler: &mut dyn Handler,
    ) -> Result<()> {
        handler.write(conn)
    }

    fn render_dir_start(&mut self, _conn: &mut Connection, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    fn render_entry(&mut self, conn: &mut Connection, entry: &Entry) -> Result<()>;

    fn render_dir_end(&mut self, _conn: &mut Connection, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    fn render_error(&mut self, conn: &mut Connection, err: &GopherError) -> Result<()>;
}

/// Dispatch and log the request.
pub(crate) fn open_handler(
    state: &mut RequestState,
    protocol: &'static str,
) -> Result<Box<dyn Handler>> {
    metrics::counter!("gopherd_requests_total", "protocol" => protocol).increment(1);
    let handler = state.dispatch(protocol)?;
    tracing::info!(
        peer = state.peer.as_deref().unwrap_or("-"),
        protocol,
        handler = handler.name(),
        selector = %state.selector,
        "Request"
    );
    Ok(handler)
}

/// [`open_handler`] followed by `prepare`.
pub(crate) fn prepare_handler(
    state: &mut RequestState,
    protocol: &'static str,
) -> Result<Box<dyn Handler>> {
    let mut handler = open_handler(state, protocol)?;
    handler.prepare()?;
    Ok(handler)
}

/// Log a request failure and hand it to the protocol's error renderer.
pub(crate) fn fail<P: Protocol + ?Sized>(
    protocol: &mut P,
    conn: &mut Connection,
    err: GopherError,
) -> Result<()> {
    metrics::counter!("gopherd_request_errors_total", "kind" => err.kind()).increment(1);
    tracing::info!(
        protocol = protocol.name(),
        selector = %protocol.state().selector,
        error = %err,
        "Request failed"
    );
    protocol.render_error(conn, &err)
}

pub type ProtocolFactory = fn(&ProtocolRequest) -> Box<dyn Protocol>;

fn factory_for(name: &str) -> Option<(&'static str, ProtocolFactory)> {
    let entry: (&'static str, ProtocolFactory) = match short_name(name) {
        "WAPProtocol" => ("WAPProtocol", wap::WapProtocol::boxed as ProtocolFactory),
        "GopherPlusProtocol" => ("GopherPlusProtocol", gopherp::GopherPlusProtocol::boxed as ProtocolFactory),
        "HTTPProtocol" => ("HTTPProtocol", http::HttpProtocol::boxed as ProtocolFactory),
        "GeminiProtocol" => ("GeminiProtocol", gemini::GeminiProtocol::boxed as ProtocolFactory),
        "SpartanProtocol" => ("SpartanProtocol", spartan::SpartanProtocol::boxed as ProtocolFactory),
        "GopherProtocol" => ("GopherProtocol", gopher::GopherProtocol::boxed as ProtocolFactory),
        _ => return None,
    };
    Some(entry)
}

/// Ordered protocol factories; first claim wins.
#[derive(Debug, Clone)]
pub struct ProtocolMultiplexer {
    factories: Vec<(&'static str, ProtocolFactory)>,
}

impl ProtocolMultiplexer {
    pub fn from_names(names: &[String]) -> Result<Self> {
        let factories = names
            .iter()
            .map(|name| {
                factory_for(name)
                    .ok_or_else(|| GopherError::Config(format!("unknown protocol '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { factories })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(name, _)| *name).collect()
    }

    pub fn get_protocol(
        &self,
        req: &ProtocolRequest,
        conn: &mut Connection,
    ) -> Result<Box<dyn Protocol>> {
        for (name, factory) in &self.factories {
            let mut protocol = factory(req);
            if protocol.can_handle_request(conn) {
                tracing::trace!(protocol = name, "Protocol selected");
                return Ok(protocol);
            }
        }
        Err(GopherError::Protocol(format!(
            "no protocol accepts request {:?}",
            req.text()
        )))
    }
}

/// Serve one connection: read the request line, pick a protocol, answer.
pub fn serve_connection(
    ctx: &Arc<ServerContext>,
    protocols: &ProtocolMultiplexer,
    conn: &mut Connection,
) -> Result<()> {
    let line = conn.read_line()?;
    let req = ProtocolRequest {
        ctx: ctx.clone(),
        line,
        secure: conn.is_secure(),
        peer: conn.peer().map(str::to_string),
    };
    let mut protocol = protocols.get_protocol(&req, conn)?;
    let result = protocol.handle(conn);
    let finished = conn.finish();
    result?;
    finished?;
    Ok(())
}
