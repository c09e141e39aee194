// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Content Handlers
//!
//! A handler turns one selector into a response: either a document body
//! (`write`) or a list of entries the protocol renders as a menu
//! (`is_dir` + `dir_entries`). Handlers are tried in configured order by the
//! [`HandlerMultiplexer`]; the first whose `can_handle_request` returns true
//! serves the request.
//!
//! Construction is cheap (no I/O besides the one shared `stat`); anything
//! that can fail early happens in `prepare`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Handler contract, shared handler state and the dispatcher

pub mod dir;
pub mod exec;
pub mod file;
pub mod gophermap;
pub mod html;
pub mod mbox;
pub mod umn;
pub mod url;
pub mod zip;

use std::io::Write;
use std::sync::Arc;

use crate::application::server_context::ServerContext;
use crate::domain::entry::Entry;
use crate::domain::error::{GopherError, Result};
use crate::domain::server_config::short_name;
use crate::domain::vfs::{SharedVfs, Vfs, VfsStat};

/// Everything a handler knows about the request it is asked to serve.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub selector: String,
    pub search: Option<String>,
    /// Name of the protocol that decoded the request.
    pub protocol: &'static str,
    /// Peer address, when known.
    pub peer: Option<String>,
    pub vfs: SharedVfs,
    pub ctx: Arc<ServerContext>,
}

impl HandlerRequest {
    /// A request against the document root.
    pub fn new(
        ctx: Arc<ServerContext>,
        selector: impl Into<String>,
        search: Option<String>,
        protocol: &'static str,
    ) -> Self {
        Self {
            selector: selector.into(),
            search,
            protocol,
            peer: None,
            vfs: ctx.root_vfs.clone(),
            ctx,
        }
    }

    /// Same request context, different selector (directory children).
    pub fn child(&self, selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            search: None,
            ..self.clone()
        }
    }

    /// Same request, served from another VFS (archive overlays).
    pub fn with_vfs(&self, vfs: SharedVfs) -> Self {
        Self {
            vfs,
            ..self.clone()
        }
    }
}

pub trait Handler: Send {
    /// Configured name of the handler (`FileHandler`).
    fn name(&self) -> &'static str;

    fn can_handle_request(&mut self) -> bool;

    /// The handler that will actually serve the request. Rewriting handlers
    /// return a different one; everything else returns itself.
    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>>;

    /// I/O that may fail before anything is written.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    fn get_entry(&mut self) -> Entry;

    fn is_dir(&self) -> bool {
        false
    }

    /// Menu entries, valid after `prepare` when `is_dir` is true.
    fn dir_entries(&self) -> &[Entry] {
        &[]
    }

    /// Whether the directory listing came from the on-disk cache.
    fn from_cache(&self) -> bool {
        false
    }

    /// Stream the document body.
    fn write(&mut self, out: &mut dyn Write) -> Result<()>;
}

/// State common to all handlers: the request, its stat, and the lazily
/// populated entry.
#[derive(Debug, Clone)]
pub struct HandlerBase {
    pub req: HandlerRequest,
    pub stat: Option<VfsStat>,
    entry: Option<Entry>,
}

impl HandlerBase {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            req: req.clone(),
            stat: stat.cloned(),
            entry: None,
        }
    }

    pub fn selector(&self) -> &str {
        &self.req.selector
    }

    pub fn vfs(&self) -> &dyn Vfs {
        self.req.vfs.as_ref()
    }

    pub fn ctx(&self) -> &ServerContext {
        &self.req.ctx
    }

    pub fn is_file(&self) -> bool {
        self.stat.as_ref().is_some_and(|s| s.is_file())
    }

    pub fn is_dir(&self) -> bool {
        self.stat.as_ref().is_some_and(|s| s.is_dir())
    }

    /// Entry populated from the VFS on first use. `preset` may fill fields
    /// beforehand to override inference.
    pub fn entry_with(&mut self, preset: impl FnOnce(&mut Entry)) -> &mut Entry {
        if self.entry.is_none() {
            let mut entry = Entry::new(self.req.selector.clone());
            preset(&mut entry);
            entry.populate_from_vfs(
                self.req.vfs.as_ref(),
                &self.req.selector,
                self.stat.as_ref(),
                &self.req.ctx.policy,
            );
            self.entry = Some(entry);
        }
        self.entry.get_or_insert_with(Entry::default)
    }

    pub fn entry(&mut self) -> &mut Entry {
        self.entry_with(|_| {})
    }
}

/// Split a virtual selector at the first `|` or `?` into the real part and
/// the virtual remainder (which keeps no separator).
pub fn split_virtual(selector: &str) -> (&str, Option<&str>) {
    match selector.find(['|', '?']) {
        Some(idx) => (&selector[..idx], Some(&selector[idx + 1..])),
        None => (selector, None),
    }
}

pub type HandlerFactory = fn(&HandlerRequest, Option<&VfsStat>) -> Box<dyn Handler>;

/// Resolve a configured handler name into its factory.
fn factory_for(name: &str) -> Option<(&'static str, HandlerFactory)> {
    let entry: (&'static str, HandlerFactory) = match short_name(name) {
        "HTMLURLHandler" => ("HTMLURLHandler", url::HtmlUrlHandler::boxed as HandlerFactory),
        "URLTypeRewriter" => ("URLTypeRewriter", url::UrlTypeRewriter::boxed as HandlerFactory),
        "UMNDirHandler" => ("UMNDirHandler", umn::UmnDirHandler::boxed as HandlerFactory),
        "DirHandler" => ("DirHandler", dir::DirHandler::boxed as HandlerFactory),
        "BuckGophermapHandler" => ("BuckGophermapHandler", gophermap::BuckGophermapHandler::boxed as HandlerFactory),
        "MBoxFolderHandler" => ("MBoxFolderHandler", mbox::MboxFolderHandler::boxed as HandlerFactory),
        "MBoxMessageHandler" => ("MBoxMessageHandler", mbox::MboxMessageHandler::boxed as HandlerFactory),
        "MaildirFolderHandler" => ("MaildirFolderHandler", mbox::MaildirFolderHandler::boxed as HandlerFactory),
        "MaildirMessageHandler" => ("MaildirMessageHandler", mbox::MaildirMessageHandler::boxed as HandlerFactory),
        "HTMLFileTitleHandler" => ("HTMLFileTitleHandler", html::HtmlFileTitleHandler::boxed as HandlerFactory),
        "ExecHandler" => ("ExecHandler", exec::ExecHandler::boxed as HandlerFactory),
        "CompressedFileHandler" => ("CompressedFileHandler", file::CompressedFileHandler::boxed as HandlerFactory),
        "FileHandler" => ("FileHandler", file::FileHandler::boxed as HandlerFactory),
        "ZIPHandler" => ("ZIPHandler", zip::ZipHandler::boxed as HandlerFactory),
        _ => return None,
    };
    Some(entry)
}

/// Ordered list of handler factories; first match wins.
#[derive(Debug, Clone)]
pub struct HandlerMultiplexer {
    factories: Vec<(&'static str, HandlerFactory)>,
}

impl HandlerMultiplexer {
    /// Resolve configured names. The ZIP handler goes first when enabled.
    pub fn from_names(names: &[String], zip_enabled: bool) -> Result<Self> {
        let mut factories = Vec::with_capacity(names.len() + 1);
        if zip_enabled {
            factories.push(("ZIPHandler", zip::ZipHandler::boxed as HandlerFactory));
        }
        for name in names {
            let factory = factory_for(name)
                .ok_or_else(|| GopherError::Config(format!("unknown handler '{}'", name)))?;
            factories.push(factory);
        }
        Ok(Self { factories })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(name, _)| *name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| *n == name)
    }

    /// Find the handler for `req`. The selector is stat'ed once and the
    /// result shared with every candidate.
    pub fn get_handler(&self, req: &HandlerRequest) -> Result<Box<dyn Handler>> {
        let stat = req.vfs.stat(&req.selector).ok();
        for (name, factory) in &self.factories {
            let mut handler = factory(req, stat.as_ref());
            if handler.can_handle_request() {
                tracing::trace!(handler = name, selector = %req.selector, "Handler selected");
                return handler.get_handler();
            }
        }
        Err(GopherError::not_found(&req.selector, "no handler found"))
    }
}

/// Dispatch `req` through the context's handler chain.
pub fn dispatch(req: &HandlerRequest) -> Result<Box<dyn Handler>> {
    req.ctx.handlers.get_handler(req)
}

/// Entry for a child selector as the handler chain sees it, or `None` when
/// no handler claims it.
pub fn child_entry(req: &HandlerRequest, selector: &str) -> Option<Entry> {
    let child = req.child(selector);
    match dispatch(&child) {
        Ok(mut handler) => Some(handler.get_entry()),
        Err(e) => {
            tracing::trace!(selector = %selector, error = %e, "Skipping directory child");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::mime::MimeTypes;
    use crate::domain::server_config::ServerConfig;
    use std::path::Path;

    /// Context rooted at `root` with built-in MIME tables only.
    pub fn context(root: &Path) -> Arc<ServerContext> {
        context_with(root, |_| {})
    }

    pub fn context_with(root: &Path, tweak: impl FnOnce(&mut ServerConfig)) -> Arc<ServerContext> {
        let mut config = ServerConfig::default();
        config.pygopherd.root = root.to_path_buf();
        config.pygopherd.mimetypes = Vec::new();
        config.pygopherd.servername = "gopher.example".to_string();
        tweak(&mut config);
        Arc::new(ServerContext::with_mimetypes(config, MimeTypes::new()).unwrap())
    }

    pub fn request(ctx: &Arc<ServerContext>, selector: &str) -> HandlerRequest {
        HandlerRequest::new(ctx.clone(), selector, None, "GopherProtocol")
    }
}
