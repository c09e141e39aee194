// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Server Context
//!
//! Read-only state built once at startup and shared by every worker: the
//! validated configuration, compiled patterns, MIME tables and the resolved
//! handler chain.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Immutable per-process state handed to protocols and handlers

use regex::Regex;
use std::sync::Arc;

use crate::application::handlers::HandlerMultiplexer;
use crate::domain::entry::EntryPolicy;
use crate::domain::error::Result;
use crate::domain::mime::{GopherTypeMap, MimeTypes};
use crate::domain::server_config::{compile, ServerConfig};
use crate::domain::vfs::SharedVfs;
use crate::infrastructure::vfs::RealVfs;

#[derive(Debug)]
pub struct ServerContext {
    pub config: ServerConfig,
    pub policy: EntryPolicy,
    pub handlers: HandlerMultiplexer,
    pub ignore_pattern: Regex,
    pub decompress_pattern: Regex,
    pub zip_pattern: Regex,
    pub icon_mapping: Vec<(Regex, String)>,
    pub root_vfs: SharedVfs,
}

impl ServerContext {
    /// Validate `config` and build the context, merging the configured
    /// mime.types files into the built-in table.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let mimetypes = MimeTypes::with_files(&config.pygopherd.mimetypes);
        Self::with_mimetypes(config, mimetypes)
    }

    /// Build the context around an already assembled MIME table.
    pub fn with_mimetypes(config: ServerConfig, mimetypes: MimeTypes) -> Result<Self> {
        config.validate()?;

        let policy = EntryPolicy {
            mimetypes: Arc::new(mimetypes),
            type_map: GopherTypeMap::new(&config.entry.mapping)?,
            eaexts: config
                .entry
                .eaexts
                .iter()
                .map(|(ext, name)| (ext.clone(), name.clone()))
                .collect(),
            default_mime_type: config.entry.defaultmimetype.clone(),
        };

        let handlers = HandlerMultiplexer::from_names(
            &config.handlers.order,
            config.handlers.zip.enabled,
        )?;

        let icon_mapping = config
            .protocols
            .http
            .iconmapping
            .iter()
            .map(|(pattern, icon)| {
                compile(&format!("^(?:{})$", pattern), "protocols.http.iconmapping")
                    .map(|re| (re, icon.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let root_vfs: SharedVfs = Arc::new(RealVfs::new(config.pygopherd.root.clone()));

        tracing::debug!(
            handlers = ?handlers.names(),
            root = %config.pygopherd.root.display(),
            "Built server context"
        );

        Ok(Self {
            ignore_pattern: compile(&config.handlers.dir.ignorepatt, "handlers.dir.ignorepatt")?,
            decompress_pattern: compile(
                &config.handlers.compressed.decompresspatt,
                "handlers.compressed.decompresspatt",
            )?,
            zip_pattern: compile(&config.handlers.zip.pattern, "handlers.zip.pattern")?,
            config,
            policy,
            handlers,
            icon_mapping,
            root_vfs,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.config.pygopherd.servername
    }

    pub fn advertised_port(&self) -> u16 {
        self.config.pygopherd.advertised_port()
    }

    /// Icon name for a gopher type; `generic` when nothing matches.
    pub fn icon_for(&self, gopher_type: char) -> &str {
        let mut buf = [0u8; 4];
        let t = gopher_type.encode_utf8(&mut buf);
        self.icon_mapping
            .iter()
            .find(|(re, _)| re.is_match(t))
            .map(|(_, icon)| icon.as_str())
            .unwrap_or("generic")
    }
}
