// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! TLS Server Configuration
//!
//! Loads a PEM certificate chain and private key into a rustls server
//! configuration (ring crypto provider). Connections are only wrapped when
//! the client opens with a TLS handshake record, so one port serves both
//! plaintext and TLS clients.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** rustls `ServerConfig` construction

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::domain::error::{GopherError, Result};

/// First byte of a TLS handshake record.
pub const TLS_HANDSHAKE: u8 = 0x16;

/// Build a server configuration from PEM files.
pub fn load_server_config(certfile: &Path, keyfile: &Path) -> Result<Arc<ServerConfig>> {
    let certs = load_certs(certfile)?;
    let key = load_key(keyfile)?;
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| GopherError::Fatal(format!("TLS protocol setup failed: {}", e)))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| GopherError::Fatal(format!("TLS certificate rejected: {}", e)))?;
    tracing::info!(cert = %certfile.display(), "Loaded TLS certificate");
    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(open(path)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GopherError::Fatal(format!("{}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(GopherError::Fatal(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(open(path)?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| GopherError::Fatal(format!("{}: {}", path.display(), e)))?
        .ok_or_else(|| GopherError::Fatal(format!("{}: no private key found", path.display())))
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| GopherError::Fatal(format!("{}: {}", path.display(), e)))
}
