// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end request scenarios through the default protocol and handler
//! chains, using in-memory connections over a temporary document root.

use std::io::Write;
use std::sync::Arc;

use gopherd_core::application::server_context::ServerContext;
use gopherd_core::mime::MimeTypes;
use gopherd_core::presentation::connection::{Connection, MemoryStream};
use gopherd_core::presentation::protocols::{
    serve_connection, Protocol, ProtocolMultiplexer, ProtocolRequest,
};
use gopherd_core::selector::{decode_bytes, encode_str};
use gopherd_core::server_config::ServerConfig;
use tempfile::TempDir;

fn document_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("testfile.txt"), "Test\n").unwrap();
    std::fs::write(dir.path().join("README"), "This is the server README.\n").unwrap();

    let file = std::fs::File::create(dir.path().join("testdata.zip")).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default();
    zip.add_directory("pygopherd/", opts).unwrap();
    zip.start_file("pygopherd/ziponly", opts).unwrap();
    zip.write_all(b"ZIPonly\n").unwrap();
    zip.finish().unwrap();
    dir
}

fn context(root: &TempDir) -> Arc<ServerContext> {
    let mut config = ServerConfig::default();
    config.pygopherd.root = root.path().to_path_buf();
    config.pygopherd.mimetypes = Vec::new();
    config.pygopherd.servername = "gopher.example".to_string();
    config.handlers.dir.cachetime = 0;
    config.protocols.gopherp.admin = "Gopher Admin <admin@gopher.example>".to_string();
    Arc::new(ServerContext::with_mimetypes(config, MimeTypes::new()).unwrap())
}

fn exchange(ctx: &Arc<ServerContext>, input: &[u8], secure: bool) -> Vec<u8> {
    let stream = MemoryStream::new(input.to_vec());
    let mut conn = if secure {
        Connection::memory_secure(stream.clone())
    } else {
        Connection::memory(stream.clone())
    };
    let protocols = ProtocolMultiplexer::from_names(&ctx.config.protocols.order).unwrap();
    serve_connection(ctx, &protocols, &mut conn).unwrap();
    stream.output()
}

fn exchange_text(ctx: &Arc<ServerContext>, input: &[u8], secure: bool) -> String {
    String::from_utf8_lossy(&exchange(ctx, input, secure)).into_owned()
}

#[test]
fn test_gopher_file_fetch() {
    let root = document_root();
    assert_eq!(exchange(&context(&root), b"/testfile.txt\n", false), b"Test\n");
}

#[test]
fn test_gopher_plus_info() {
    let root = document_root();
    let reply = exchange_text(&context(&root), b"/README\t!\n", false);
    assert!(reply.starts_with(
        "+-2\r\n+INFO: 0README\t/README\tgopher.example\t70\t+\r\n\
         +ADMIN:\r\n Admin: Gopher Admin <admin@gopher.example>\r\n"
    ));
    assert!(reply.contains("+VIEWS:\r\n text/plain: <1k>\r\n"));
}

#[test]
fn test_gemini_search_redirect() {
    let root = document_root();
    let reply = exchange_text(
        &context(&root),
        b"gemini://localhost/GEMINI-QUERY/some/path?%AE\r\n",
        true,
    );
    assert_eq!(reply, "30 /some/path?%AE\r\n");
}

#[test]
fn test_gemini_requires_tls() {
    let root = document_root();
    let reply = exchange_text(&context(&root), b"gemini://localhost/testfile.txt\r\n", false);
    // Plain gopher takes it and finds no such selector.
    assert!(reply.starts_with('3'));
}

#[test]
fn test_spartan_body_upload() {
    let root = document_root();
    let ctx = context(&root);
    let stream = MemoryStream::new(b"localhost / 2\r\n\xae".to_vec());
    let mut conn = Connection::memory(stream.clone());
    let line = conn.read_line().unwrap();
    let req = ProtocolRequest {
        ctx: ctx.clone(),
        line,
        secure: false,
        peer: None,
    };
    let protocols = ProtocolMultiplexer::from_names(&ctx.config.protocols.order).unwrap();
    let mut protocol = protocols.get_protocol(&req, &mut conn).unwrap();
    assert_eq!(protocol.name(), "SpartanProtocol");
    protocol.handle(&mut conn).unwrap();
    conn.finish().unwrap();

    let search = protocol.state().search.clone().unwrap();
    assert_eq!(encode_str(&search), vec![0xAE]);
    assert_eq!(search, decode_bytes(&[0xAE]));
    assert!(String::from_utf8_lossy(&stream.output()).starts_with("2 text/gemini\r\n"));
}

#[test]
fn test_umn_merged_link() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("file.txt"), "recipes\n").unwrap();
    std::fs::write(
        dir.path().join(".Links"),
        "Type=1\nName=Cheese Ball Recipes\nPath=./file.txt\nHost=zippy.example\nPort=150\n",
    )
    .unwrap();
    let menu = exchange_text(&context(&dir), b"/\n", false);
    let line = menu.lines().next().unwrap();
    assert!(line.starts_with("1Cheese Ball Recipes\t"));
    assert!(line.contains("\tzippy.example\t150"));
    assert_eq!(menu.lines().count(), 1);
}

#[test]
fn test_zip_archive_drill_in() {
    let root = document_root();
    assert_eq!(
        exchange(&context(&root), b"/testdata.zip/pygopherd/ziponly\n", false),
        b"ZIPonly\n"
    );
}

#[test]
fn test_empty_request_lists_root() {
    let root = document_root();
    let menu = exchange_text(&context(&root), b"\r\n", false);
    assert!(menu.contains("0testfile\t/testfile.txt\tgopher.example\t70"));
    assert!(menu.contains("\t/testdata.zip\t"));
}
