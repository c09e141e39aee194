// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Client Connection
//!
//! A buffered duplex over whatever carries the request: a TCP socket, a TLS
//! session over one, or an in-memory pipe in tests. Protocols read the
//! request line and any trailing input through it and write the response
//! into its output buffer, which is flushed when the request completes.
//!
//! HTTP request headers are read at most once and cached here, because
//! several protocols inspect them while deciding whether to claim a request.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Cursor, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use crate::domain::selector;

/// Longest request or header line accepted.
const MAX_LINE: u64 = 64 * 1024;

/// Largest request body buffered from a client.
pub const MAX_BODY: u64 = 1024 * 1024;

/// Output is handed to the transport in chunks of this size.
const OUTPUT_CHUNK: usize = 16 * 1024;

/// A bidirectional byte stream a connection can run over.
pub trait Stream: Read + Write + Send {
    /// Orderly end of the response (TLS close_notify and the like).
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl Stream for TcpStream {}

impl Stream for rustls::StreamOwned<rustls::ServerConnection, TcpStream> {
    fn close(&mut self) -> io::Result<()> {
        self.conn.send_close_notify();
        self.flush()
    }
}

/// In-memory stream: reads from a fixed input, collects output.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    input: Arc<Mutex<Cursor<Vec<u8>>>>,
    output: Arc<Mutex<Vec<u8>>>,
}

impl MemoryStream {
    pub fn new(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: Arc::new(Mutex::new(Cursor::new(input.into()))),
            output: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Everything written so far.
    pub fn output(&self) -> Vec<u8> {
        self.output.lock().clone()
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.lock().read(buf)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for MemoryStream {}

pub struct Connection {
    reader: BufReader<Box<dyn Stream>>,
    output: Vec<u8>,
    secure: bool,
    peer: Option<String>,
    http_headers: Option<BTreeMap<String, String>>,
}

impl Connection {
    pub fn new(stream: Box<dyn Stream>, secure: bool, peer: Option<String>) -> Self {
        Self {
            reader: BufReader::new(stream),
            output: Vec::with_capacity(OUTPUT_CHUNK),
            secure,
            peer,
            http_headers: None,
        }
    }

    /// Plaintext in-memory connection.
    pub fn memory(stream: MemoryStream) -> Self {
        Self::new(Box::new(stream), false, Some("127.0.0.1".to_string()))
    }

    /// In-memory connection that reports itself as TLS.
    pub fn memory_secure(stream: MemoryStream) -> Self {
        Self::new(Box::new(stream), true, Some("127.0.0.1".to_string()))
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// One line without its `\n` or `\r\n` terminator. Empty at EOF.
    pub fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        (&mut self.reader).take(MAX_LINE).read_until(b'\n', &mut line)?;
        if line.ends_with(b"\n") {
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }
        }
        Ok(line)
    }

    /// Up to `len` bytes, never more than [`MAX_BODY`]; fewer when the peer
    /// closes early.
    pub fn read_body(&mut self, len: u64) -> io::Result<Vec<u8>> {
        let mut body = Vec::new();
        (&mut self.reader).take(len.min(MAX_BODY)).read_to_end(&mut body)?;
        Ok(body)
    }

    /// HTTP headers following the request line, keyed by lower-case name.
    /// Read up to the first blank line on first use.
    pub fn http_headers(&mut self) -> io::Result<&BTreeMap<String, String>> {
        if self.http_headers.is_none() {
            let mut headers = BTreeMap::new();
            loop {
                let line = self.read_line()?;
                if line.is_empty() {
                    break;
                }
                let line = selector::decode_bytes(&line);
                if let Some((name, value)) = line.split_once(':') {
                    headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                }
            }
            self.http_headers = Some(headers);
        }
        Ok(self.http_headers.get_or_insert_with(BTreeMap::new))
    }

    /// Send buffered output to the peer.
    pub fn finish(&mut self) -> io::Result<()> {
        self.flush()?;
        self.reader.get_mut().close()
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        if self.output.len() >= OUTPUT_CHUNK {
            self.flush()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.output.is_empty() {
            let stream = self.reader.get_mut();
            stream.write_all(&self.output)?;
            self.output.clear();
        }
        self.reader.get_mut().flush()
    }
}
