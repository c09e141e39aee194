// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Logging setup
//!
//! Installs the tracing subscriber for the configured sink: stdout, an
//! append-only file, syslog, or nothing at all.
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Map `logger` configuration onto tracing-subscriber

use anyhow::{Context, Result};
use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use gopherd_core::server_config::{LogMethod, LoggerSection};

/// Install the global subscriber. `level` overrides `logger.priority`;
/// `RUST_LOG` overrides both.
pub fn init_logging(logger: &LoggerSection, level: Option<&str>) -> Result<()> {
    let level = level.unwrap_or(&logger.priority);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    match logger.logmethod {
        LogMethod::Stdout => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
        LogMethod::File => {
            let path = logger
                .file
                .as_ref()
                .context("logger.file is required when logmethod is file")?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        LogMethod::Syslog => {
            open_syslog(&logger.facility)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .without_time()
                .with_level(true)
                .with_writer(SyslogWriter)
                .init();
        }
        LogMethod::None => {}
    }
    Ok(())
}

/// Facility constant for a syslog facility name.
pub fn facility(name: &str) -> Option<libc::c_int> {
    let facility = match name.to_ascii_lowercase().as_str() {
        "auth" => libc::LOG_AUTH,
        "cron" => libc::LOG_CRON,
        "daemon" => libc::LOG_DAEMON,
        "kern" => libc::LOG_KERN,
        "lpr" => libc::LOG_LPR,
        "mail" => libc::LOG_MAIL,
        "news" => libc::LOG_NEWS,
        "user" => libc::LOG_USER,
        "uucp" => libc::LOG_UUCP,
        "local0" => libc::LOG_LOCAL0,
        "local1" => libc::LOG_LOCAL1,
        "local2" => libc::LOG_LOCAL2,
        "local3" => libc::LOG_LOCAL3,
        "local4" => libc::LOG_LOCAL4,
        "local5" => libc::LOG_LOCAL5,
        "local6" => libc::LOG_LOCAL6,
        "local7" => libc::LOG_LOCAL7,
        _ => return None,
    };
    Some(facility)
}

static SYSLOG_IDENT: &[u8] = b"gopherd\0";

fn open_syslog(facility_name: &str) -> Result<()> {
    let facility = facility(facility_name)
        .with_context(|| format!("Unknown syslog facility '{}'", facility_name))?;
    // SAFETY: the ident is a static NUL-terminated string, as openlog(3)
    // keeps the pointer.
    unsafe {
        libc::openlog(
            SYSLOG_IDENT.as_ptr() as *const libc::c_char,
            libc::LOG_PID,
            facility,
        );
    }
    Ok(())
}

/// One formatted event per `syslog(3)` call.
#[derive(Clone, Copy)]
struct SyslogWriter;

impl Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let message = text.trim_end();
        if message.is_empty() {
            return Ok(buf.len());
        }
        let priority = syslog_priority(message);
        let message = CString::new(message.replace('\0', " "))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        // SAFETY: constant "%s" format with a NUL-terminated argument.
        unsafe {
            libc::syslog(
                priority,
                b"%s\0".as_ptr() as *const libc::c_char,
                message.as_ptr(),
            );
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        *self
    }
}

/// Syslog priority from the level prefix the formatter writes.
fn syslog_priority(message: &str) -> libc::c_int {
    let level = message.trim_start().split_whitespace().next().unwrap_or("");
    match level {
        "ERROR" => libc::LOG_ERR,
        "WARN" => libc::LOG_WARNING,
        "INFO" => libc::LOG_INFO,
        _ => libc::LOG_DEBUG,
    }
}
