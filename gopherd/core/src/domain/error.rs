// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Error kinds shared by every layer of the server.
//!
//! Handlers raise these, protocols turn them into protocol-specific error
//! responses, and the server logs whatever escapes a worker. User-visible
//! text always leads with the offending selector in single quotes.

use thiserror::Error;

/// Result alias used across the core crate.
pub type Result<T> = std::result::Result<T, GopherError>;

#[derive(Debug, Error)]
pub enum GopherError {
    /// The selector resolves to nothing, or would escape the document root.
    #[error("{}", not_found_message(.selector, .comments))]
    FileNotFound {
        selector: String,
        comments: Option<String>,
    },

    /// A VFS read/stat/write failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// No protocol could make sense of the request line.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration or startup failure.
    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A cache sidecar could not be decoded; callers rebuild instead.
    #[error("Cache error: {0}")]
    Cache(String),
}

fn not_found_message(selector: &str, comments: &Option<String>) -> String {
    match comments {
        Some(comments) if !comments.is_empty() => {
            format!("'{}' does not exist ({})", selector, comments)
        }
        _ => format!("'{}' does not exist", selector),
    }
}

impl GopherError {
    /// Build a `FileNotFound` with an explanatory comment.
    pub fn not_found(selector: impl Into<String>, comments: impl Into<String>) -> Self {
        GopherError::FileNotFound {
            selector: selector.into(),
            comments: Some(comments.into()),
        }
    }

    /// Build a `FileNotFound` without comments.
    pub fn missing(selector: impl Into<String>) -> Self {
        GopherError::FileNotFound {
            selector: selector.into(),
            comments: None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GopherError::FileNotFound { .. })
    }

    /// Short label used for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GopherError::FileNotFound { .. } => "not_found",
            GopherError::Io(_) => "io",
            GopherError::Protocol(_) => "protocol",
            GopherError::Fatal(_) => "fatal",
            GopherError::Config(_) => "config",
            GopherError::Cache(_) => "cache",
        }
    }

    /// Client-facing text for I/O failures; not-found errors keep their full message.
    pub fn client_message(&self) -> String {
        match self {
            GopherError::Io(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// True when the peer went away mid-response (ECONNRESET, EPIPE).
    pub fn is_disconnect(&self) -> bool {
        match self {
            GopherError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_with_comments() {
        let err = GopherError::not_found("/foo", "no handler found");
        assert_eq!(err.to_string(), "'/foo' does not exist (no handler found)");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_not_found_without_comments() {
        let err = GopherError::missing("/bar");
        assert_eq!(err.to_string(), "'/bar' does not exist");
    }

    #[test]
    fn test_disconnect_detection() {
        let err = GopherError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(err.is_disconnect());
        let err = GopherError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(!err.is_disconnect());
    }
}
