// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Server Configuration Types
//
// Defines the configuration schema for a gopherd instance:
// - Listener and process settings (root, port, server type, detach)
// - Handler chain order and per-handler tables
// - Protocol chain order and per-protocol tables
// - Entry inference tables (MIME → gopher type, EA sidecars)
// - Logging sink selection

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::error::{GopherError, Result};
use crate::domain::mime::GopherTypeMap;

/// Handler names accepted in `handlers.order`.
pub const KNOWN_HANDLERS: &[&str] = &[
    "HTMLURLHandler",
    "URLTypeRewriter",
    "UMNDirHandler",
    "DirHandler",
    "BuckGophermapHandler",
    "MBoxFolderHandler",
    "MBoxMessageHandler",
    "MaildirFolderHandler",
    "MaildirMessageHandler",
    "HTMLFileTitleHandler",
    "ExecHandler",
    "CompressedFileHandler",
    "FileHandler",
];

/// Protocol names accepted in `protocols.order`.
pub const KNOWN_PROTOCOLS: &[&str] = &[
    "WAPProtocol",
    "GopherPlusProtocol",
    "HTTPProtocol",
    "GeminiProtocol",
    "SpartanProtocol",
    "GopherProtocol",
];

/// Strip a dotted module prefix (`handlers.file.FileHandler` → `FileHandler`).
pub fn short_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub pygopherd: ServerSection,

    #[serde(default)]
    pub handlers: HandlersSection,

    #[serde(default)]
    pub protocols: ProtocolsSection,

    #[serde(default)]
    pub entry: EntrySection,

    #[serde(default)]
    pub logger: LoggerSection,
}

/// How each accepted connection is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ServerType {
    #[serde(alias = "ForkingTCPServer", alias = "forking")]
    Forking,
    #[default]
    #[serde(alias = "ThreadingTCPServer", alias = "threading")]
    Threading,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Document root
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Bind address
    #[serde(default = "default_interface")]
    pub interface: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub servertype: ServerType,

    /// Host name advertised in menus
    #[serde(default = "default_servername")]
    pub servername: String,

    /// Port advertised in menus; defaults to `port`
    #[serde(default)]
    pub advertisedport: Option<u16>,

    /// Socket read/write timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub detach: bool,

    #[serde(default)]
    pub pidfile: Option<PathBuf>,

    #[serde(default)]
    pub usechroot: bool,

    #[serde(default)]
    pub setuid: Option<String>,

    #[serde(default)]
    pub setgid: Option<String>,

    /// Extra mime.types files merged into the built-in table
    #[serde(default = "default_mimetypes")]
    pub mimetypes: Vec<PathBuf>,

    /// Log peer disconnects and worker errors in full
    #[serde(default)]
    pub tracebacks: bool,

    #[serde(default)]
    pub tls: Option<TlsSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSection {
    pub certfile: PathBuf,
    pub keyfile: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            interface: default_interface(),
            port: default_port(),
            servertype: ServerType::default(),
            servername: default_servername(),
            advertisedport: None,
            timeout: default_timeout(),
            detach: false,
            pidfile: None,
            usechroot: false,
            setuid: None,
            setgid: None,
            mimetypes: default_mimetypes(),
            tracebacks: false,
            tls: None,
        }
    }
}

impl ServerSection {
    pub fn advertised_port(&self) -> u16 {
        self.advertisedport.unwrap_or(self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlersSection {
    /// Ordered handler chain
    #[serde(default = "default_handler_order")]
    pub order: Vec<String>,

    #[serde(default)]
    pub dir: DirHandlerSection,

    #[serde(default)]
    pub compressed: CompressedSection,

    #[serde(default)]
    pub umn: UmnSection,

    #[serde(default)]
    pub zip: ZipSection,

    #[serde(default)]
    pub exec: ExecSection,
}

impl Default for HandlersSection {
    fn default() -> Self {
        Self {
            order: default_handler_order(),
            dir: DirHandlerSection::default(),
            compressed: CompressedSection::default(),
            umn: UmnSection::default(),
            zip: ZipSection::default(),
            exec: ExecSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirHandlerSection {
    /// Names matching this regex (tested against `<dir>/<name>`) are hidden
    #[serde(default = "default_ignorepatt")]
    pub ignorepatt: String,

    /// Directory cache lifetime in seconds; 0 disables caching
    #[serde(default = "default_cachetime")]
    pub cachetime: u64,

    #[serde(default = "default_cachefile")]
    pub cachefile: String,
}

impl Default for DirHandlerSection {
    fn default() -> Self {
        Self {
            ignorepatt: default_ignorepatt(),
            cachetime: default_cachetime(),
            cachefile: default_cachefile(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedSection {
    /// Encoding → decompressor command line
    #[serde(default = "default_decompressors")]
    pub decompressors: BTreeMap<String, String>,

    #[serde(default = "default_decompresspatt")]
    pub decompresspatt: String,
}

impl Default for CompressedSection {
    fn default() -> Self {
        Self {
            decompressors: default_decompressors(),
            decompresspatt: default_decompresspatt(),
        }
    }
}

/// Extension stripping for UMN display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtStrip {
    None,
    #[default]
    Full,
    Nonencoded,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UmnSection {
    #[serde(default)]
    pub extstrip: ExtStrip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_zip_pattern")]
    pub pattern: String,
}

impl Default for ZipSection {
    fn default() -> Self {
        Self {
            enabled: true,
            pattern: default_zip_pattern(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ExecSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolsSection {
    /// Ordered protocol chain
    #[serde(default = "default_protocol_order")]
    pub order: Vec<String>,

    #[serde(default)]
    pub gopherp: GopherPlusSection,

    #[serde(default)]
    pub http: HttpSection,

    #[serde(default)]
    pub wap: WapSection,
}

impl Default for ProtocolsSection {
    fn default() -> Self {
        Self {
            order: default_protocol_order(),
            gopherp: GopherPlusSection::default(),
            http: HttpSection::default(),
            wap: WapSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GopherPlusSection {
    #[serde(default = "default_admin")]
    pub admin: String,
}

impl Default for GopherPlusSection {
    fn default() -> Self {
        Self {
            admin: default_admin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSection {
    /// Ordered `(gopher-type regex, icon name)` pairs
    #[serde(default = "default_iconmapping")]
    pub iconmapping: Vec<(String, String)>,

    /// HTML placed above every rendered menu; `GOPHERURL` is substituted
    #[serde(default)]
    pub pagetopper: Option<String>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            iconmapping: default_iconmapping(),
            pagetopper: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WapSection {
    #[serde(default = "default_waptop")]
    pub waptop: String,
}

impl Default for WapSection {
    fn default() -> Self {
        Self {
            waptop: default_waptop(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySection {
    /// Ordered `(MIME regex, gopher type)` pairs
    #[serde(default = "default_mapping")]
    pub mapping: Vec<(String, String)>,

    /// Sidecar extension → EA name
    #[serde(default = "default_eaexts")]
    pub eaexts: BTreeMap<String, String>,

    #[serde(default = "default_mime_type")]
    pub defaultmimetype: String,
}

impl Default for EntrySection {
    fn default() -> Self {
        Self {
            mapping: default_mapping(),
            eaexts: default_eaexts(),
            defaultmimetype: default_mime_type(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogMethod {
    Syslog,
    #[default]
    Stdout,
    File,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerSection {
    #[serde(default)]
    pub logmethod: LogMethod,

    /// Default filter level (trace, debug, info, warn, error)
    #[serde(default = "default_priority")]
    pub priority: String,

    /// Syslog facility name
    #[serde(default = "default_facility")]
    pub facility: String,

    /// Target for `logmethod: file`
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggerSection {
    fn default() -> Self {
        Self {
            logmethod: LogMethod::default(),
            priority: default_priority(),
            facility: default_facility(),
            file: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_root() -> PathBuf {
    PathBuf::from("/var/gopher")
}

fn default_interface() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    70
}

fn default_servername() -> String {
    "localhost".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_mimetypes() -> Vec<PathBuf> {
    vec![PathBuf::from("/etc/mime.types")]
}

fn default_handler_order() -> Vec<String> {
    [
        "HTMLURLHandler",
        "URLTypeRewriter",
        "UMNDirHandler",
        "BuckGophermapHandler",
        "MBoxFolderHandler",
        "MBoxMessageHandler",
        "MaildirFolderHandler",
        "MaildirMessageHandler",
        "HTMLFileTitleHandler",
        "ExecHandler",
        "CompressedFileHandler",
        "FileHandler",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ignorepatt() -> String {
    r"(/|^)(\.|.*\.abstract$|.*\.cache\.pygopherd)".to_string()
}

fn default_cachetime() -> u64 {
    180
}

fn default_cachefile() -> String {
    ".cache.pygopherd.dir".to_string()
}

fn default_decompressors() -> BTreeMap<String, String> {
    BTreeMap::from([("gzip".to_string(), "zcat".to_string())])
}

fn default_decompresspatt() -> String {
    ".*".to_string()
}

fn default_zip_pattern() -> String {
    r"\.zip$".to_string()
}

fn default_protocol_order() -> Vec<String> {
    [
        "WAPProtocol",
        "GopherPlusProtocol",
        "HTTPProtocol",
        "GeminiProtocol",
        "SpartanProtocol",
        "GopherProtocol",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_admin() -> String {
    "unconfigured <root@localhost>".to_string()
}

fn default_iconmapping() -> Vec<(String, String)> {
    [
        ("1", "gopherdir"),
        ("h", "html"),
        ("[02]", "text"),
        ("3", "error"),
        ("[4569d]", "binary"),
        ("[7]", "search"),
        ("8", "telnet"),
        ("T", "tn3270"),
        ("[gI]", "image"),
        ("[s]", "sound"),
    ]
    .iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect()
}

fn default_waptop() -> String {
    "/wap".to_string()
}

fn default_mapping() -> Vec<(String, String)> {
    [
        ("text/html", "h"),
        ("text/.*", "0"),
        ("message/.*", "0"),
        ("image/gif", "g"),
        ("image/.*", "I"),
        ("application/gopher-menu", "1"),
        ("application/gopher\\+-menu", "1"),
        ("audio/.*", "s"),
        ("application/.*", "9"),
        ("video/.*", ";"),
    ]
    .iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect()
}

fn default_eaexts() -> BTreeMap<String, String> {
    BTreeMap::from([(".abstract".to_string(), "ABSTRACT".to_string())])
}

fn default_mime_type() -> String {
    "text/plain".to_string()
}

fn default_priority() -> String {
    "info".to_string()
}

fn default_facility() -> String {
    "daemon".to_string()
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GopherError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| GopherError::Config(e.to_string()))
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GOPHERD_ROOT") {
            tracing::info!("Environment override: GOPHERD_ROOT={}", val);
            self.pygopherd.root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("GOPHERD_PORT") {
            match val.parse() {
                Ok(port) => {
                    tracing::info!("Environment override: GOPHERD_PORT={}", port);
                    self.pygopherd.port = port;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for GOPHERD_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pygopherd.root.as_os_str().is_empty() {
            return Err(GopherError::Config("pygopherd.root cannot be empty".into()));
        }
        if self.handlers.order.is_empty() {
            return Err(GopherError::Config("handlers.order cannot be empty".into()));
        }
        for name in &self.handlers.order {
            if !KNOWN_HANDLERS.contains(&short_name(name)) {
                return Err(GopherError::Config(format!("unknown handler '{}'", name)));
            }
        }
        if self.protocols.order.is_empty() {
            return Err(GopherError::Config("protocols.order cannot be empty".into()));
        }
        for name in &self.protocols.order {
            if !KNOWN_PROTOCOLS.contains(&short_name(name)) {
                return Err(GopherError::Config(format!("unknown protocol '{}'", name)));
            }
        }

        compile(&self.handlers.dir.ignorepatt, "handlers.dir.ignorepatt")?;
        compile(
            &self.handlers.compressed.decompresspatt,
            "handlers.compressed.decompresspatt",
        )?;
        compile(&self.handlers.zip.pattern, "handlers.zip.pattern")?;
        for (pattern, _) in &self.protocols.http.iconmapping {
            compile(pattern, "protocols.http.iconmapping")?;
        }
        GopherTypeMap::new(&self.entry.mapping)?;

        if self.logger.logmethod == LogMethod::File && self.logger.file.is_none() {
            return Err(GopherError::Config(
                "logger.file is required when logmethod is file".into(),
            ));
        }
        Ok(())
    }
}

/// Compile a configured regex, naming the offending key on failure.
pub fn compile(pattern: &str, key: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| GopherError::Config(format!("{}: {}", key, e)))
}
