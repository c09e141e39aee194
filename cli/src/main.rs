// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # gopherd
//!
//! Multi-protocol file server: Gopher, Gopher+, HTTP, WAP, Gemini and
//! Spartan on one port.
//!
//! ## Startup
//!
//! 1. Load and validate the YAML configuration
//! 2. Bind the listener and load TLS material
//! 3. Detach and write the PID file
//! 4. chroot, setgid and setuid
//! 5. Serve until a signal arrives
//!
//! ## Exit status
//!
//! - `5`: SIGHUP
//! - `6`: SIGINT or SIGTERM
//! - `1`: startup failure

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use gopherd::{daemon, logging};
use gopherd_core::application::server_context::ServerContext;
use gopherd_core::presentation::server::GopherServer;
use gopherd_core::server_config::ServerConfig;

/// gopherd - serve a directory tree over Gopher and friends
#[derive(Parser)]
#[command(name = "gopherd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        value_name = "FILE",
        env = "GOPHERD_CONFIG",
        default_value = "/etc/gopherd/gopherd.yaml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides logger.priority
    #[arg(long, env = "GOPHERD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Stay in the foreground even when pygopherd.detach is set
    #[arg(long)]
    foreground: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("gopherd: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = ServerConfig::from_yaml_file(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    logging::init_logging(&config.logger, cli.log_level.as_deref())?;
    config.apply_env_overrides();
    config.validate().context("Configuration validation failed")?;

    if cli.check {
        println!("Configuration OK: {}", cli.config.display());
        return Ok(0);
    }

    // Inside the chroot the document root is `/`.
    let chroot = config.pygopherd.usechroot.then(|| config.pygopherd.root.clone());
    if chroot.is_some() {
        config.pygopherd.root = PathBuf::from("/");
    }
    let detach = config.pygopherd.detach && !cli.foreground;
    let pidfile = config.pygopherd.pidfile.clone();
    let group = config.pygopherd.setgid.clone();
    let user = config.pygopherd.setuid.clone();

    let ctx = Arc::new(ServerContext::new(config).context("Failed to build server context")?);
    let mut server = GopherServer::new(ctx)?;
    let addr = server.bind()?;
    info!("gopherd starting on {}", addr);

    if detach {
        daemon::detach()?;
    }
    let pid_guard = pidfile.map(daemon::PidFileGuard::create).transpose()?;

    if let Some(root) = &chroot {
        daemon::enter_chroot(root)?;
    }
    daemon::drop_privileges(group.as_deref(), user.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    let shutdown = runtime.block_on(server.run())?;

    info!(?shutdown, "gopherd stopped");
    drop(pid_guard);
    Ok(shutdown.exit_code())
}
