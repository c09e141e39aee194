// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Connection Server
//!
//! Accepts TCP connections and serves each one to completion on a worker:
//! a forked child process or an OS thread, per `pygopherd.servertype`.
//! Connections that open with a TLS handshake are wrapped in rustls when a
//! certificate is configured. The accept loop also watches for signals:
//!
//! - `SIGINT`/`SIGTERM`: hang up the process group and stop
//! - `SIGHUP`: stop
//! - `SIGCHLD` (forking): reap finished workers
//!
//! # Architecture
//!
//! - **Layer:** Presentation Layer
//! - **Purpose:** Listener, worker model and signal-driven shutdown

use std::collections::HashSet;
use std::net::{SocketAddr, TcpListener as StdTcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use rustls::{ServerConnection, StreamOwned};
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

use crate::application::server_context::ServerContext;
use crate::domain::error::{GopherError, Result};
use crate::domain::server_config::ServerType;
use crate::infrastructure::tls::{load_server_config, TLS_HANDSHAKE};
use crate::presentation::connection::{Connection, Stream};
use crate::presentation::protocols::{serve_connection, ProtocolMultiplexer};

/// Exit status of a worker killed by `SIGTERM`.
const WORKER_TERMINATED: i32 = 7;

/// Why the accept loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// `SIGINT` or `SIGTERM`
    Terminated,
    /// `SIGHUP`
    Hangup,
}

impl Shutdown {
    /// Process exit status for this shutdown.
    pub fn exit_code(self) -> i32 {
        match self {
            Shutdown::Terminated => 6,
            Shutdown::Hangup => 5,
        }
    }
}

/// Everything a worker needs to serve one accepted stream.
#[derive(Clone)]
pub struct Worker {
    ctx: Arc<ServerContext>,
    protocols: Arc<ProtocolMultiplexer>,
    tls: Option<Arc<rustls::ServerConfig>>,
}

impl Worker {
    pub fn new(ctx: Arc<ServerContext>) -> Result<Self> {
        let protocols = ProtocolMultiplexer::from_names(&ctx.config.protocols.order)?;
        let tls = match &ctx.config.pygopherd.tls {
            Some(tls) => Some(load_server_config(&tls.certfile, &tls.keyfile)?),
            None => None,
        };
        Ok(Self {
            ctx,
            protocols: Arc::new(protocols),
            tls,
        })
    }

    /// Serve one connection on the calling thread.
    pub fn serve(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        stream.set_nonblocking(false)?;
        let timeout = match self.ctx.config.pygopherd.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;

        let mut first = [0u8; 1];
        let opens_tls = stream.peek(&mut first)? == 1 && first[0] == TLS_HANDSHAKE;
        let peer = Some(peer.ip().to_string());
        let mut conn = match (&self.tls, opens_tls) {
            (Some(config), true) => {
                let session = ServerConnection::new(config.clone())
                    .map_err(|e| GopherError::Protocol(format!("TLS setup failed: {}", e)))?;
                let stream: Box<dyn Stream> = Box::new(StreamOwned::new(session, stream));
                Connection::new(stream, true, peer)
            }
            _ => Connection::new(Box::new(stream), false, peer),
        };
        serve_connection(&self.ctx, &self.protocols, &mut conn)
    }

    /// Serve and log the outcome. Peer disconnects are only reported when
    /// `tracebacks` is on.
    pub fn serve_logged(&self, stream: TcpStream, peer: SocketAddr) {
        metrics::counter!("gopherd_connections_total").increment(1);
        if let Err(e) = self.serve(stream, peer) {
            if !e.is_disconnect() {
                warn!(peer = %peer, error = %e, "Connection failed");
            } else if self.ctx.config.pygopherd.tracebacks {
                warn!(peer = %peer, error = %e, "Peer disconnected");
            }
        }
    }
}

pub struct GopherServer {
    worker: Worker,
    listener: Option<StdTcpListener>,
    /// Forked workers not yet reaped. Subprocesses started by handlers in
    /// threading mode are never in here; their threads wait on them.
    children: HashSet<libc::pid_t>,
}

impl GopherServer {
    pub fn new(ctx: Arc<ServerContext>) -> Result<Self> {
        Ok(Self {
            worker: Worker::new(ctx)?,
            listener: None,
            children: HashSet::new(),
        })
    }

    fn ctx(&self) -> &ServerContext {
        &self.worker.ctx
    }

    /// Bind the listening socket. Done before dropping privileges so
    /// port 70 is reachable.
    pub fn bind(&mut self) -> Result<SocketAddr> {
        let section = &self.ctx().config.pygopherd;
        let listener = StdTcpListener::bind((section.interface.as_str(), section.port))
            .map_err(|e| {
                GopherError::Fatal(format!(
                    "cannot listen on {}:{}: {}",
                    section.interface, section.port, e
                ))
            })?;
        let addr = listener.local_addr()?;
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Accept until a shutdown signal arrives.
    pub async fn run(mut self) -> Result<Shutdown> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => {
                self.bind()?;
                self.listener
                    .take()
                    .ok_or_else(|| GopherError::Fatal("listener not bound".into()))?
            }
        };
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;

        let servertype = self.ctx().config.pygopherd.servertype;
        info!(
            addr = %listener.local_addr()?,
            servertype = ?servertype,
            protocols = ?self.worker.protocols.names(),
            "Listening"
        );

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigchld = signal(SignalKind::child())?;

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let stream = stream.into_std()?;
                        match servertype {
                            ServerType::Forking => self.fork_worker(stream, peer),
                            ServerType::Threading => self.spawn_worker(stream, peer),
                        }
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                _ = sigint.recv() => return Ok(self.terminate("SIGINT")),
                _ = sigterm.recv() => return Ok(self.terminate("SIGTERM")),
                _ = sighup.recv() => {
                    info!("Received SIGHUP, exiting");
                    return Ok(Shutdown::Hangup);
                }
                _ = sigchld.recv() => reap_children(&mut self.children),
            }
        }
    }

    fn spawn_worker(&self, stream: TcpStream, peer: SocketAddr) {
        let worker = self.worker.clone();
        let spawned = std::thread::Builder::new()
            .name("gopherd-worker".into())
            .spawn(move || worker.serve_logged(stream, peer));
        if let Err(e) = spawned {
            warn!(peer = %peer, error = %e, "Could not start worker thread");
        }
    }

    fn fork_worker(&mut self, stream: TcpStream, peer: SocketAddr) {
        // SAFETY: the accept loop runs on a single-threaded runtime, so the
        // child starts with only this thread.
        match unsafe { libc::fork() } {
            -1 => warn!(
                peer = %peer,
                error = %std::io::Error::last_os_error(),
                "fork failed"
            ),
            0 => {
                reset_child_signals();
                self.worker.serve_logged(stream, peer);
                // SAFETY: leave without running the parent's destructors.
                unsafe { libc::_exit(0) }
            }
            pid => {
                debug!(pid, peer = %peer, "Forked worker");
                self.children.insert(pid);
            }
        }
    }

    /// Hang up the rest of the process group, then stop.
    fn terminate(&self, signal_name: &str) -> Shutdown {
        info!(signal = signal_name, "Shutting down");
        // SAFETY: plain signal(2)/kill(2) calls with constant arguments.
        unsafe {
            libc::signal(libc::SIGHUP, libc::SIG_IGN);
            libc::kill(0, libc::SIGHUP);
        }
        Shutdown::Terminated
    }
}

extern "C" fn exit_terminated(_: libc::c_int) {
    // SAFETY: _exit is async-signal-safe.
    unsafe { libc::_exit(WORKER_TERMINATED) }
}

extern "C" fn exit_hangup(_: libc::c_int) {
    // SAFETY: _exit is async-signal-safe.
    unsafe { libc::_exit(Shutdown::Hangup.exit_code()) }
}

/// Replace the runtime's signal handlers in a forked worker.
fn reset_child_signals() {
    // SAFETY: installs async-signal-safe handlers.
    unsafe {
        libc::signal(libc::SIGTERM, exit_terminated as libc::sighandler_t);
        libc::signal(libc::SIGHUP, exit_hangup as libc::sighandler_t);
        libc::signal(libc::SIGINT, libc::SIG_DFL);
        libc::signal(libc::SIGCHLD, libc::SIG_DFL);
    }
}

/// Collect finished forked workers. Only recorded PIDs are waited on.
fn reap_children(children: &mut HashSet<libc::pid_t>) {
    children.retain(|&pid| {
        let mut status = 0;
        // SAFETY: non-blocking wait on one known child.
        match unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) } {
            0 => true,
            -1 => false,
            _ => {
                debug!(pid, status, "Reaped worker");
                false
            }
        }
    });
}
