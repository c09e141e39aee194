// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Exec Handler
//!
//! Runs executable regular files and streams their standard output as plain
//! text. The program sees a CGI-like environment describing the request.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::application::handlers::{Handler, HandlerBase, HandlerRequest};
use crate::domain::entry::Entry;
use crate::domain::error::{GopherError, Result};
use crate::domain::vfs::VfsStat;

pub struct ExecHandler {
    base: HandlerBase,
    program: Option<PathBuf>,
}

impl ExecHandler {
    pub fn new(req: &HandlerRequest, stat: Option<&VfsStat>) -> Self {
        Self {
            base: HandlerBase::new(req, stat),
            program: None,
        }
    }

    pub fn boxed(req: &HandlerRequest, stat: Option<&VfsStat>) -> Box<dyn Handler> {
        Box::new(Self::new(req, stat))
    }

    fn environment(&self) -> Vec<(&'static str, String)> {
        let req = &self.base.req;
        let search = req.search.clone().unwrap_or_default();
        vec![
            ("SERVER_NAME", req.ctx.server_name().to_string()),
            ("SERVER_PORT", req.ctx.advertised_port().to_string()),
            ("REMOTE_ADDR", req.peer.clone().unwrap_or_else(|| "unknown".to_string())),
            ("SELECTOR", req.selector.clone()),
            ("REQUEST", req.selector.clone()),
            ("SEARCHREQUEST", search.clone()),
            ("QUERY_STRING", search),
            ("SERVER_PROTOCOL", req.protocol.to_string()),
        ]
    }
}

impl Handler for ExecHandler {
    fn name(&self) -> &'static str {
        "ExecHandler"
    }

    fn can_handle_request(&mut self) -> bool {
        if !self.base.ctx().config.handlers.exec.enabled {
            return false;
        }
        let executable = self
            .base
            .stat
            .as_ref()
            .is_some_and(|s| s.is_file() && s.is_executable());
        if !executable {
            return false;
        }
        self.program = self.base.vfs().real_path(self.base.selector());
        self.program.is_some()
    }

    fn get_handler(self: Box<Self>) -> Result<Box<dyn Handler>> {
        Ok(self)
    }

    fn get_entry(&mut self) -> Entry {
        self.base
            .entry_with(|e| {
                e.gopher_type = Some('0');
                e.mime_type = Some("text/plain".to_string());
            })
            .clone()
    }

    fn write(&mut self, out: &mut dyn Write) -> Result<()> {
        let program = self
            .program
            .clone()
            .ok_or_else(|| GopherError::missing(self.base.selector()))?;
        let mut command = Command::new(&program);
        command
            .envs(self.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = program.parent() {
            command.current_dir(dir);
        }

        tracing::debug!(program = %program.display(), "Executing");
        let mut child = command.spawn()?;
        let copied = match child.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, out).map(|_| ()),
            None => Ok(()),
        };
        let status = child.wait()?;
        copied?;
        if !status.success() {
            tracing::warn!(program = %program.display(), %status, "Executable exited with failure");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::dispatch;
    use crate::application::handlers::test_support::{context, context_with, request};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir) {
        let path = dir.path().join("hello.sh");
        std::fs::write(&path, "#!/bin/sh\necho \"$SELECTOR $SEARCHREQUEST $SERVER_NAME\"\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_script_output_streamed() {
        let dir = TempDir::new().unwrap();
        script(&dir);
        let ctx = context(dir.path());
        let mut req = request(&ctx, "/hello.sh");
        req.search = Some("needle".to_string());
        let mut handler = dispatch(&req).unwrap();
        assert_eq!(handler.name(), "ExecHandler");
        handler.prepare().unwrap();
        let mut out = Vec::new();
        handler.write(&mut out).unwrap();
        assert_eq!(out, b"/hello.sh needle gopher.example\n");
        assert_eq!(handler.get_entry().mime_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_disabled_serves_file() {
        let dir = TempDir::new().unwrap();
        script(&dir);
        let ctx = context_with(dir.path(), |c| c.handlers.exec.enabled = false);
        let handler = dispatch(&request(&ctx, "/hello.sh")).unwrap();
        assert_eq!(handler.name(), "FileHandler");
    }
}
