// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon process management
//!
//! Handles:
//! - Detaching from the terminal
//! - PID file management
//! - chroot and setgid/setuid after the listener is bound

use anyhow::{Context, Result};
use std::ffi::CString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    #[error("{call} failed: {source}")]
    Syscall {
        call: &'static str,
        #[source]
        source: std::io::Error,
    },
}

fn check(call: &'static str, rc: libc::c_int) -> std::result::Result<(), DaemonError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(DaemonError::Syscall {
            call,
            source: std::io::Error::last_os_error(),
        })
    }
}

/// Fork into the background, keeping the working directory.
pub fn detach() -> std::result::Result<(), DaemonError> {
    // SAFETY: called before any runtime or worker thread exists.
    check("daemon", unsafe { libc::daemon(1, 0) })
}

/// Write PID file (PID and a newline)
pub fn write_pid_file(path: &Path, pid: u32) -> Result<()> {
    std::fs::write(path, format!("{}\n", pid))
        .with_context(|| format!("Failed to write PID file: {:?}", path))?;
    info!("Wrote PID file: {:?}", path);
    Ok(())
}

/// Remove PID file
pub fn remove_pid_file(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove PID file: {:?}", path))?;
        info!("Removed PID file: {:?}", path);
    }
    Ok(())
}

/// Removes the PID file when dropped.
pub struct PidFileGuard {
    path: PathBuf,
}

impl PidFileGuard {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        write_pid_file(&path, std::process::id())?;
        Ok(Self { path })
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_pid_file(&self.path) {
            warn!(error = %e, "Could not remove PID file");
        }
    }
}

/// Confine the process to `root`.
pub fn enter_chroot(root: &Path) -> Result<()> {
    let dir = cstring(&root.to_string_lossy())?;
    // SAFETY: NUL-terminated path arguments.
    unsafe {
        check("chroot", libc::chroot(dir.as_ptr()))?;
        check("chdir", libc::chdir(c"/".as_ptr()))?;
    }
    info!(root = %root.display(), "Entered chroot");
    Ok(())
}

/// Switch to the configured group, then user. Both accept a name or a
/// numeric id.
pub fn drop_privileges(group: Option<&str>, user: Option<&str>) -> Result<()> {
    if let Some(group) = group {
        let gid = lookup_group(group)?;
        // SAFETY: plain setgid(2).
        check("setgid", unsafe { libc::setgid(gid) })?;
        info!(group, gid, "Changed group");
    }
    if let Some(user) = user {
        let uid = lookup_user(user)?;
        // SAFETY: plain setuid(2).
        check("setuid", unsafe { libc::setuid(uid) })?;
        info!(user, uid, "Changed user");
    }
    Ok(())
}

fn cstring(s: &str) -> Result<CString> {
    CString::new(s).with_context(|| format!("'{}' contains a NUL byte", s))
}

pub fn lookup_user(user: &str) -> Result<libc::uid_t> {
    if let Ok(uid) = user.parse() {
        return Ok(uid);
    }
    let name = cstring(user)?;
    // SAFETY: getpwnam returns NULL or a pointer to static storage, read
    // before any other passwd lookup.
    let entry = unsafe { libc::getpwnam(name.as_ptr()) };
    if entry.is_null() {
        return Err(DaemonError::UnknownUser(user.to_string()).into());
    }
    Ok(unsafe { (*entry).pw_uid })
}

pub fn lookup_group(group: &str) -> Result<libc::gid_t> {
    if let Ok(gid) = group.parse() {
        return Ok(gid);
    }
    let name = cstring(group)?;
    // SAFETY: as for getpwnam.
    let entry = unsafe { libc::getgrnam(name.as_ptr()) };
    if entry.is_null() {
        return Err(DaemonError::UnknownGroup(group.to_string()).into());
    }
    Ok(unsafe { (*entry).gr_gid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pid_file_lifecycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gopherd.pid");
        {
            let _guard = PidFileGuard::create(&path).unwrap();
            let content = std::fs::read_to_string(&path).unwrap();
            assert_eq!(content, format!("{}\n", std::process::id()));
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_numeric_ids() {
        assert_eq!(lookup_user("0").unwrap(), 0);
        assert_eq!(lookup_group("42").unwrap(), 42);
        assert_eq!(lookup_user("root").unwrap(), 0);
    }

    #[test]
    fn test_unknown_user() {
        let err = lookup_user("no-such-user-gopherd").unwrap_err();
        assert_eq!(err.to_string(), "unknown user 'no-such-user-gopherd'");
    }
}
