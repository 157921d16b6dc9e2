// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Host NFS server bootstrap
//!
//! Prepares the kernel NFS server before any export is applied:
//!
//! 1. load the `nfsd` module when `/proc/filesystems` does not list it (best effort)
//! 2. mount the `nfsd` filesystem on `/proc/fs/nfsd` (already mounted is fine)
//! 3. create the `rpc_pipefs`, `v4recovery` and `v4root` state directories
//! 4. spawn `rpc.mountd`, `rpc.nfsd` and `sm-notify` (best effort)
//!
//! Spawned daemons receive SIGTERM when the gateway exits.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

const PROC_FILESYSTEMS: &str = "/proc/filesystems";
const NFSD_MOUNTPOINT: &str = "/proc/fs/nfsd";
const NFS_STATE_DIR: &str = "/var/lib/nfs";
const STATE_SUBDIRS: [&str; 3] = ["rpc_pipefs", "v4recovery", "v4root"];
const HELPER_DAEMONS: [&str; 3] = ["/usr/sbin/rpc.mountd", "/usr/sbin/rpc.nfsd", "/usr/bin/sm-notify"];

#[derive(Debug, Error)]
pub enum NfsBootstrapError {
    #[error("error mounting nfsd on {}: {source}", .mountpoint.display())]
    Mount {
        mountpoint: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error setting up nfs dirs {}: {source}", .path.display())]
    StateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Locations touched by the bootstrap
#[derive(Debug, Clone)]
pub struct NfsdBootstrap {
    pub proc_filesystems: PathBuf,
    pub mountpoint: PathBuf,
    pub state_dir: PathBuf,
    pub daemons: Vec<PathBuf>,
}

impl Default for NfsdBootstrap {
    fn default() -> Self {
        Self {
            proc_filesystems: PathBuf::from(PROC_FILESYSTEMS),
            mountpoint: PathBuf::from(NFSD_MOUNTPOINT),
            state_dir: PathBuf::from(NFS_STATE_DIR),
            daemons: HELPER_DAEMONS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl NfsdBootstrap {
    /// Must be awaited on the main task, not from `tokio::spawn`: the parent
    /// death signal of each helper fires when the spawning thread exits.
    pub async fn run(&self) -> Result<(), NfsBootstrapError> {
        info!("Bootstrapping kernel NFS server");

        match tokio::fs::read_to_string(&self.proc_filesystems).await {
            Ok(contents) if !nfsd_registered(&contents) => load_module().await,
            Ok(_) => debug!("nfsd filesystem already registered"),
            Err(e) => debug!(error = %e, "cannot read {}", self.proc_filesystems.display()),
        }

        mount_nfsd(&self.mountpoint)?;
        ensure_state_dirs(&self.state_dir).await?;

        for daemon in &self.daemons {
            spawn_helper(daemon);
        }

        Ok(())
    }
}

/// Whether `/proc/filesystems` lists the `nfsd` filesystem type
pub fn nfsd_registered(proc_filesystems: &str) -> bool {
    proc_filesystems
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .any(|fstype| fstype == "nfsd")
}

pub async fn ensure_state_dirs(state_dir: &Path) -> Result<(), NfsBootstrapError> {
    for sub in STATE_SUBDIRS {
        let path = state_dir.join(sub);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| NfsBootstrapError::StateDir { path, source })?;
    }
    Ok(())
}

async fn load_module() {
    match Command::new("modprobe")
        .args(["-q", "nfsd"])
        .stdin(Stdio::null())
        .status()
        .await
    {
        Ok(status) if status.success() => info!("Loaded nfsd kernel module"),
        Ok(status) => warn!(%status, "modprobe nfsd failed"),
        Err(e) => warn!(error = %e, "could not run modprobe"),
    }
}

#[cfg(target_os = "linux")]
fn mount_nfsd(mountpoint: &Path) -> Result<(), NfsBootstrapError> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let mount_err = |source| NfsBootstrapError::Mount {
        mountpoint: mountpoint.to_path_buf(),
        source,
    };

    let fstype = CString::new("nfsd").map_err(|e| mount_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
    let target = CString::new(mountpoint.as_os_str().as_bytes())
        .map_err(|e| mount_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

    // SAFETY: all pointers come from live CStrings; data is null.
    let rc = unsafe {
        libc::mount(
            fstype.as_ptr(),
            target.as_ptr(),
            fstype.as_ptr(),
            libc::MS_NOEXEC | libc::MS_NODEV | libc::MS_NOSUID,
            std::ptr::null(),
        )
    };

    if rc == 0 {
        info!(mountpoint = %mountpoint.display(), "Mounted nfsd filesystem");
        return Ok(());
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EBUSY) {
        debug!(mountpoint = %mountpoint.display(), "nfsd already mounted");
        return Ok(());
    }
    Err(mount_err(err))
}

#[cfg(not(target_os = "linux"))]
fn mount_nfsd(mountpoint: &Path) -> Result<(), NfsBootstrapError> {
    Err(NfsBootstrapError::Mount {
        mountpoint: mountpoint.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Unsupported, "nfsd requires linux"),
    })
}

/// Start a helper daemon tied to our lifetime and reap it in the background.
/// Spawn failures are logged and ignored.
fn spawn_helper(program: &Path) {
    let mut command = Command::new(program);
    command.stdin(Stdio::null());
    terminate_with_parent(&mut command);

    match command.spawn() {
        Ok(mut child) => {
            let name = program.display().to_string();
            info!(program = %name, pid = ?child.id(), "Started NFS helper");
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => debug!(program = %name, %status, "NFS helper exited"),
                    Err(e) => warn!(program = %name, error = %e, "error waiting for NFS helper"),
                }
            });
        }
        Err(e) => warn!(program = %program.display(), error = %e, "could not start NFS helper"),
    }
}

/// `PR_SET_PDEATHSIG` tracks the thread that forked the child, so callers
/// spawn from the thread that lives as long as the process.
#[cfg(target_os = "linux")]
fn terminate_with_parent(command: &mut Command) {
    // SAFETY: prctl is async-signal-safe and touches no shared state.
    unsafe {
        command.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn terminate_with_parent(_command: &mut Command) {}
