//! Namespace isolation for the helper's outer stage.

use nix::mount::{MsFlags, mount};
use nix::sched::{CloneFlags, unshare};
use std::io;
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IsoError {
    #[error("unshare: {0}")]
    Unshare(#[source] nix::Error),

    #[error("mount propagation: {0}")]
    Mount(#[source] nix::Error),

    #[error("current exe: {0}")]
    CurrentExe(#[source] io::Error),
}

/// Enters fresh UTS, PID, mount, and network namespaces, then builds the
/// re-exec command for the inner stage. The first child spawned after
/// this call becomes PID 1 of the new PID namespace, so the caller must
/// spawn the returned command before creating any other process.
///
/// Stdio is inherited so the target's output lands wherever the helper's
/// does.
pub fn isolate(args: &[String]) -> Result<Command, IsoError> {
    unshare(
        CloneFlags::CLONE_NEWUTS
            | CloneFlags::CLONE_NEWPID
            | CloneFlags::CLONE_NEWNS
            | CloneFlags::CLONE_NEWNET,
    )
    .map_err(IsoError::Unshare)?;

    // Keep mount changes from leaking back to the host namespace.
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(IsoError::Mount)?;

    let exe = std::env::current_exe().map_err(IsoError::CurrentExe)?;

    let mut cmd = Command::new(exe);
    cmd.arg("sub").args(args);

    Ok(cmd)
}
