//! Per-child state machine.
//!
//! Every started command gets two tasks: a reaper that owns the child
//! handle and publishes its exit code, and a tracker that owns all
//! mutable lifecycle state and serves requests over channels. Consumers
//! only ever hold a [`TrackerHandle`], which is a set of channel
//! endpoints; the tracker task is the sole closer of the request
//! channels, so their closure is a reliable "process gone" signal and no
//! consumer can race the select loop by closing anything.

use crate::output::OutputReader;
use crate::signal;
use crate::types::{ProcessId, Status};
use parking_lot::RwLock;
use procbox_shared::{SandboxError, SandboxResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Capture files are named `stdout-<id>` inside the sandbox directory.
const OUT_PREFIX: &str = "stdout-";

pub(crate) type Catalog = Arc<RwLock<HashMap<ProcessId, TrackerHandle>>>;

/// Channel endpoints of one tracker. Cloneable; every clone talks to the
/// same tracker task.
#[derive(Clone)]
pub(crate) struct TrackerHandle {
    pub(crate) id: ProcessId,
    /// One value per stop request; never closed while the tracker lives.
    pub(crate) stop: mpsc::Sender<()>,
    status: mpsc::Sender<oneshot::Sender<Status>>,
    output: mpsc::Sender<oneshot::Sender<SandboxResult<OutputReader>>>,
}

impl TrackerHandle {
    /// Current `{command, exited, exit_code}` snapshot.
    pub(crate) async fn request_status(&self) -> SandboxResult<Status> {
        let (reply, response) = oneshot::channel();
        self.status
            .send(reply)
            .await
            .map_err(|_| SandboxError::ProcessNotFound)?;
        response.await.map_err(|_| SandboxError::ProcessNotFound)
    }

    /// A fresh reader positioned at the start of the capture file.
    pub(crate) async fn request_output(&self) -> SandboxResult<OutputReader> {
        let (reply, response) = oneshot::channel();
        self.output
            .send(reply)
            .await
            .map_err(|_| SandboxError::ProcessNotFound)?;
        response.await.map_err(|_| SandboxError::ProcessNotFound)?
    }
}

/// Spawn `command` through the helper, register the tracker in the
/// catalog, and start its tasks. Registration happens before the tracker
/// task runs so a quickly-exiting child can never release itself ahead of
/// its own catalog entry.
pub(crate) fn spawn(
    catalog: Catalog,
    sandbox_dir: &Path,
    helper: &Path,
    release_timeout: Duration,
    command: &str,
    args: &[String],
) -> SandboxResult<ProcessId> {
    let id = ProcessId::new();
    let stdout_path = sandbox_dir.join(format!("{OUT_PREFIX}{id}"));

    // One capture file per child; the helper merges stderr into it at
    // the descriptor level.
    let writer = std::fs::File::create(&stdout_path)
        .map_err(|e| SandboxError::Spawn(format!("capture file {}: {e}", stdout_path.display())))?;
    let err_writer = writer
        .try_clone()
        .map_err(|e| SandboxError::Spawn(format!("capture file clone: {e}")))?;

    let mut cmd = Command::new(helper);
    cmd.arg("run")
        .arg(command)
        .args(args)
        // The helper reads constraints.json relative to its own deploy.
        .current_dir(sandbox_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(writer))
        .stderr(Stdio::from(err_writer))
        // Runtime teardown must not leak children, even under panics.
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        let _ = std::fs::remove_file(&stdout_path);
        SandboxError::Spawn(format!("helper {}: {e}", helper.display()))
    })?;

    let pid = child.id().map(|raw| nix::unistd::Pid::from_raw(raw as i32));

    let (finished_tx, finished_rx) = watch::channel(None);

    // Reaper: owns the child handle, publishes the exit code exactly once.
    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => exit_code(status),
            Err(err) => {
                // Stdout and stderr are already merged into the capture
                // file and the status channel carries the exit; nothing
                // to recover here.
                warn!(%id, error = %err, "wait failed");
                0
            }
        };

        debug!(%id, code, "process reaped");
        let _ = finished_tx.send(Some(code));
    });

    let (stop_tx, stop_rx) = mpsc::channel(1);
    let (status_tx, status_rx) = mpsc::channel(1);
    let (output_tx, output_rx) = mpsc::channel(1);

    let handle = TrackerHandle {
        id,
        stop: stop_tx,
        status: status_tx,
        output: output_tx,
    };

    catalog.write().insert(id, handle);

    let tracker = Tracker {
        id,
        command: command.to_string(),
        args: args.to_vec(),
        pid,
        stdout_path,
        release_timeout,
        catalog,
        stop: stop_rx,
        status: status_rx,
        output: output_rx,
        finished: finished_rx,
    };
    tokio::spawn(tracker.run());

    Ok(id)
}

/// The tracker task's state. All mutation happens inside [`Tracker::run`].
struct Tracker {
    id: ProcessId,
    command: String,
    args: Vec<String>,
    pid: Option<nix::unistd::Pid>,
    stdout_path: PathBuf,
    release_timeout: Duration,
    catalog: Catalog,
    stop: mpsc::Receiver<()>,
    status: mpsc::Receiver<oneshot::Sender<Status>>,
    output: mpsc::Receiver<oneshot::Sender<SandboxResult<OutputReader>>>,
    finished: watch::Receiver<Option<i32>>,
}

impl Tracker {
    /// Running → Exited → Released.
    ///
    /// `tokio::select!`'s randomized polling keeps the branches fair: a
    /// hot stop sender cannot starve status or output consumers.
    async fn run(mut self) {
        debug!(id = %self.id, command = %self.command, args = ?self.args, "tracking process");

        let mut exited = false;
        let mut exit_code = 0;

        // Armed (reset) when the exit is observed; the guard keeps it
        // inert until then.
        let release = tokio::time::sleep(self.release_timeout);
        tokio::pin!(release);

        loop {
            tokio::select! {
                _ = release.as_mut(), if exited => break,

                changed = self.finished.changed(), if !exited => {
                    let observed = *self.finished.borrow_and_update();
                    match observed {
                        Some(code) => {
                            exited = true;
                            exit_code = code;
                            release.as_mut().reset(Instant::now() + self.release_timeout);
                        }
                        // Reaper gone without a code: treat as exited so
                        // the release window still closes the tracker.
                        None if changed.is_err() => {
                            warn!(id = %self.id, "reaper vanished before reporting an exit");
                            exited = true;
                            release.as_mut().reset(Instant::now() + self.release_timeout);
                        }
                        None => {}
                    }
                }

                Some(()) = self.stop.recv() => {
                    // Repeated stops after exit are no-ops, not errors.
                    if !exited
                        && let Some(pid) = self.pid
                    {
                        // The upcoming wait reveals reality either way.
                        let _ = signal::terminate(pid);
                    }
                }

                Some(reply) = self.status.recv() => {
                    let _ = reply.send(Status {
                        command: self.command.clone(),
                        exited,
                        exit_code,
                    });
                }

                Some(reply) = self.output.recv() => {
                    let reader = OutputReader::open(&self.stdout_path, self.finished.clone())
                        .await
                        .map_err(SandboxError::Io);
                    let _ = reply.send(reader);
                }
            }
        }

        self.release();
    }

    /// Terminal teardown: close the request channels (the "process gone"
    /// signal for callers), drop out of the catalog, delete the capture
    /// file.
    fn release(self) {
        debug!(id = %self.id, "releasing tracker");

        drop(self.status);
        drop(self.output);

        self.catalog.write().remove(&self.id);

        if let Err(err) = std::fs::remove_file(&self.stdout_path) {
            // Cleanup may have removed the whole sandbox directory first.
            debug!(id = %self.id, error = %err, "capture file already gone");
        }
    }
}

/// Exit-code rule: a structured "exited with code k" yields k; a
/// signal-terminated child reports the conventional 128+signal; anything
/// else is zero. Not normalized further.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}
