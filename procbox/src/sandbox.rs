//! The sandbox catalog: process registry and lifecycle orchestration.

use crate::deploy;
use crate::output::OutputReader;
use crate::tracker::{self, Catalog, TrackerHandle};
use crate::types::{ProcessId, Status};
use parking_lot::RwLock;
use procbox_shared::{SandboxError, SandboxResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Manages an internal collection of isolated processes and their
/// resources.
///
/// Each instance deploys its own copy of the helper binary into a
/// private temp directory and is responsible for every child it starts.
/// All operations are safe to call concurrently; the catalog lock is
/// never held across a blocking operation.
pub struct Sandbox {
    temp_dir: TempDir,
    helper_path: PathBuf,
    catalog: Catalog,
    release_timeout: Duration,
    cancel: CancellationToken,
    cleaned: AtomicBool,
}

impl Sandbox {
    /// Create a sandbox environment: deploys the embedded helper binary
    /// and constraints file into a fresh temp directory.
    ///
    /// `cancel` is the embedder's token; a fired token makes the query
    /// paths return [`SandboxError::Cancelled`]. `release_timeout` is
    /// the grace period between a child's exit and the eviction of its
    /// tracker.
    pub fn new(cancel: CancellationToken, release_timeout: Duration) -> SandboxResult<Self> {
        let (temp_dir, helper_path) = deploy::deploy_helper()?;

        Ok(Self {
            temp_dir,
            helper_path,
            catalog: Arc::new(RwLock::new(HashMap::new())),
            release_timeout,
            cancel: cancel.child_token(),
            cleaned: AtomicBool::new(false),
        })
    }

    /// Execute `command` in the sandbox environment.
    ///
    /// On success the returned id answers `stat`/`output`/`stop` at
    /// least until `release_timeout` after the child exits.
    pub async fn start(&self, command: &str, args: &[String]) -> SandboxResult<ProcessId> {
        if self.cleaned.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        tracker::spawn(
            self.catalog.clone(),
            self.temp_dir.path(),
            &self.helper_path,
            self.release_timeout,
            command,
            args,
        )
    }

    /// Request termination of the process with the given id.
    ///
    /// Idempotent on already-exited processes: the tracker swallows
    /// stops after exit, so repeating this is never an error.
    pub async fn stop(&self, id: ProcessId) -> SandboxResult<()> {
        let handle = self.handle(id)?;

        handle
            .stop
            .send(())
            .await
            .map_err(|_| SandboxError::ProcessNotFound)
    }

    /// Return the status of the process with the given id.
    pub async fn stat(&self, id: ProcessId) -> SandboxResult<Status> {
        let handle = self.handle(id)?;

        if self.cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => Err(SandboxError::Cancelled),
            status = handle.request_status() => status,
        }
    }

    /// Return a reader over the process's captured output, positioned at
    /// the beginning of the capture file. Every call yields an
    /// independent reader.
    pub async fn output(&self, id: ProcessId) -> SandboxResult<OutputReader> {
        let handle = self.handle(id)?;

        if self.cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => Err(SandboxError::Cancelled),
            reader = handle.request_output() => reader,
        }
    }

    /// Stop every tracked process, wait until each has observed an exit
    /// (or the embedder's token fires), then remove the sandbox
    /// directory. Runs at most once; later calls return immediately.
    pub async fn cleanup(&self) {
        if self
            .cleaned
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        // Snapshot under the read lock, block only after it is released.
        // Trackers that release themselves meanwhile close their channels,
        // which ends the per-tracker loop below.
        let handles: Vec<TrackerHandle> = self.catalog.read().values().cloned().collect();

        let stoppers = handles.into_iter().map(|handle| {
            let cancel = self.cancel.clone();
            async move { await_exit(handle, cancel).await }
        });
        futures::future::join_all(stoppers).await;

        // Unblock in-flight queries and refuse new work.
        self.cancel.cancel();

        if let Err(err) = tokio::fs::remove_dir_all(self.temp_dir.path()).await {
            warn!(error = %err, "failed to remove sandbox directory");
        }

        info!("sandbox cleaned up");
    }

    fn handle(&self, id: ProcessId) -> SandboxResult<TrackerHandle> {
        self.catalog
            .read()
            .get(&id)
            .cloned()
            .ok_or(SandboxError::ProcessNotFound)
    }
}

/// Repeatedly offer a stop and poll status until the tracker reports an
/// exit, its channels close, or the token fires.
async fn await_exit(handle: TrackerHandle, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            sent = handle.stop.send(()) => {
                if sent.is_err() {
                    break;
                }
            }

            status = handle.request_status() => match status {
                Ok(status) if status.exited => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }
}
