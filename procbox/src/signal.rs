//! Host signal wiring: cooperative shutdown tokens and child termination.

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::io;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Returns a token that is cancelled on the first SIGINT or SIGTERM.
///
/// Must be called from within a tokio runtime; the listener task lives
/// for the life of the process.
pub fn termination_token() -> CancellationToken {
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "failed to install SIGINT handler");
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }

        trigger.cancel();
    });

    token
}

/// Ask `pid` to exit with SIGTERM; escalate to SIGKILL when delivery
/// fails. Only both failing surfaces an error, and the tracker ignores
/// even that: the subsequent wait reveals what actually happened.
pub(crate) fn terminate(pid: Pid) -> io::Result<()> {
    if let Err(term_err) = kill(pid, Signal::SIGTERM) {
        kill(pid, Signal::SIGKILL).map_err(|kill_err| {
            io::Error::other(format!(
                "SIGTERM failed ({term_err}); SIGKILL failed ({kill_err})"
            ))
        })?;
    }

    Ok(())
}
