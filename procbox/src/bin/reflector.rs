//! Test support tool: reports its own identity from inside the sandbox.
//!
//! Emits one JSON line with `{pid, uid, gid, terminated: false}` at
//! startup, waits for SIGTERM or SIGINT, then emits the same record with
//! `terminated: true` and exits. Lifecycle tests decode the two records
//! to verify PID-namespace isolation and signal delivery.

use nix::unistd::{getgid, getpid, getuid};
use serde::Serialize;
use tokio::signal::unix::{SignalKind, signal};

#[derive(Serialize)]
struct Info {
    pid: i32,
    uid: u32,
    gid: u32,
    terminated: bool,
}

fn report(terminated: bool) {
    use std::io::Write;

    let info = Info {
        pid: getpid().as_raw(),
        uid: getuid().as_raw(),
        gid: getgid().as_raw(),
        terminated,
    };

    println!("{}", serde_json::to_string(&info).expect("serializable info"));
    std::io::stdout().flush().expect("flush stdout");
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    report(false);

    let mut terminate = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    let mut interrupt = signal(SignalKind::interrupt()).expect("install SIGINT handler");

    tokio::select! {
        _ = terminate.recv() => {}
        _ = interrupt.recv() => {}
    }

    report(true);
}
