//! `prochelper` — the binary deployed into each sandbox directory.
//!
//! Two stages of the same executable:
//!
//! - `prochelper run <cmd> [args…]` applies the cgroup constraints found
//!   next to it, enters fresh namespaces, and re-execs itself as `sub`.
//! - `prochelper sub <cmd> [args…]` runs inside the namespaces and
//!   supervises the target with inherited stdio.
//!
//! Both stages cascade SIGTERM/SIGINT to the child (SIGKILL when the
//! child refuses delivery) and exit with the child's code. Helper-side
//! failures exit with the reserved code 125, which stays clear of the
//! codes ordinary programs and the shell sentinels 126/127 use.

mod cgroups;
mod iso;

use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::Command;

/// Exit code for failures in the helper itself, as opposed to the target.
const HELPER_FAILURE: i32 = 125;

const CGROUP_ROOT: &str = "/sys/fs/cgroup";
const CGROUP_PARENT: &str = "procbox";
const CONSTRAINTS_CONFIG: &str = "constraints.json";

#[derive(Parser)]
#[command(name = "prochelper", about = "Sandbox helper: isolation, limits, exec")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Apply resource limits, isolate, and run a command
    Run {
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Inner stage: supervise the target inside the namespaces
    #[command(hide = true)]
    Sub {
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let code = match cli.mode {
        Mode::Run { command, args } => run(&command, &args),
        Mode::Sub { command, args } => sub(&command, &args),
    };

    std::process::exit(code);
}

fn run(command: &str, args: &[String]) -> i32 {
    // Limits first: the helper joins the cgroup so the whole re-exec'd
    // subtree inherits it. A missing constraints file means the helper
    // is running outside a deployed sandbox directory; run unlimited.
    if let Ok(config) = std::fs::read(CONSTRAINTS_CONFIG) {
        let set = match cgroups::CgroupSet::from_json(&config) {
            Ok(set) => set,
            Err(err) => {
                eprintln!("prochelper: {err}");
                return HELPER_FAILURE;
            }
        };

        if let Err(err) = set.apply(Path::new(CGROUP_ROOT), CGROUP_PARENT, std::process::id()) {
            eprintln!("prochelper: cgroup setup failed: {err}");
            return HELPER_FAILURE;
        }
    }

    let mut target = Vec::with_capacity(args.len() + 1);
    target.push(command.to_string());
    target.extend_from_slice(args);

    match iso::isolate(&target) {
        Ok(cmd) => supervise(cmd),
        Err(err) => {
            eprintln!("prochelper: isolation failed: {err}");
            HELPER_FAILURE
        }
    }
}

fn sub(command: &str, args: &[String]) -> i32 {
    let mut cmd = Command::new(command);
    cmd.args(args);
    supervise(cmd)
}

/// Spawn the child, cascade termination signals to it, and return its
/// exit code once reaped.
fn supervise(mut cmd: Command) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            eprintln!("prochelper: spawn failed: {err}");
            return HELPER_FAILURE;
        }
    };

    // Signal-handler based forwarding: the run stage cannot create
    // threads once it holds a pending PID namespace, and kill(2) is
    // async-signal-safe.
    let pid = child.id() as libc::pid_t;
    let mut hooks = Vec::new();
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        let registered = unsafe {
            signal_hook::low_level::register(sig, move || {
                if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
                    unsafe { libc::kill(pid, libc::SIGKILL) };
                }
            })
        };

        match registered {
            Ok(hook) => hooks.push(hook),
            Err(err) => {
                eprintln!("prochelper: signal handler: {err}");
                let _ = child.kill();
                let _ = child.wait();
                return HELPER_FAILURE;
            }
        }
    }

    let status = child.wait();

    for hook in hooks {
        signal_hook::low_level::unregister(hook);
    }

    match status {
        Ok(status) => status
            .code()
            .unwrap_or_else(|| 128 + status.signal().unwrap_or(0)),
        Err(err) => {
            eprintln!("prochelper: wait failed: {err}");
            HELPER_FAILURE
        }
    }
}
