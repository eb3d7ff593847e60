//! Sandboxed process execution.
//!
//! A [`Sandbox`] deploys the embedded `prochelper` binary and its
//! constraints file into a private temp directory, then starts arbitrary
//! commands through it. The helper confines each command to fresh UTS,
//! PID, mount, and network namespaces and applies control-group limits;
//! the library tracks every child, serves status snapshots, fans its
//! merged stdout/stderr out to any number of concurrent readers, and
//! releases the child's resources a grace period after it exits.
//!
//! ```no_run
//! # async fn example() -> procbox::SandboxResult<()> {
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! let sandbox = procbox::Sandbox::new(CancellationToken::new(), Duration::from_secs(300))?;
//!
//! let id = sandbox.start("ls", &["-la".to_string()]).await?;
//!
//! let mut reader = sandbox.output(id).await?;
//! let output = reader.read_to_end().await?;
//! println!("{}", String::from_utf8_lossy(&output));
//!
//! let status = sandbox.stat(id).await?;
//! println!("exited: {} code: {}", status.exited, status.exit_code);
//!
//! sandbox.cleanup().await;
//! # Ok(())
//! # }
//! ```

mod deploy;
mod output;
mod sandbox;
pub mod signal;
mod tracker;
mod types;

pub use output::OutputReader;
pub use procbox_shared::{SandboxError, SandboxResult};
pub use sandbox::Sandbox;
pub use types::{ProcessId, Status};
