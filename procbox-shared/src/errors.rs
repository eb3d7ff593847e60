//! Error taxonomy shared across the sandbox crates.
//!
//! The library recovers nothing internally: every failure surfaces to the
//! caller as one of these variants. The RPC facade additionally collapses
//! all authentication-related causes into [`SandboxError::Auth`] before
//! anything reaches the wire.

use std::io;
use thiserror::Error;

pub type SandboxResult<T> = Result<T, SandboxError>;

/// Errors surfaced by the sandbox library and service.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The id is unknown, or its tracker was already released.
    #[error("process not found")]
    ProcessNotFound,

    /// The sandbox cancellation token fired, or cleanup already ran.
    #[error("sandbox cancelled")]
    Cancelled,

    /// The helper or target process could not be started.
    #[error("spawn failure: {0}")]
    Spawn(String),

    /// The helper binary or constraints file could not be materialized.
    #[error("deploy failure: {0}")]
    Deploy(String),

    /// Opaque on the wire; the true cause is logged server-side only.
    #[error("authentication failure")]
    Auth,

    /// Malformed role table, constraints document, or TLS material.
    #[error("config error: {0}")]
    Config(String),

    /// Generic IO error (catch-all).
    #[error("io: {0}")]
    Io(#[from] io::Error),
}
