//! Core data types for process lifecycle management.

use procbox_shared::SandboxError;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Identifier for a sandboxed process.
///
/// A ULID: 128 bits (48-bit timestamp + 80 bits of randomness) rendered
/// as a stable 26-character token. The full value travels end to end,
/// including the wire, so collisions are negligible and no truncation
/// ever happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(Ulid);

impl ProcessId {
    pub(crate) fn new() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ProcessId {
    type Err = SandboxError;

    /// A token that does not parse cannot name a process.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|_| SandboxError::ProcessNotFound)
    }
}

/// Point-in-time view of a tracked process.
///
/// `exited` and `exit_code` are authoritative only once the tracker has
/// reaped the child; until then `exit_code` is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// The user-supplied program, retained for role re-checks.
    pub command: String,
    pub exited: bool,
    pub exit_code: i32,
}
