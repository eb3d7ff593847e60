//! Deployment of the embedded helper assets into a sandbox directory.

use procbox_shared::{SandboxError, SandboxResult};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Name of the helper binary inside the sandbox directory.
pub(crate) const HELPER_CMD: &str = "prochelper";

/// Name of the resource limits file the helper reads.
const CONSTRAINTS_CONFIG: &str = "constraints.json";

/// Prefix of the per-sandbox temp directory.
const SANDBOX_PREFIX: &str = "sandbox";

/// The helper ELF, staged by the build script from the helper crate.
static HELPER: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/prochelper"));

/// The resource limits applied to every command.
static CONSTRAINTS: &[u8] =
    include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/constraints.json"));

/// Write the helper binary (0700) and the constraints file (0600) into a
/// fresh temp directory. The directory is deleted when the `TempDir`
/// drops, so an unwinding embedder still leaves nothing behind.
pub(crate) fn deploy_helper() -> SandboxResult<(TempDir, PathBuf)> {
    let dir = tempfile::Builder::new()
        .prefix(SANDBOX_PREFIX)
        .tempdir()
        .map_err(|e| SandboxError::Deploy(format!("temp dir: {e}")))?;

    let helper_path = dir.path().join(HELPER_CMD);
    write_asset(&helper_path, HELPER, 0o700)?;
    write_asset(&dir.path().join(CONSTRAINTS_CONFIG), CONSTRAINTS, 0o600)?;

    Ok((dir, helper_path))
}

fn write_asset(path: &Path, bytes: &[u8], mode: u32) -> SandboxResult<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .mode(mode)
        .open(path)
        .map_err(|e| SandboxError::Deploy(format!("{}: {e}", path.display())))?;

    file.write_all(bytes)
        .map_err(|e| SandboxError::Deploy(format!("{}: {e}", path.display())))
}
