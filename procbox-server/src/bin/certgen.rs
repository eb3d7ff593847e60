//! Offline CA and certificate generator for the command service PKI.
//!
//! Writes the fixture set the service and its tests expect: a CA pair, a
//! server pair, and client pairs whose subjects carry the organizations
//! and units the role table keys on. `invalid_admin` is signed by the
//! same CA but absent from the role table, for negative tests.

use clap::Parser;
use procbox_shared::SandboxResult;
use procbox_shared::certs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "certgen", about = "Generate the certificate set for the command service")]
struct Args {
    /// Directory the PEM files are written into
    #[arg(long, default_value = "certs")]
    basepath: PathBuf,
}

fn main() {
    let args = Args::parse();

    if let Err(err) = generate(&args.basepath) {
        eprintln!("certgen: {err}");
        std::process::exit(1);
    }

    println!("certificates written to {}", args.basepath.display());
}

fn generate(base: &Path) -> SandboxResult<()> {
    std::fs::create_dir_all(base)
        .map_err(|e| procbox_shared::SandboxError::Config(format!("{}: {e}", base.display())))?;

    let ca = certs::generate_ca(base, "ca.cert", "ca.key", "Company Name")?;

    certs::generate_cert(base, &ca, true, "server", &[])?;

    certs::generate_cert(base, &ca, false, "it", &["admin"])?;
    certs::generate_cert(base, &ca, false, "it", &["user"])?;
    certs::generate_cert(base, &ca, false, "hr", &["user"])?;
    certs::generate_cert(base, &ca, false, "invalid", &["admin"])?;

    Ok(())
}
