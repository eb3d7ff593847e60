//! Builds the helper crate and stages the `prochelper` ELF into OUT_DIR
//! so the library can embed it at compile time.
//!
//! The helper is compiled into its own target directory to keep the
//! nested cargo invocation off the outer build's locks.

use std::env;
use std::path::PathBuf;
use std::process::Command;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR set by cargo"));
    let manifest_dir =
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR set by cargo"));

    let helper_dir = manifest_dir
        .parent()
        .expect("workspace root")
        .join("procbox-helper");
    let target_dir = out_dir.join("prochelper-target");

    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let status = Command::new(cargo)
        .arg("build")
        .arg("--release")
        .arg("--manifest-path")
        .arg(helper_dir.join("Cargo.toml"))
        .arg("--target-dir")
        .arg(&target_dir)
        .status()
        .expect("failed to invoke cargo for prochelper");

    assert!(status.success(), "building prochelper failed");

    let built = target_dir.join("release").join("prochelper");
    let staged = out_dir.join("prochelper");
    std::fs::copy(&built, &staged).unwrap_or_else(|e| {
        panic!(
            "failed to stage {} -> {}: {e}",
            built.display(),
            staged.display()
        )
    });

    println!("cargo:rerun-if-changed={}", helper_dir.join("src").display());
    println!(
        "cargo:rerun-if-changed={}",
        helper_dir.join("Cargo.toml").display()
    );
    println!("cargo:rerun-if-changed=constraints.json");
}
