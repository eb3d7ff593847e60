use assert_cmd::Command;
use predicates::prelude::*;

fn procbox() -> Command {
    Command::new(env!("CARGO_BIN_EXE_procbox"))
}

#[test]
fn test_help_lists_subcommands() {
    procbox()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("stop"))
        .stdout(predicate::str::contains("stat"))
        .stdout(predicate::str::contains("output"));
}

#[test]
fn test_start_requires_command() {
    procbox()
        .arg("start")
        .assert()
        .failure()
        .stderr(predicate::str::contains("COMMAND"));
}

#[test]
fn test_stat_requires_id() {
    procbox().arg("stat").assert().failure();
}

#[test]
fn test_missing_tls_material_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.pem");

    procbox()
        .args(["stat", "01HZZZZZZZZZZZZZZZZZZZZZZZ"])
        .arg("--ca-file")
        .arg(&missing)
        .arg("--cert-file")
        .arg(&missing)
        .arg("--key-file")
        .arg(&missing)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_unreachable_server_exits_one() {
    let dir = tempfile::tempdir().unwrap();

    // Valid TLS material, nobody listening.
    let ca = procbox_shared::certs::generate_ca(dir.path(), "ca.cert", "ca.key", "Test CA")
        .expect("generate ca");
    procbox_shared::certs::generate_cert(dir.path(), &ca, false, "it", &["admin"])
        .expect("generate client cert");

    procbox()
        .args(["stat", "01HZZZZZZZZZZZZZZZZZZZZZZZ"])
        .arg("--addr")
        .arg("127.0.0.1:1")
        .arg("--ca-file")
        .arg(dir.path().join("ca.cert"))
        .arg("--cert-file")
        .arg(dir.path().join("it_admin.cert"))
        .arg("--key-file")
        .arg(dir.path().join("it_admin.key"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to connect"));
}
