//! End-to-end tests against a real server process over mutual TLS.
//!
//! Each test generates a fresh PKI, boots the server binary on an
//! ephemeral port, and drives it with tonic clients holding different
//! client certificates. Command execution inside the sandbox needs a
//! privileged cgroup-v1 host; everything asserted here (authentication,
//! authorization, status surfaces) holds regardless, because `start`
//! returns an id as soon as the helper process spawns.

use procbox_shared::tls::TlsMaterial;
use procbox_shared::{Command, CommandServiceClient, Process, certs};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, Stdio};
use std::time::Duration;
use tonic::transport::Channel;

struct TestServer {
    child: Child,
    addr: String,
    certs_dir: tempfile::TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl TestServer {
    fn cert(&self, name: &str) -> PathBuf {
        self.certs_dir.path().join(name)
    }

    async fn client(&self, name: &str) -> CommandServiceClient<Channel> {
        let material = TlsMaterial::load(
            &self.cert("ca.cert"),
            &self.cert(&format!("{name}.cert")),
            &self.cert(&format!("{name}.key")),
        )
        .expect("client material");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
        loop {
            let endpoint = Channel::from_shared(format!("https://{}", self.addr))
                .expect("valid uri")
                .tls_config(material.client_config("localhost"))
                .expect("tls config");

            match endpoint.connect().await {
                Ok(channel) => return CommandServiceClient::new(channel),
                Err(err) => {
                    assert!(
                        tokio::time::Instant::now() < deadline,
                        "server never became reachable: {err}"
                    );
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

fn generate_pki(base: &Path) {
    let ca = certs::generate_ca(base, "ca.cert", "ca.key", "Company Name").expect("ca");
    certs::generate_cert(base, &ca, true, "server", &[]).expect("server cert");
    certs::generate_cert(base, &ca, false, "it", &["admin"]).expect("it_admin cert");
    certs::generate_cert(base, &ca, false, "it", &["user"]).expect("it_user cert");
    certs::generate_cert(base, &ca, false, "invalid", &["admin"]).expect("invalid_admin cert");
}

fn start_server() -> TestServer {
    let certs_dir = tempfile::tempdir().expect("certs dir");
    generate_pki(certs_dir.path());

    // Reserve an ephemeral port, then hand it to the server.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("probe port");
        listener.local_addr().expect("local addr").to_string()
    };

    let child = StdCommand::new(env!("CARGO_BIN_EXE_procbox-server"))
        .arg("--ca-file")
        .arg(certs_dir.path().join("ca.cert"))
        .arg("--cert-file")
        .arg(certs_dir.path().join("server.cert"))
        .arg("--key-file")
        .arg(certs_dir.path().join("server.key"))
        .arg("--addr")
        .arg(&addr)
        .arg("--release-timeout")
        .arg("5m")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn server");

    TestServer {
        child,
        addr,
        certs_dir,
    }
}

#[tokio::test]
async fn test_wildcard_admin_starts_anything() {
    let server = start_server();
    let mut client = server.client("it_admin").await;

    let process = client
        .start(Command {
            command: "true".into(),
            args: vec![],
        })
        .await
        .expect("admin may start anything")
        .into_inner();

    assert_eq!(process.id.len(), 26, "ids are ULID tokens");

    // The same caller may stat what it started.
    let status = client
        .stat(Process {
            id: process.id.clone(),
        })
        .await
        .expect("stat after start")
        .into_inner();

    // Exit may or may not have been observed yet; the surface matters.
    let _ = status.exited;
}

#[tokio::test]
async fn test_unauthorized_command_is_opaque() {
    let server = start_server();
    let mut client = server.client("it_user").await;

    let err = client
        .start(Command {
            command: "rm".into(),
            args: vec!["-rf".into(), "/".into()],
        })
        .await
        .expect_err("it_user must not start rm");

    assert_eq!(err.code(), tonic::Code::Unauthenticated);
    assert_eq!(err.message(), "authentication failure");
}

#[tokio::test]
async fn test_unknown_org_gets_nothing() {
    let server = start_server();
    let mut client = server.client("invalid_admin").await;

    let err = client
        .start(Command {
            command: "ls".into(),
            args: vec![],
        })
        .await
        .expect_err("unknown org has no grants");

    assert_eq!(err.code(), tonic::Code::Unauthenticated);
}

#[tokio::test]
async fn test_stat_unknown_id_is_not_found() {
    let server = start_server();
    let mut client = server.client("it_admin").await;

    let err = client
        .stat(Process {
            id: "01HZZZZZZZZZZZZZZZZZZZZZZZ".into(),
        })
        .await
        .expect_err("unknown id");

    assert_eq!(err.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn test_stop_unknown_id_is_opaque() {
    let server = start_server();
    let mut client = server.client("it_admin").await;

    // Without a stored command there is nothing to authorize, so the
    // stop path collapses unknown ids into the opaque failure.
    let err = client
        .stop(Process {
            id: "01HZZZZZZZZZZZZZZZZZZZZZZZ".into(),
        })
        .await
        .expect_err("unknown id");

    assert_eq!(err.code(), tonic::Code::Unauthenticated);
}

#[tokio::test]
async fn test_output_streams_to_eof() {
    let server = start_server();
    let mut client = server.client("it_admin").await;

    let process = client
        .start(Command {
            command: "true".into(),
            args: vec![],
        })
        .await
        .expect("start")
        .into_inner();

    let mut stream = client
        .output(Process { id: process.id })
        .await
        .expect("output stream")
        .into_inner();

    // Drain until the child exits and the server closes the stream.
    while let Some(frame) = stream.message().await.expect("stream stays healthy") {
        assert!(frame.data.len() <= 1024, "frames are bounded");
    }
}
