//! Entry point for the procbox command service.
//!
//! Terminates TLS itself (1.3 only, verified client certificates) and
//! feeds the accepted streams to tonic, so the service sees the peer
//! certificate on every request. A termination signal drains the gRPC
//! server first and then cleans up the sandbox.

mod service;

use anyhow::Context;
use clap::Parser;
use procbox::{Sandbox, signal};
use procbox_shared::CommandServiceServer;
use procbox_shared::roles::RoleTable;
use procbox_shared::tls::TlsMaterial;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tonic::transport::Server;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Role configuration baked into the server at build time.
static ROLES: &str = include_str!("../roles.json");

#[derive(Parser, Debug)]
#[command(name = "procbox-server", about = "Sandboxed command execution service")]
struct Args {
    /// File containing the CA root certificate
    #[arg(long, default_value = "certs/ca.cert")]
    ca_file: PathBuf,

    /// File containing the server certificate
    #[arg(long, default_value = "certs/server.cert")]
    cert_file: PathBuf,

    /// File containing the server private key
    #[arg(long, default_value = "certs/server.key")]
    key_file: PathBuf,

    /// Listen address in host:port form
    #[arg(long, default_value = "127.0.0.1:50000")]
    addr: SocketAddr,

    /// Grace period between a command's exit and the release of its
    /// resources (e.g. "30s", "5m", "1h")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5m")]
    release_timeout: Duration,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(Args::parse()).await {
        error!(error = format!("{err:#}"), "server failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let roles: RoleTable =
        serde_json::from_str(ROLES).context("failed to parse embedded role table")?;

    let material = TlsMaterial::load(&args.ca_file, &args.cert_file, &args.key_file)
        .context("failed to load TLS material")?;
    let acceptor = TlsAcceptor::from(material.server_config()?);

    let cancel = signal::termination_token();

    let sandbox = Arc::new(Sandbox::new(cancel.clone(), args.release_timeout)?);
    info!("sandbox created");

    let listener = TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;
    info!(addr = %args.addr, "serving command service");

    let incoming = {
        let cancel = cancel.clone();
        async_stream::stream! {
            loop {
                let (tcp, remote) = tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                            continue;
                        }
                    },
                };

                // Handshake failures end one connection, not the server.
                match acceptor.accept(tcp).await {
                    Ok(stream) => yield Ok::<_, std::io::Error>(stream),
                    Err(err) => warn!(peer = %remote, error = %err, "tls handshake failed"),
                }
            }
        }
    };

    let server = service::CommandServer::new(sandbox.clone(), roles);

    let shutdown = cancel.clone();
    Server::builder()
        .add_service(CommandServiceServer::new(server))
        .serve_with_incoming_shutdown(incoming, async move {
            shutdown.cancelled().await;
            info!("stopping command service");
        })
        .await
        .context("grpc server error")?;

    sandbox.cleanup().await;
    info!("cleaned up sandbox");

    Ok(())
}
