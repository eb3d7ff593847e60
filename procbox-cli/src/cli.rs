//! CLI definition and argument parsing for the procbox client.

use clap::{Args, Parser, Subcommand};
use procbox_shared::CommandServiceClient;
use procbox_shared::tls::TlsMaterial;
use std::path::PathBuf;
use tonic::transport::Channel;

#[derive(Parser, Debug)]
#[command(name = "procbox", author, version, about = "Client for the sandboxed command service")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a command in the sandbox
    Start(crate::commands::start::StartArgs),

    /// Request termination of a running process
    Stop(crate::commands::stop::StopArgs),

    /// Show the status of a process
    Stat(crate::commands::stat::StatArgs),

    /// Stream the captured output of a process
    Output(crate::commands::output::OutputArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// File containing the CA root certificate
    #[arg(long, global = true, default_value = "certs/ca.cert")]
    pub ca_file: PathBuf,

    /// File containing the client certificate
    #[arg(long, global = true, default_value = "certs/it_admin.cert")]
    pub cert_file: PathBuf,

    /// File containing the client private key
    #[arg(long, global = true, default_value = "certs/it_admin.key")]
    pub key_file: PathBuf,

    /// Server address in host:port form
    #[arg(long, global = true, default_value = "127.0.0.1:50000")]
    pub addr: String,
}

impl GlobalFlags {
    /// Build a mutually authenticated client channel.
    pub async fn connect(&self) -> anyhow::Result<CommandServiceClient<Channel>> {
        let material = TlsMaterial::load(&self.ca_file, &self.cert_file, &self.key_file)?;

        let channel = Channel::from_shared(format!("https://{}", self.addr))
            .map_err(|e| anyhow::anyhow!("invalid address {:?}: {e}", self.addr))?
            .tls_config(material.client_config("localhost"))?
            .connect()
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to {}: {e}", self.addr))?;

        Ok(CommandServiceClient::new(channel))
    }
}
