//! Client CLI for the procbox command service.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start(args) => commands::start::execute(args, &cli.global).await,
        Commands::Stop(args) => commands::stop::execute(args, &cli.global).await,
        Commands::Stat(args) => commands::stat::execute(args, &cli.global).await,
        Commands::Output(args) => commands::output::execute(args, &cli.global).await,
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
