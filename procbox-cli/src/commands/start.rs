use anyhow::Context;
use clap::Args;
use procbox_shared::Command;

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Program to run inside the sandbox
    pub command: String,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

pub async fn execute(args: StartArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let mut client = global.connect().await?;

    let process = client
        .start(Command {
            command: args.command.clone(),
            args: args.args.clone(),
        })
        .await
        .context("could not start process")?
        .into_inner();

    if args.args.is_empty() {
        println!("started command [{}]; id: {}", args.command, process.id);
    } else {
        println!(
            "started command [{}] with args [{}]; id: {}",
            args.command,
            args.args.join(" "),
            process.id
        );
    }

    Ok(())
}
