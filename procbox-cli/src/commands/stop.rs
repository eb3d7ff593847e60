use anyhow::Context;
use clap::Args;
use procbox_shared::Process;

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Id of the process to stop
    pub id: String,
}

pub async fn execute(args: StopArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let mut client = global.connect().await?;

    let status = client
        .stop(Process {
            id: args.id.clone(),
        })
        .await
        .context("could not stop process")?
        .into_inner();

    println!("{}", super::status_line(&args.id, &status));
    Ok(())
}
