use anyhow::Context;
use clap::Args;
use procbox_shared::Process;

#[derive(Args, Debug)]
pub struct StatArgs {
    /// Id of the process to inspect
    pub id: String,
}

pub async fn execute(args: StatArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let mut client = global.connect().await?;

    let status = client
        .stat(Process {
            id: args.id.clone(),
        })
        .await
        .context("could not get status")?
        .into_inner();

    println!("{}", super::status_line(&args.id, &status));
    Ok(())
}
