use anyhow::Context;
use clap::Args;
use procbox_shared::Process;
use tokio::io::AsyncWriteExt;

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Id of the process whose output to stream
    pub id: String,
}

pub async fn execute(args: OutputArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let mut client = global.connect().await?;

    let mut stream = client
        .output(Process { id: args.id })
        .await
        .context("could not open output stream")?
        .into_inner();

    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => {
                interrupted.context("signal handler failed")?;
                break;
            }

            frame = stream.message() => match frame.context("output stream error")? {
                Some(output) => {
                    stdout
                        .write_all(&output.data)
                        .await
                        .context("error while writing to stdout")?;
                }
                None => break,
            }
        }
    }

    stdout.flush().await.context("error while flushing stdout")?;
    Ok(())
}
