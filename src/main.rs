use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    opdsnav::logging::init().context("init logging")?;

    let cli = opdsnav::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        opdsnav::cli::Command::Serve(args) => {
            opdsnav::proxy::run(args).await.context("serve")?;
        }
        opdsnav::cli::Command::Browse(args) => {
            opdsnav::browse::run(args).await.context("browse")?;
        }
        opdsnav::cli::Command::Normalize(args) => {
            opdsnav::browse::normalize(args).context("normalize")?;
        }
    }

    Ok(())
}
