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
    bookforge::logging::init().context("init logging")?;

    let cli = bookforge::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        bookforge::cli::Command::Write(args) => {
            bookforge::commands::write(args).await.context("write")?;
        }
        bookforge::cli::Command::Session(args) => {
            bookforge::repl::run(args).await.context("session")?;
        }
        bookforge::cli::Command::Status(args) => {
            bookforge::commands::status(args).await.context("status")?;
        }
        bookforge::cli::Command::Export(args) => {
            bookforge::commands::export(args).await.context("export")?;
        }
        bookforge::cli::Command::Reset(args) => {
            bookforge::commands::reset(args).await.context("reset")?;
        }
    }

    Ok(())
}
