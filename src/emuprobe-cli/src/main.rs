mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `watch --json` output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "emuprobe=info,emuprobe_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Configure {
            host,
            port,
            timeout_ms,
            mapper,
            show,
        } => {
            let update = commands::configure::ConfigUpdate {
                host,
                port,
                timeout_ms,
                mapper,
            };
            commands::configure::handle(update, show)?;
        }

        Commands::Read {
            address,
            length,
            driver,
        } => {
            commands::memory::handle_read(&driver, &address, length).await?;
        }

        Commands::Write {
            address,
            bytes,
            driver,
        } => {
            commands::memory::handle_write(&driver, &address, &bytes).await?;
        }

        Commands::Watch {
            mapper,
            freeze,
            json,
            driver,
        } => {
            commands::session::handle_watch(mapper, &freeze, json, &driver).await?;
        }

        Commands::Get {
            mapper,
            path,
            json,
            driver,
        } => {
            commands::session::handle_get(&mapper, &path, json, &driver).await?;
        }

        Commands::Set {
            mapper,
            path,
            value,
            driver,
        } => {
            commands::session::handle_set(&mapper, &path, &value, &driver).await?;
        }
    }

    Ok(())
}
