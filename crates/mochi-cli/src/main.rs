mod cli;
mod codec;
mod console;

use std::io::{self, ErrorKind};

use clap::Parser;
use mochi_core::config::{self, Config};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, CliCommand, join_hex};
use crate::console::Console;

/// Log filter variable, e.g. `MOCHI_LOG=mochi_core=debug`.
const LOG_ENV: &str = "MOCHI_LOG";

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> io::Result<Config> {
    let home = config::resolve_home(cli.home.clone()).map_err(io::Error::other)?;
    Config::load(&home).map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))
}

#[tokio::main]
async fn main() -> io::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        CliCommand::Console => {
            let console = Console::new(&config)?;
            console.repl(io::stdin().lock()).await
        }
        CliCommand::Exec { line } => {
            let console = Console::new(&config)?;
            if console.run_and_report(&line.join(" ")).await {
                Ok(())
            } else {
                Err(io::Error::other("command failed"))
            }
        }
        CliCommand::Decode { key, frame } => {
            let key = key.or_else(|| config.protocol.session_key.clone());
            println!("{}", codec::decode(&join_hex(&frame), key.as_deref())?);
            Ok(())
        }
        CliCommand::Tea {
            direction,
            key,
            data,
        } => {
            println!("{}", codec::tea(direction, &key, &join_hex(&data))?);
            Ok(())
        }
    }
}
