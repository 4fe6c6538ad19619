//! cachefetch - fetch JSON resources through a local cache
//!
//! Resolves keys against an optional base URL, serves fresh entries from the
//! on-disk cache and revalidates stale ones, retrying failed requests.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use cachefetch::cli::{Cli, RunConfig};
use cachefetch::{commands, logging, HttpTransport};

async fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    logging::init_logging(cli.verbose)?;
    let config = RunConfig::from_cli(&cli)?;

    let mut transport = HttpTransport::new();
    if let Some(base_url) = &config.base_url {
        transport = transport.with_base_url(base_url.clone());
    }

    let mut stdout = io::stdout();
    Ok(commands::run(&config, &cli.command, Arc::new(transport), &mut stdout).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
