use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod check_cmd;
mod cli;
mod convert_cmd;
mod output_paths;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Convert(args) => convert_cmd::run_convert(args),
        Command::Check(args) => check_cmd::run_check(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
