use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "nspepi-convert")]
#[command(about = "Convert classic policy configuration to advanced policy syntax")]
pub struct Cli {
    /// Log conversion progress (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Convert a saved configuration file.
    Convert(ConvertArgs),
    /// List the configuration lines that conversion would change or that
    /// need manual work.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Saved configuration (ns.conf style).
    pub input: PathBuf,
    /// Output file. Defaults to nspepi_<input name> next to the input.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Write the diagnostics and counters as JSON to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Built-in expression tables (TOML). Defaults to the shipped tables.
    #[arg(long)]
    pub builtins_file: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Saved configuration (ns.conf style).
    pub input: PathBuf,
    /// Output file. Defaults to issues_<input name> next to the input.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Built-in expression tables (TOML). Defaults to the shipped tables.
    #[arg(long)]
    pub builtins_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
