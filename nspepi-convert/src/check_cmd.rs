use std::fs;

use anyhow::{Context, Result};
use colored::Colorize;
use ns_config_core::write_file;

use crate::cli::CheckArgs;
use crate::convert_cmd::convert_file;
use crate::output_paths::output_path;

pub fn run_check(args: CheckArgs) -> Result<()> {
    let output = output_path(&args.input, args.output.as_deref(), "issues_")?;

    let outcome = convert_file(&args.input, args.builtins_file.as_deref())?;
    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let source: Vec<&str> = raw.lines().collect();
    let issues: Vec<&str> = outcome
        .touched_lines
        .iter()
        .filter_map(|lineno| source.get(lineno - 1).copied())
        .collect();

    write_file(&issues, &output)
        .with_context(|| format!("failed to write issues file {}", output.display()))?;

    let summary = format!(
        "check_summary commands={} issues={} errors={} warnings={}",
        outcome.stats.commands,
        issues.len(),
        outcome.stats.errors,
        outcome.stats.warnings
    );
    if issues.is_empty() {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.yellow());
    }
    println!("output={}", output.display());
    Ok(())
}
