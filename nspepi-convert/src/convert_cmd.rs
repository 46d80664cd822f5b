use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ns_config_core::write_file;
use nspepi_convert::builtins::{default_builtins, load_builtins, BuiltinTables};
use nspepi_convert::diagnostics::Diagnostic;
use nspepi_convert::pipeline::{ConversionOutcome, ConversionStats, Converter};
use nspepi_convert::report::{render_diagnostics, render_summary};
use serde::Serialize;
use tracing::info;

use crate::cli::{ConvertArgs, OutputFormat};
use crate::output_paths::{output_path, refuse_clobber};

#[derive(Debug, Serialize)]
struct ConvertReport<'a> {
    input: String,
    output: String,
    stats: ConversionStats,
    diagnostics: &'a [Diagnostic],
}

pub fn run_convert(args: ConvertArgs) -> Result<()> {
    let output = output_path(&args.input, args.output.as_deref(), "nspepi_")?;
    if let Some(report) = &args.report {
        refuse_clobber(report, &[args.input.as_path(), output.as_path()])?;
    }

    let outcome = convert_file(&args.input, args.builtins_file.as_deref())?;
    write_file(&outcome.lines, &output)
        .with_context(|| format!("failed to write output {}", output.display()))?;
    info!(output = %output.display(), "converted configuration written");

    let report = ConvertReport {
        input: args.input.display().to_string(),
        output: output.display().to_string(),
        stats: outcome.stats,
        diagnostics: &outcome.diagnostics,
    };
    if let Some(path) = &args.report {
        fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("failed to write report file {}", path.display()))?;
    }

    match args.format {
        OutputFormat::Text => {
            if !outcome.diagnostics.is_empty() {
                println!("{}", render_diagnostics(&outcome.diagnostics));
            }
            println!("{}", render_summary(outcome.stats));
            println!("output={}", output.display());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

/// Read, parse and convert one configuration file.
pub fn convert_file(input: &Path, builtins_file: Option<&Path>) -> Result<ConversionOutcome> {
    let builtins = resolve_builtins(builtins_file)?;
    let raw = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    Converter::new(&builtins)?
        .convert_str(&raw)
        .with_context(|| format!("failed to convert {}", input.display()))
}

fn resolve_builtins(path: Option<&Path>) -> Result<BuiltinTables> {
    match path {
        Some(path) => load_builtins(path)
            .with_context(|| format!("failed to load builtins from {}", path.display())),
        None => Ok(default_builtins()),
    }
}
