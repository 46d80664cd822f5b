use colored::Colorize;

use crate::diagnostics::{Diagnostic, Severity};
use crate::pipeline::ConversionStats;

/// One-line run summary.
pub fn render_summary(stats: ConversionStats) -> String {
    let line = format!(
        "convert_summary commands={} converted={} deferred={} errors={} warnings={}",
        stats.commands, stats.converted, stats.deferred, stats.errors, stats.warnings
    );
    if stats.errors > 0 {
        line.red().to_string()
    } else if stats.warnings > 0 {
        line.yellow().to_string()
    } else {
        line.cyan().to_string()
    }
}

/// Diagnostics for terminal output, one per line.
pub fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut out = Vec::new();
    for diagnostic in diagnostics {
        let prefix = match diagnostic.severity {
            Severity::Error => "ERROR".red().to_string(),
            Severity::Warning => "WARN".yellow().to_string(),
        };
        out.push(format!(
            "{prefix} line={} code={} {}",
            diagnostic.lineno, diagnostic.code, diagnostic.message
        ));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{render_diagnostics, render_summary};
    use crate::diagnostics::{Diagnostic, Severity};
    use crate::pipeline::ConversionStats;

    #[test]
    fn summary_lists_every_counter() {
        colored::control::set_override(false);
        let stats = ConversionStats {
            commands: 4,
            converted: 2,
            deferred: 1,
            errors: 0,
            warnings: 1,
        };
        assert_eq!(
            render_summary(stats),
            "convert_summary commands=4 converted=2 deferred=1 errors=0 warnings=1"
        );
    }

    #[test]
    fn diagnostics_carry_line_and_code() {
        colored::control::set_override(false);
        let rendered = render_diagnostics(&[Diagnostic {
            severity: Severity::Error,
            code: "conversion_failed",
            message: "Error in converting command : add cs policy p1".into(),
            lineno: 7,
        }]);
        assert_eq!(
            rendered,
            "ERROR line=7 code=conversion_failed Error in converting command : add cs policy p1"
        );
    }
}
