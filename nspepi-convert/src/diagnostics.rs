use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One issue the user has to look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable machine-readable category, e.g. `unresolved_expression`.
    pub code: &'static str,
    pub message: String,
    /// Source line of the command, 0 when the command was synthesized.
    pub lineno: usize,
}

/// Ordered diagnostic sink.
///
/// Every entry is mirrored to `tracing` as it is recorded. While muted (the
/// collect pass re-runs conversions whose findings are reported again in the
/// convert pass) entries are dropped.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    muted: bool,
}

impl Diagnostics {
    pub fn error(&mut self, code: &'static str, lineno: usize, message: impl Into<String>) {
        self.push(Severity::Error, code, lineno, message.into());
    }

    pub fn warning(&mut self, code: &'static str, lineno: usize, message: impl Into<String>) {
        self.push(Severity::Warning, code, lineno, message.into());
    }

    fn push(&mut self, severity: Severity, code: &'static str, lineno: usize, message: String) {
        if self.muted {
            return;
        }
        match severity {
            Severity::Error => error!(code, lineno, "{message}"),
            Severity::Warning => warn!(code, lineno, "{message}"),
        }
        self.entries.push(Diagnostic {
            severity,
            code,
            message,
            lineno,
        });
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

/// Error codes used across the converter.
pub mod codes {
    pub const CONVERSION_FAILED: &str = "conversion_failed";
    pub const SECURITY_EXPRESSION: &str = "security_expression";
    pub const NAME_CONFLICT: &str = "name_conflict";
    pub const INVALID_NAME: &str = "invalid_name";
    pub const GOTO_EXPRESSION: &str = "goto_expression";
    pub const UNSUPPORTED_BIND: &str = "unsupported_bind";
    pub const UNSUPPORTED_FEATURE: &str = "unsupported_feature";
    pub const DISABLED_BIND: &str = "disabled_bind";
    pub const MIXED_SSL_BINDS: &str = "mixed_ssl_binds";
    pub const TOKENIZE_FAILED: &str = "tokenize_failed";
}

#[cfg(test)]
mod tests {
    use super::{Diagnostics, Severity};

    #[test]
    fn muted_sink_drops_entries() {
        let mut diags = Diagnostics::default();
        diags.set_muted(true);
        diags.error("conversion_failed", 1, "dropped");
        diags.set_muted(false);
        diags.warning("disabled_bind", 2, "kept");

        assert_eq!(diags.entries().len(), 1);
        assert_eq!(diags.count(Severity::Warning), 1);
        assert_eq!(diags.count(Severity::Error), 0);
    }
}
