use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// A classic built-in named expression and its advanced replacement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedExpressionMapping {
    pub classic: String,
    pub advanced: String,
}

/// Appliance-provided names the converter must know about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BuiltinTables {
    #[serde(rename = "named_expression", default)]
    pub named_expressions: Vec<NamedExpressionMapping>,
    /// Built-in definitions that are dropped from the output.
    #[serde(default)]
    pub builtin_expressions: Vec<String>,
    /// Names the advanced grammar claims for itself.
    #[serde(default)]
    pub reserved_words: Vec<String>,
}

/// Errors returned when loading built-in tables.
#[derive(Debug, Error)]
pub enum BuiltinsLoadError {
    #[error("failed to read builtins file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse builtins file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Load built-in tables from a TOML file.
pub fn load_builtins(path: &Path) -> Result<BuiltinTables, BuiltinsLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| BuiltinsLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;

    parse_builtins(&raw, path.display().to_string())
}

/// Tables shipped with the converter.
pub fn default_builtins() -> BuiltinTables {
    let embedded = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/mappings/builtins.toml"
    ));
    match parse_builtins(embedded, "embedded builtins".to_string()) {
        Ok(tables) if !tables.named_expressions.is_empty() => tables,
        _ => fallback_builtins(),
    }
}

fn parse_builtins(raw: &str, path: String) -> Result<BuiltinTables, BuiltinsLoadError> {
    toml::from_str(raw).map_err(|source| BuiltinsLoadError::Parse { path, source })
}

fn fallback_builtins() -> BuiltinTables {
    let pairs = [
        ("ns_true", "TRUE"),
        ("ns_false", "FALSE"),
        ("ns_non_get", "ns_non_get_adv"),
        ("ns_header_cookie", "ns_header_cookie_adv"),
    ];
    BuiltinTables {
        named_expressions: pairs
            .iter()
            .map(|(classic, advanced)| NamedExpressionMapping {
                classic: classic.to_string(),
                advanced: advanced.to_string(),
            })
            .collect(),
        builtin_expressions: pairs
            .iter()
            .flat_map(|(classic, advanced)| [classic.to_string(), advanced.to_string()])
            .collect(),
        reserved_words: ["true", "false", "http", "client", "server"]
            .iter()
            .map(|w| w.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{default_builtins, parse_builtins};

    #[test]
    fn embedded_tables_load() {
        let tables = default_builtins();
        assert!(tables
            .named_expressions
            .iter()
            .any(|m| m.classic == "ns_true" && m.advanced == "TRUE"));
        assert!(tables.builtin_expressions.iter().any(|n| n == "ns_non_get"));
        assert!(!tables.reserved_words.is_empty());
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let tables = parse_builtins("reserved_words = [\"true\"]", "inline".to_string())
            .expect("parse");
        assert!(tables.named_expressions.is_empty());
        assert_eq!(tables.reserved_words, vec!["true".to_string()]);
    }

    #[test]
    fn malformed_file_reports_path() {
        let err = parse_builtins("named_expression = 3", "bad.toml".to_string())
            .expect_err("must fail");
        assert!(err.to_string().contains("bad.toml"));
    }
}
