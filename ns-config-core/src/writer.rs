use std::fs;
use std::path::Path;

use thiserror::Error;

/// Errors that can occur while writing configuration output.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to write output file.
    #[error("failed to write config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Render a value for a command line, quoting when the value was quoted in the
/// source or would not survive tokenizing bare.
pub fn render_value(text: &str, quoted: bool) -> String {
    if !quoted && !needs_quotes(text) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' if matches!(chars.peek(), None | Some('"') | Some('\\')) => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || text.starts_with('-') && text.chars().nth(1).is_some_and(|c| c.is_ascii_alphabetic())
        || text.starts_with('#')
        || text
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\'')
}

/// Join output lines, one command per line, with a trailing newline.
pub fn write_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}

/// Write output lines to `path`.
pub fn write_file<S: AsRef<str>>(lines: &[S], path: &Path) -> Result<(), WriteError> {
    fs::write(path, write_lines(lines))?;
    Ok(())
}
