//! Locating bare identifiers inside advanced expression text.

/// A bare identifier found in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ident<'a> {
    /// Byte offset of the first character.
    pub start: usize,
    pub text: &'a str,
}

impl Ident<'_> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// A whole `&&`/`||` operand, used to find names that are not identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand<'a> {
    pub start: usize,
    pub text: &'a str,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Identifiers that may name an expression entity.
///
/// String literals are skipped, as are members of dotted chains
/// (`HTTP.REQ.URL`) and function names (`CONTAINS(`).
pub fn identifiers(expr: &str) -> Vec<Ident<'_>> {
    let bytes = expr.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' {
            i = skip_string(bytes, i);
            continue;
        }
        if !is_ident_start(b) {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && is_ident_char(bytes[i]) {
            i += 1;
        }
        let preceded = start > 0 && (bytes[start - 1] == b'.' || is_ident_char(bytes[start - 1]));
        if preceded {
            continue;
        }
        let followed_by_dot = bytes.get(i) == Some(&b'.');
        let next_significant = bytes[i..].iter().find(|c| !c.is_ascii_whitespace());
        if followed_by_dot || next_significant == Some(&b'(') {
            continue;
        }
        found.push(Ident {
            start,
            text: &expr[start..i],
        });
    }

    found
}

/// Position just past the string literal starting at `open`.
fn skip_string(bytes: &[u8], open: usize) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Split an expression on `&&` and then `||`, trimming parentheses and spaces
/// from each operand.
pub fn operands(expr: &str) -> Vec<Operand<'_>> {
    let mut found = Vec::new();
    for (and_start, and_part) in split_keep_offsets(expr, "&&") {
        for (or_start, or_part) in split_keep_offsets(and_part, "||") {
            let trimmed_start = or_part.len() - or_part.trim_start_matches(['(', ')', ' ']).len();
            let text = or_part.trim_matches(['(', ')', ' ']);
            if text.is_empty() {
                continue;
            }
            found.push(Operand {
                start: and_start + or_start + trimmed_start,
                text,
            });
        }
    }
    found
}

fn split_keep_offsets<'a>(text: &'a str, sep: &str) -> Vec<(usize, &'a str)> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        parts.push((start, &text[start..idx]));
        start = idx + sep.len();
    }
    parts.push((start, &text[start..]));
    parts
}

#[cfg(test)]
mod tests {
    use super::{identifiers, operands};

    fn names(expr: &str) -> Vec<&str> {
        identifiers(expr).into_iter().map(|i| i.text).collect()
    }

    #[test]
    fn skips_chains_calls_and_literals() {
        assert_eq!(
            names(r#"HTTP.REQ.URL.CONTAINS("e_lit") && e_img || !e_get"#),
            vec!["e_img", "e_get"]
        );
        assert_eq!(names("e_fn (1) && e_ok"), vec!["e_ok"]);
        assert!(names(r#""a \" b" "#).is_empty());
    }

    #[test]
    fn reports_offsets() {
        let found = identifiers("(e1 && e2)");
        assert_eq!(found[0].start, 1);
        assert_eq!(found[1].start, 7);
        assert_eq!(found[1].end(), 9);
    }

    #[test]
    fn operands_trim_parentheses() {
        let found = operands("(my-expr) && (a || 1bad)");
        let texts: Vec<_> = found.iter().map(|o| o.text).collect();
        assert_eq!(texts, vec!["my-expr", "a", "1bad"]);
        assert_eq!(found[0].start, 1);
        assert_eq!(found[2].start, 19);
    }
}
