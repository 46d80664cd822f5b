/// Prefix of every name the converter invents.
pub const ADVANCED_PREFIX: &str = "nspepi_adv_";

/// Name of the advanced copy of a classic named expression.
///
/// Characters outside `[A-Za-z0-9_]` become `_`, so the result is always a
/// legal advanced identifier.
pub fn advanced_name(name: &str) -> String {
    let mut out = String::with_capacity(ADVANCED_PREFIX.len() + name.len());
    out.push_str(ADVANCED_PREFIX);
    out.extend(name.chars().map(|c| {
        if c.is_ascii_alphanumeric() || c == '_' {
            c
        } else {
            '_'
        }
    }));
    out
}

/// Whether a lowercased name can be referenced as-is from an advanced
/// expression.
pub fn is_valid_expression_name(lower: &str) -> bool {
    let mut chars = lower.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
