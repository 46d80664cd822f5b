//! Evaluation order of classic content switching policies.
//!
//! A classic CS vserver orders its policies by what they match on (domain,
//! rule, URL) rather than by priority alone, and URL policies are further
//! ordered by the shape of the URL. The advanced bind point only knows
//! priorities, so binds are bucketed here and renumbered in bucket order.

use std::collections::HashMap;

/// Longest name the appliance accepts for a policy or action.
pub const MAX_NAME_LENGTH: usize = 127;
const TRUNCATED_LENGTH: usize = 120;

/// Number of precedence buckets per vserver.
pub const BUCKETS: usize = 5;
/// Number of URL shape sub-buckets.
pub const URL_SHAPES: usize = 8;

const PATH: &str = "HTTP.REQ.URL.PATH.";
const PATH_CI: &str = "HTTP.REQ.URL.PATH.SET_TEXT_MODE(IGNORECASE).";

/// An advanced rule built from a classic `-url` (and optional `-domain`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRule {
    pub expr: String,
    /// Case-insensitive variant for vservers with `-caseSensitive OFF`.
    pub case_insensitive: Option<String>,
    /// 1 (exact URL) through 8 (never matches).
    pub shape: usize,
}

pub fn hostname_rule(domain: &str) -> String {
    format!("HTTP.REQ.HOSTNAME.EQ(\"{domain}\")")
}

/// Convert a classic URL pattern.
///
/// | pattern | shape |
/// |---|---|
/// | `/a/b.html` | 1, exact |
/// | `/a*.html` | 2, prefix and suffix |
/// | `/.html` | 3, suffix only |
/// | `/a/b`, `/a/` | 4, exact without extension |
/// | `/a/b.*` | 5, any extension |
/// | `/a/*`, `/a*.*` | 6, prefix |
/// | `/*` | 7, everything |
/// | `/a.` | 8, nothing |
pub fn convert_url(url: &str, domain: Option<&str>) -> UrlRule {
    let last = url.rsplit_once('/').map_or(url, |(_, last)| last);

    let (expr, case_insensitive, shape) = if !last.contains('.') && !last.ends_with('*') {
        let tail = format!("EQ((\"{url}.\" + HTTP.REQ.URL.SUFFIX).STRIP_END_CHARS(\".\"))");
        on_path(&tail, 4)
    } else if url.ends_with('.') {
        ("false".to_string(), Some("false".to_string()), 8)
    } else if let Some(stem) = url.strip_suffix("*.*") {
        on_path(&format!("STARTSWITH(\"{stem}\")"), 6)
    } else if let Some(stem) = url.strip_suffix('*').filter(|stem| stem.ends_with('.')) {
        let tail = format!("EQ((\"{stem}\" + HTTP.REQ.URL.SUFFIX).STRIP_END_CHARS(\".\"))");
        on_path(&tail, 5)
    } else if url == "/*" {
        ("true".to_string(), None, 7)
    } else if let Some(stem) = url.strip_suffix('*') {
        on_path(&format!("STARTSWITH(\"{stem}\")"), 6)
    } else {
        let (prefix, suffix) = url.rsplit_once('.').unwrap_or((url, ""));
        if prefix == "/" {
            (
                format!("HTTP.REQ.URL.SUFFIX.EQ(\"{suffix}\")"),
                Some(format!(
                    "HTTP.REQ.URL.SUFFIX.SET_TEXT_MODE(IGNORECASE).EQ(\"{suffix}\")"
                )),
                3,
            )
        } else if let Some(stem) = prefix.strip_suffix('*') {
            let suffix_rule = format!("HTTP.REQ.URL.SUFFIX.EQ(\"{suffix}\")");
            (
                format!("({PATH}STARTSWITH(\"{stem}\") && {suffix_rule})"),
                Some(format!("({PATH_CI}STARTSWITH(\"{stem}\") && {suffix_rule})")),
                2,
            )
        } else {
            on_path(&format!("EQ(\"{url}\")"), 1)
        }
    };

    let with_domain = |expr: String| match domain {
        Some(domain) => format!("{expr} && {}", hostname_rule(domain)),
        None => expr,
    };
    UrlRule {
        expr: with_domain(expr),
        case_insensitive: case_insensitive.map(with_domain),
        shape,
    }
}

fn on_path(tail: &str, shape: usize) -> (String, Option<String>, usize) {
    (format!("{PATH}{tail}"), Some(format!("{PATH_CI}{tail}")), shape)
}

/// What a classic CS policy matched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyShape {
    pub rule: bool,
    pub domain: bool,
    /// URL shape, see [`convert_url`].
    pub url: Option<usize>,
}

/// Precedence bucket of a policy, 0 evaluated first.
///
/// Rule precedence: domain and rule, rule, domain and URL, domain, URL.
/// URL precedence: domain and URL, domain, URL, domain and rule, rule.
pub fn precedence_bucket(shape: PolicyShape, url_first: bool) -> usize {
    let url = shape.url.is_some();
    if url_first {
        match (shape.rule, shape.domain, url) {
            (_, true, true) => 0,
            (false, true, _) => 1,
            (_, _, true) => 2,
            (true, true, _) => 3,
            _ => 4,
        }
    } else {
        match (shape.rule, shape.domain, url) {
            (true, true, _) => 0,
            (true, false, _) => 1,
            (_, true, true) => 2,
            (_, true, false) => 3,
            _ => 4,
        }
    }
}

/// Sub-bucket inside a precedence bucket.
pub fn shape_slot(shape: PolicyShape) -> usize {
    shape.url.map_or(0, |url| url.clamp(1, URL_SHAPES) - 1)
}

/// Keeps generated names within [`MAX_NAME_LENGTH`]. A long name is cut
/// and suffixed with a counter; asking again for the same long name gives
/// the same result.
#[derive(Debug, Default)]
pub struct NameShortener {
    shortened: HashMap<String, String>,
    counter: usize,
}

impl NameShortener {
    pub fn name_for(&mut self, name: &str) -> String {
        if name.len() <= MAX_NAME_LENGTH {
            return name.to_string();
        }
        if let Some(short) = self.shortened.get(name) {
            return short.clone();
        }
        self.counter += 1;
        // lengths are in bytes; cut on a char boundary
        let mut end = TRUNCATED_LENGTH;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        let mut short = name[..end].to_string();
        short.push_str(&format!("_{}", self.counter));
        self.shortened.insert(name.to_string(), short.clone());
        short
    }
}
