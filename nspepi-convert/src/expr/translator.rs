//! Token-level translation of expression text.
//!
//! [`ExprTranslator`] is the seam between the pipeline and the grammar work:
//! the rewriter only needs "give me the advanced form of this text". The
//! bundled [`RuleTranslator`] understands the common classic qualifiers:
//!
//! ```text
//! REQ.HTTP.URL CONTAINS /img && REQ.HTTP.METHOD == GET
//!   => HTTP.REQ.URL.CONTAINS("/img") && HTTP.REQ.METHOD.EQ(GET)
//! ```
//!
//! Text without a `REQ.`/`RES.` qualifier is returned unchanged; named
//! expression references are left for the rewriter to substitute.

use std::net::Ipv4Addr;

use regex::{Captures, Regex};

/// Result of translating classic expression text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Advanced text; equal to the input when nothing needed translating.
    Converted(String),
    Untranslatable,
    /// The text uses client security qualifiers that have no advanced form.
    SecurityExpression,
}

pub trait ExprTranslator {
    fn translate_classic(&self, expr: &str, ignore_security: bool) -> Translation;

    /// Clean up text that is already advanced. `None` when an embedded
    /// classic expression cannot be translated.
    fn translate_advanced(&self, expr: &str) -> Option<String>;
}

const SECURITY_PREFIXES: &[&str] = &[
    "CLIENT.APPLICATION",
    "CLIENT.OS",
    "CLIENT.FILE",
    "CLIENT.REG",
    "CLIENT.SVC",
    "CLIENT.SYSTEM",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    Number,
    Method,
    Address,
    Presence,
}

struct Qualifier {
    classic: &'static str,
    advanced: &'static str,
    kind: ValueKind,
    /// Followed by a header name before the operator.
    takes_name: bool,
}

const fn qualifier(classic: &'static str, advanced: &'static str, kind: ValueKind) -> Qualifier {
    Qualifier {
        classic,
        advanced,
        kind,
        takes_name: false,
    }
}

const QUALIFIERS: &[Qualifier] = &[
    qualifier("REQ.HTTP.METHOD", "HTTP.REQ.METHOD", ValueKind::Method),
    qualifier("REQ.HTTP.URL", "HTTP.REQ.URL", ValueKind::Text),
    qualifier("REQ.HTTP.URLQUERY", "HTTP.REQ.URL.QUERY", ValueKind::Text),
    qualifier("REQ.HTTP.URLLEN", "HTTP.REQ.URL.LENGTH", ValueKind::Number),
    qualifier("REQ.HTTP.URLQUERYLEN", "HTTP.REQ.URL.QUERY.LENGTH", ValueKind::Number),
    Qualifier {
        classic: "REQ.HTTP.HEADER",
        advanced: "HTTP.REQ.HEADER",
        kind: ValueKind::Text,
        takes_name: true,
    },
    Qualifier {
        classic: "RES.HTTP.HEADER",
        advanced: "HTTP.RES.HEADER",
        kind: ValueKind::Text,
        takes_name: true,
    },
    qualifier("RES.HTTP.STATUSCODE", "HTTP.RES.STATUS", ValueKind::Number),
    qualifier("REQ.IP.SOURCEIP", "CLIENT.IP.SRC", ValueKind::Address),
    qualifier("REQ.IP.DESTIP", "CLIENT.IP.DST", ValueKind::Address),
    qualifier("RES.IP.SOURCEIP", "SERVER.IP.SRC", ValueKind::Address),
    qualifier("RES.IP.DESTIP", "SERVER.IP.DST", ValueKind::Address),
    qualifier("REQ.TCP.SOURCEPORT", "CLIENT.TCP.SRCPORT", ValueKind::Number),
    qualifier("REQ.TCP.DESTPORT", "CLIENT.TCP.DSTPORT", ValueKind::Number),
    qualifier("RES.TCP.SOURCEPORT", "SERVER.TCP.SRCPORT", ValueKind::Number),
    qualifier("RES.TCP.DESTPORT", "SERVER.TCP.DSTPORT", ValueKind::Number),
    qualifier("REQ.SSL.CLIENT.CERT", "CLIENT.SSL.CLIENT_CERT", ValueKind::Presence),
    qualifier(
        "REQ.SSL.CLIENT.CERT.SUBJECT",
        "CLIENT.SSL.CLIENT_CERT.SUBJECT",
        ValueKind::Text,
    ),
    qualifier(
        "REQ.SSL.CLIENT.CERT.ISSUER",
        "CLIENT.SSL.CLIENT_CERT.ISSUER",
        ValueKind::Text,
    ),
    qualifier("REQ.SSL.CLIENT.CIPHER.BITS", "CLIENT.SSL.CIPHER_BITS", ValueKind::Number),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Contains,
    NotContains,
    Exists,
    NotExists,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Operator {
    fn parse(word: &str) -> Option<Self> {
        let op = match word.to_ascii_uppercase().as_str() {
            "==" | "EQ" => Self::Eq,
            "!=" | "NE" => Self::Ne,
            "CONTAINS" => Self::Contains,
            "NOTCONTAINS" => Self::NotContains,
            "EXISTS" => Self::Exists,
            "NOTEXISTS" => Self::NotExists,
            ">" | "GT" => Self::Gt,
            "<" | "LT" => Self::Lt,
            ">=" | "GE" => Self::Ge,
            "<=" | "LE" => Self::Le,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Word(String),
    Quoted(String),
}

/// Split classic text into tokens. `None` on an unterminated quote.
fn lex(expr: &str) -> Option<Vec<Tok>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            '&' if next == Some('&') => {
                toks.push(Tok::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                toks.push(Tok::Or);
                i += 2;
            }
            '!' if next != Some('=') => {
                toks.push(Tok::Not);
                i += 1;
            }
            '"' | '\'' => {
                i += 1;
                let mut text = String::new();
                loop {
                    let ch = *chars.get(i)?;
                    i += 1;
                    if ch == c {
                        break;
                    }
                    if ch == '\\' && c == '"' {
                        if let Some(&escaped @ ('"' | '\\')) = chars.get(i) {
                            text.push(escaped);
                            i += 1;
                            continue;
                        }
                    }
                    text.push(ch);
                }
                toks.push(Tok::Quoted(text));
            }
            _ => {
                let start = i;
                i += 1;
                while i < chars.len() && !ends_word(&chars, i) {
                    i += 1;
                }
                toks.push(Tok::Word(chars[start..i].iter().collect()));
            }
        }
    }

    Some(toks)
}

fn ends_word(chars: &[char], i: usize) -> bool {
    let next = chars.get(i + 1).copied();
    match chars[i] {
        c if c.is_whitespace() => true,
        '(' | ')' => true,
        '&' => next == Some('&'),
        '|' => next == Some('|'),
        _ => false,
    }
}

fn is_classic_qualifier(upper: &str) -> bool {
    upper.starts_with("REQ.") || upper.starts_with("RES.")
}

fn is_security_qualifier(upper: &str) -> bool {
    SECURITY_PREFIXES.iter().any(|p| upper.starts_with(p))
}

/// Quote text as an advanced string literal.
pub fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next @ ('"' | '\\')) = chars.peek() {
                out.push(next);
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Untranslatable,
    Security,
}

type Parsed = Result<String, Failure>;

struct ClassicParser<'a> {
    toks: &'a [Tok],
    pos: usize,
}

impl<'a> ClassicParser<'a> {
    fn new(toks: &'a [Tok]) -> Self {
        Self { toks, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn peek(&self) -> Option<&'a Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Tok> {
        let tok = self.toks.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Tok) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expression(&mut self) -> Parsed {
        let mut out = self.conjunction()?;
        while self.eat(&Tok::Or) {
            let rhs = self.conjunction()?;
            out = format!("{out} || {rhs}");
        }
        Ok(out)
    }

    fn conjunction(&mut self) -> Parsed {
        let mut out = self.unary()?;
        while self.eat(&Tok::And) {
            let rhs = self.unary()?;
            out = format!("{out} && {rhs}");
        }
        Ok(out)
    }

    fn unary(&mut self) -> Parsed {
        match self.bump() {
            Some(Tok::Not) => Ok(format!("!{}", self.unary()?)),
            Some(Tok::LParen) => {
                let inner = self.expression()?;
                if !self.eat(&Tok::RParen) {
                    return Err(Failure::Untranslatable);
                }
                Ok(format!("({inner})"))
            }
            Some(Tok::Word(word)) => self.term(word),
            _ => Err(Failure::Untranslatable),
        }
    }

    fn term(&mut self, word: &str) -> Parsed {
        let upper = word.to_ascii_uppercase();
        if is_security_qualifier(&upper) {
            return Err(Failure::Security);
        }
        if !is_classic_qualifier(&upper) {
            return Ok(word.to_string());
        }

        let qualifier = QUALIFIERS
            .iter()
            .find(|q| q.classic == upper)
            .ok_or(Failure::Untranslatable)?;
        let mut base = qualifier.advanced.to_string();
        if qualifier.takes_name {
            let name = self.value()?;
            base = format!("{base}({})", string_literal(&name));
        }
        let op = match self.bump() {
            Some(Tok::Word(op)) => Operator::parse(op).ok_or(Failure::Untranslatable)?,
            _ => return Err(Failure::Untranslatable),
        };
        self.comparison(qualifier, base, op)
    }

    fn comparison(&mut self, qualifier: &Qualifier, base: String, op: Operator) -> Parsed {
        if matches!(op, Operator::Exists | Operator::NotExists) {
            if !(qualifier.takes_name || qualifier.kind == ValueKind::Presence) {
                return Err(Failure::Untranslatable);
            }
            let suffix = if op == Operator::Exists {
                "EXISTS"
            } else {
                "EXISTS.NOT"
            };
            return Ok(format!("{base}.{suffix}"));
        }

        let value = self.value()?;
        let rendered = match qualifier.kind {
            ValueKind::Presence => return Err(Failure::Untranslatable),
            ValueKind::Text => {
                let lit = string_literal(&value);
                match op {
                    Operator::Eq => format!("EQ({lit})"),
                    Operator::Ne => format!("EQ({lit}).NOT"),
                    Operator::Contains => format!("CONTAINS({lit})"),
                    Operator::NotContains => format!("CONTAINS({lit}).NOT"),
                    _ => return Err(Failure::Untranslatable),
                }
            }
            ValueKind::Method => {
                if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(Failure::Untranslatable);
                }
                let method = value.to_ascii_uppercase();
                match op {
                    Operator::Eq => format!("EQ({method})"),
                    Operator::Ne => format!("EQ({method}).NOT"),
                    _ => return Err(Failure::Untranslatable),
                }
            }
            ValueKind::Number => {
                let n: u64 = value.parse().map_err(|_| Failure::Untranslatable)?;
                match op {
                    Operator::Eq => format!("EQ({n})"),
                    Operator::Ne => format!("NE({n})"),
                    Operator::Gt => format!("GT({n})"),
                    Operator::Lt => format!("LT({n})"),
                    Operator::Ge => format!("GE({n})"),
                    Operator::Le => format!("LE({n})"),
                    _ => return Err(Failure::Untranslatable),
                }
            }
            ValueKind::Address => {
                let ip: Ipv4Addr = value.parse().map_err(|_| Failure::Untranslatable)?;
                let test = match self.netmask()? {
                    Some(mask) => {
                        let bits = u32::from(mask);
                        let len = bits.leading_ones();
                        if bits.count_ones() != len {
                            return Err(Failure::Untranslatable);
                        }
                        let network = Ipv4Addr::from(u32::from(ip) & bits);
                        format!("IN_SUBNET({network}/{len})")
                    }
                    None => format!("EQ({ip})"),
                };
                match op {
                    Operator::Eq => test,
                    Operator::Ne => format!("{test}.NOT"),
                    _ => return Err(Failure::Untranslatable),
                }
            }
        };
        Ok(format!("{base}.{rendered}"))
    }

    fn netmask(&mut self) -> Result<Option<Ipv4Addr>, Failure> {
        match self.peek() {
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("-netmask") => {
                self.pos += 1;
                let mask = self.value()?;
                mask.parse()
                    .map(Some)
                    .map_err(|_| Failure::Untranslatable)
            }
            _ => Ok(None),
        }
    }

    fn value(&mut self) -> Parsed {
        match self.bump() {
            Some(Tok::Word(text)) | Some(Tok::Quoted(text)) => Ok(text.clone()),
            _ => Err(Failure::Untranslatable),
        }
    }
}

/// Rule-table translator for the classic qualifiers listed in [`QUALIFIERS`].
#[derive(Debug, Clone)]
pub struct RuleTranslator {
    eval_classic: Regex,
    short_prefix: Regex,
    classic_marker: Regex,
}

impl RuleTranslator {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            eval_classic: Regex::new(r#"(?i)SYS\.EVAL_CLASSIC_EXPR\(\s*"((?:[^"\\]|\\.)*)"\s*\)"#)?,
            short_prefix: Regex::new(r"(^|[^A-Za-z0-9_.])([QqSs])\.")?,
            classic_marker: Regex::new(r"(?i)(?:^|[\s(!&|])(?:REQ|RES)\.")?,
        })
    }

    /// Expand `Q.` and `S.` outside string literals.
    fn expand_short_prefixes(&self, expr: &str) -> String {
        let mut out = String::with_capacity(expr.len() + 16);
        for (is_literal, segment) in literal_segments(expr) {
            if is_literal {
                out.push_str(segment);
                continue;
            }
            let expanded = self.short_prefix.replace_all(segment, |caps: &Captures| {
                let full = if caps[2].eq_ignore_ascii_case("q") {
                    "HTTP.REQ."
                } else {
                    "HTTP.RES."
                };
                format!("{}{full}", &caps[1])
            });
            out.push_str(&expanded);
        }
        out
    }
}

impl ExprTranslator for RuleTranslator {
    fn translate_classic(&self, expr: &str, ignore_security: bool) -> Translation {
        let Some(tokens) = lex(expr) else {
            return if self.classic_marker.is_match(expr) {
                Translation::Untranslatable
            } else {
                Translation::Converted(expr.to_string())
            };
        };

        let words: Vec<String> = tokens
            .iter()
            .filter_map(|t| match t {
                Tok::Word(w) => Some(w.to_ascii_uppercase()),
                _ => None,
            })
            .collect();
        if words.iter().any(|w| is_security_qualifier(w)) {
            return if ignore_security {
                Translation::SecurityExpression
            } else {
                Translation::Untranslatable
            };
        }
        if !words.iter().any(|w| is_classic_qualifier(w)) {
            return Translation::Converted(expr.to_string());
        }

        let mut parser = ClassicParser::new(&tokens);
        match parser.expression() {
            Ok(out) if parser.at_end() => Translation::Converted(out),
            Err(Failure::Security) if ignore_security => Translation::SecurityExpression,
            _ => Translation::Untranslatable,
        }
    }

    fn translate_advanced(&self, expr: &str) -> Option<String> {
        let mut failed = false;
        let evaluated = self.eval_classic.replace_all(expr, |caps: &Captures| {
            match self.translate_classic(&unescape(&caps[1]), false) {
                Translation::Converted(text) => format!("({text})"),
                _ => {
                    failed = true;
                    caps[0].to_string()
                }
            }
        });
        if failed {
            return None;
        }
        Some(self.expand_short_prefixes(&evaluated))
    }
}

/// Split text into alternating code and `"..."` literal segments.
fn literal_segments(expr: &str) -> Vec<(bool, &str)> {
    let bytes = expr.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'"' {
            i += 1;
            continue;
        }
        if start < i {
            segments.push((false, &expr[start..i]));
        }
        let open = i;
        i += 1;
        while i < bytes.len() && bytes[i] != b'"' {
            i += if bytes[i] == b'\\' { 2 } else { 1 };
        }
        i = (i + 1).min(bytes.len());
        segments.push((true, &expr[open..i]));
        start = i;
    }
    if start < bytes.len() {
        segments.push((false, &expr[start..]));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::{literal_segments, ExprTranslator, RuleTranslator, Translation};

    fn translator() -> RuleTranslator {
        RuleTranslator::new().expect("patterns compile")
    }

    fn classic(expr: &str) -> Translation {
        translator().translate_classic(expr, false)
    }

    fn converted(text: &str) -> Translation {
        Translation::Converted(text.to_string())
    }

    #[test]
    fn translates_http_qualifiers() {
        assert_eq!(
            classic("REQ.HTTP.URL CONTAINS /img"),
            converted(r#"HTTP.REQ.URL.CONTAINS("/img")"#)
        );
        assert_eq!(
            classic("REQ.HTTP.METHOD == get && e_img"),
            converted("HTTP.REQ.METHOD.EQ(GET) && e_img")
        );
        assert_eq!(
            classic("REQ.HTTP.HEADER Cookie EXISTS"),
            converted(r#"HTTP.REQ.HEADER("Cookie").EXISTS"#)
        );
        assert_eq!(
            classic(r#"RES.HTTP.HEADER Server != 'a "b"'"#),
            converted(r#"HTTP.RES.HEADER("Server").EQ("a \"b\"").NOT"#)
        );
    }

    #[test]
    fn keeps_boolean_structure() {
        assert_eq!(
            classic("!(REQ.TCP.DESTPORT == 80 || REQ.HTTP.URLLEN > 100)"),
            converted("!(CLIENT.TCP.DSTPORT.EQ(80) || HTTP.REQ.URL.LENGTH.GT(100))")
        );
    }

    #[test]
    fn netmask_becomes_subnet_test() {
        assert_eq!(
            classic("REQ.IP.SOURCEIP == 10.1.2.3 -netmask 255.255.255.0"),
            converted("CLIENT.IP.SRC.IN_SUBNET(10.1.2.0/24)")
        );
        assert_eq!(
            classic("REQ.IP.DESTIP != 10.0.0.1"),
            converted("CLIENT.IP.DST.EQ(10.0.0.1).NOT")
        );
        assert_eq!(
            classic("REQ.IP.SOURCEIP == 10.1.2.3 -netmask 255.0.255.0"),
            Translation::Untranslatable
        );
    }

    #[test]
    fn advanced_text_is_unchanged() {
        let expr = r#"HTTP.REQ.URL.CONTAINS("REQ.x") && e_img"#;
        assert_eq!(classic(expr), converted(expr));
        assert_eq!(classic("ns_true"), converted("ns_true"));
    }

    #[test]
    fn unknown_qualifiers_are_untranslatable() {
        assert_eq!(classic("REQ.HTTP.BOGUS == x"), Translation::Untranslatable);
        assert_eq!(classic("REQ.HTTP.URL =="), Translation::Untranslatable);
        assert_eq!(classic("REQ.HTTP.URLLEN > big"), Translation::Untranslatable);
    }

    #[test]
    fn security_qualifiers_need_manual_work() {
        let expr = "CLIENT.APPLICATION.PROCESS(a.exe) EXISTS";
        assert_eq!(
            translator().translate_classic(expr, true),
            Translation::SecurityExpression
        );
        assert_eq!(classic(expr), Translation::Untranslatable);
    }

    #[test]
    fn advanced_cleanup_expands_prefixes_and_eval() {
        let out = translator()
            .translate_advanced(r#"Q.URL.CONTAINS("Q.x") && SYS.EVAL_CLASSIC_EXPR("REQ.HTTP.URL == /a")"#)
            .expect("translate");
        assert_eq!(
            out,
            r#"HTTP.REQ.URL.CONTAINS("Q.x") && (HTTP.REQ.URL.EQ("/a"))"#
        );
        assert_eq!(
            translator().translate_advanced("s.STATUS.EQ(200)").as_deref(),
            Some("HTTP.RES.STATUS.EQ(200)")
        );
        assert_eq!(
            translator().translate_advanced(r#"SYS.EVAL_CLASSIC_EXPR("REQ.HTTP.BOGUS == 1")"#),
            None
        );
    }

    #[test]
    fn segments_split_on_literals() {
        let segments = literal_segments(r#"A("x\"y") B"#);
        assert_eq!(
            segments,
            vec![(false, "A("), (true, r#""x\"y""#), (false, ") B")]
        );
    }
}
