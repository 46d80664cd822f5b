use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::writer::render_value;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Value {
    /// Unescaped value text.
    pub text: String,
    /// Whether the value was quoted in the source line (or must be quoted on output).
    pub quoted: bool,
}

impl Value {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&render_value(&self.text, self.quoted))
    }
}

/// A `-name value...` keyword parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Keyword {
    /// Keyword name without the leading dash, original spelling.
    pub name: String,
    pub values: Vec<Value>,
}

impl Keyword {
    /// Keyword names compare case-insensitively.
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn first(&self) -> Option<&str> {
        self.values.first().map(|v| v.text.as_str())
    }
}

/// Addresses one argument of a command: a positional index or a keyword name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ArgRef {
    Positional(usize),
    Keyword(String),
}

impl ArgRef {
    pub fn keyword(name: impl Into<String>) -> Self {
        Self::Keyword(name.into())
    }
}

impl Display for ArgRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positional(idx) => write!(f, "#{idx}"),
            Self::Keyword(name) => write!(f, "-{name}"),
        }
    }
}

/// One parsed configuration command.
///
/// Cloning is cheap enough to take per-pass copies; every structural edit marks
/// the tree `upgraded` so writers know the original line can no longer be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandTree {
    /// Verb, group and object type tokens (`add`, `cs`, `policy`), at most three.
    pub command_type: Vec<String>,
    pub positionals: Vec<Value>,
    pub keywords: Vec<Keyword>,
    /// Structurally changed or converted from the classic dialect.
    pub upgraded: bool,
    /// Advanced expression slots were cleaned up.
    pub adv_upgraded: bool,
    /// Carries an expression that has to be converted by hand.
    pub has_security_expr: bool,
    /// Source text without the trailing newline. Empty for synthesized commands.
    pub original_line: String,
    /// 1-based source line number, 0 for synthesized commands.
    pub lineno: usize,
}

impl CommandTree {
    /// Create an empty synthesized command.
    pub fn new(op: &str, group: &str, object_type: &str) -> Self {
        Self::with_type(
            [op, group, object_type]
                .iter()
                .filter(|t| !t.is_empty())
                .map(|t| t.to_string())
                .collect(),
        )
    }

    pub fn with_type(command_type: Vec<String>) -> Self {
        Self {
            command_type,
            positionals: Vec::new(),
            keywords: Vec::new(),
            upgraded: false,
            adv_upgraded: false,
            has_security_expr: false,
            original_line: String::new(),
            lineno: 0,
        }
    }

    pub fn op(&self) -> &str {
        self.type_token(0)
    }

    pub fn group(&self) -> &str {
        self.type_token(1)
    }

    pub fn object_type(&self) -> &str {
        self.type_token(2)
    }

    fn type_token(&self, idx: usize) -> &str {
        self.command_type.get(idx).map_or("", String::as_str)
    }

    /// Lowercase space-joined command type, e.g. `bind cr vserver`.
    pub fn key(&self) -> String {
        self.command_type.join(" ").to_lowercase()
    }

    pub fn is_modified(&self) -> bool {
        self.upgraded || self.adv_upgraded
    }

    pub fn set_upgraded(&mut self) {
        self.upgraded = true;
    }

    pub fn positional(&self, idx: usize) -> Option<&Value> {
        self.positionals.get(idx)
    }

    pub fn positional_value(&self, idx: usize) -> Option<&str> {
        self.positionals.get(idx).map(|v| v.text.as_str())
    }

    pub fn add_positional(&mut self, text: impl Into<String>) {
        self.positionals.push(Value::new(text));
        self.upgraded = true;
    }

    pub fn remove_positional(&mut self, idx: usize) -> Option<Value> {
        if idx >= self.positionals.len() {
            return None;
        }
        self.upgraded = true;
        Some(self.positionals.remove(idx))
    }

    pub fn keyword_exists(&self, name: &str) -> bool {
        self.keyword(name).is_some()
    }

    pub fn keyword(&self, name: &str) -> Option<&Keyword> {
        self.keywords.iter().find(|k| k.matches(name))
    }

    fn keyword_mut(&mut self, name: &str) -> Option<&mut Keyword> {
        self.keywords.iter_mut().find(|k| k.matches(name))
    }

    /// All values of a keyword, empty when it is absent.
    pub fn keyword_values(&self, name: &str) -> &[Value] {
        self.keyword(name).map_or(&[], |k| k.values.as_slice())
    }

    /// First value of a keyword.
    pub fn keyword_value(&self, name: &str) -> Option<&str> {
        self.keyword(name).and_then(Keyword::first)
    }

    /// Append a keyword with the given values.
    pub fn add_keyword<I, S>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.push(Keyword {
            name: name.into(),
            values: values.into_iter().map(Value::new).collect(),
        });
        self.upgraded = true;
    }

    pub fn remove_keyword(&mut self, name: &str) -> Option<Keyword> {
        let idx = self.keywords.iter().position(|k| k.matches(name))?;
        self.upgraded = true;
        Some(self.keywords.remove(idx))
    }

    /// Remove the `idx`th value of a keyword, keeping the keyword itself.
    pub fn remove_keyword_value(&mut self, name: &str, idx: usize) -> Option<Value> {
        let keyword = self.keyword_mut(name)?;
        if idx >= keyword.values.len() {
            return None;
        }
        let removed = keyword.values.remove(idx);
        self.upgraded = true;
        Some(removed)
    }

    /// First value stored in `arg`.
    pub fn arg(&self, arg: &ArgRef) -> Option<&str> {
        match arg {
            ArgRef::Positional(idx) => self.positional_value(*idx),
            ArgRef::Keyword(name) => self.keyword_value(name),
        }
    }

    /// Set `arg` to `text`, appending the positional or keyword when it is
    /// missing, and mark the tree upgraded.
    pub fn set_arg(&mut self, arg: &ArgRef, text: impl Into<String>) {
        let text = text.into();
        if !self.replace_arg(arg, text.clone()) {
            match arg {
                ArgRef::Positional(_) => self.positionals.push(Value::new(text)),
                ArgRef::Keyword(name) => self.keywords.push(Keyword {
                    name: name.clone(),
                    values: vec![Value::new(text)],
                }),
            }
        }
        self.upgraded = true;
    }

    /// Replace the text of an existing argument without touching the flags.
    /// Returns `false` when the argument does not exist.
    pub fn replace_arg(&mut self, arg: &ArgRef, text: impl Into<String>) -> bool {
        let slot = match arg {
            ArgRef::Positional(idx) => self.positionals.get_mut(*idx),
            ArgRef::Keyword(name) => self
                .keyword_mut(name)
                .and_then(|k| k.values.first_mut()),
        };
        match slot {
            Some(value) => {
                value.text = text.into();
                true
            }
            None => false,
        }
    }
}

impl Display for CommandTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_type.join(" "))?;
        for value in &self.positionals {
            write!(f, " {value}")?;
        }
        for keyword in &self.keywords {
            write!(f, " -{}", keyword.name)?;
            for value in &keyword.values {
                write!(f, " {value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ArgRef, CommandTree};

    #[test]
    fn keyword_lookup_ignores_case() {
        let mut tree = CommandTree::new("bind", "cs", "vserver");
        tree.add_keyword("policyName", ["p1"]);
        assert_eq!(tree.keyword_value("POLICYNAME"), Some("p1"));
        assert!(tree.keyword_exists("policyname"));
    }

    #[test]
    fn set_arg_replaces_or_appends() {
        let mut tree = CommandTree::new("bind", "rewrite", "global");
        tree.positionals.push(super::Value::new("pol"));
        tree.set_arg(&ArgRef::Positional(1), "100");
        tree.set_arg(&ArgRef::keyword("type"), "REQ_DEFAULT");
        tree.set_arg(&ArgRef::Positional(1), "200");

        assert_eq!(tree.positional_value(1), Some("200"));
        assert_eq!(tree.keyword_value("type"), Some("REQ_DEFAULT"));
        assert!(tree.upgraded);
        assert_eq!(tree.to_string(), "bind rewrite global pol 200 -type REQ_DEFAULT");
    }

    #[test]
    fn replace_arg_leaves_flags_alone() {
        let mut tree = CommandTree::new("add", "cs", "policy");
        tree.add_keyword("rule", ["ns_true"]);
        tree.upgraded = false;

        assert!(tree.replace_arg(&ArgRef::keyword("rule"), "true"));
        assert!(!tree.replace_arg(&ArgRef::keyword("action"), "x"));
        assert!(!tree.upgraded);
    }

    #[test]
    fn key_is_lowercase() {
        let tree = CommandTree::new("add", "policy", "expression");
        assert_eq!(tree.key(), "add policy expression");
        let tree = CommandTree::with_type(vec!["Set".into(), "NS".into(), "httpProfile".into()]);
        assert_eq!(tree.key(), "set ns httpprofile");
    }
}
