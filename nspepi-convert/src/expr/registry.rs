use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};

use crate::builtins::BuiltinTables;

/// A named expression that relies on client security messages.
#[derive(Debug, Clone)]
struct SecurityExpression {
    command: String,
    reported: bool,
}

/// Everything the converter knows about expression names.
///
/// All keys are lowercase. Classic entities are names that only classic
/// expressions may reference; policy entities are names an advanced
/// expression may reference (advanced named expressions, pattern sets,
/// variables, converted copies and advanced built-ins).
#[derive(Debug, Default)]
pub struct ExpressionRegistry {
    classic_entities: HashSet<String>,
    policy_entities: HashSet<String>,
    /// classic built-in → advanced built-in, original spelling of the value
    builtin_map: HashMap<String, String>,
    builtin_expressions: HashSet<String>,
    reserved_words: HashSet<String>,
    definitions: HashMap<String, String>,
    references: IndexMap<String, Vec<String>>,
    in_use: IndexSet<String>,
    invalid_names: IndexSet<String>,
    security: IndexMap<String, SecurityExpression>,
}

impl ExpressionRegistry {
    pub fn new(builtins: &BuiltinTables) -> Self {
        let mut registry = Self::default();
        for mapping in &builtins.named_expressions {
            let classic = mapping.classic.to_lowercase();
            registry.classic_entities.insert(classic.clone());
            registry
                .policy_entities
                .insert(mapping.advanced.to_lowercase());
            registry
                .builtin_map
                .insert(classic, mapping.advanced.clone());
        }
        registry.builtin_expressions = builtins
            .builtin_expressions
            .iter()
            .map(|n| n.to_lowercase())
            .collect();
        registry.reserved_words = builtins
            .reserved_words
            .iter()
            .map(|n| n.to_lowercase())
            .collect();
        registry
    }

    /// Advanced replacement of a classic built-in.
    pub fn builtin_advanced(&self, lower: &str) -> Option<&str> {
        self.builtin_map.get(lower).map(String::as_str)
    }

    pub fn is_builtin_expression(&self, lower: &str) -> bool {
        self.builtin_expressions.contains(lower)
    }

    pub fn is_reserved(&self, lower: &str) -> bool {
        self.reserved_words.contains(lower)
    }

    pub fn add_classic_entity(&mut self, lower: impl Into<String>) {
        self.classic_entities.insert(lower.into());
    }

    pub fn add_policy_entity(&mut self, lower: impl Into<String>) {
        self.policy_entities.insert(lower.into());
    }

    pub fn is_classic_entity(&self, lower: &str) -> bool {
        self.classic_entities.contains(lower)
    }

    pub fn is_policy_entity(&self, lower: &str) -> bool {
        self.policy_entities.contains(lower)
    }

    /// Record the raw definition of a named expression.
    pub fn define(&mut self, lower: &str, definition: &str) {
        self.definitions
            .insert(lower.to_string(), definition.to_string());
    }

    pub fn definition(&self, lower: &str) -> Option<&str> {
        self.definitions.get(lower).map(String::as_str)
    }

    /// Register a converted named expression and the classic names its
    /// definition references.
    pub fn register(&mut self, lower: &str, definition: &str, referenced: Vec<String>) {
        self.define(lower, definition);
        let edges = self.references.entry(lower.to_string()).or_default();
        for name in referenced {
            if !edges.contains(&name) {
                edges.push(name);
            }
        }
    }

    pub fn references_of(&self, lower: &str) -> &[String] {
        self.references.get(lower).map_or(&[], Vec::as_slice)
    }

    pub fn mark_in_use<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.in_use.insert(name.as_ref().to_lowercase());
        }
    }

    pub fn is_in_use(&self, lower: &str) -> bool {
        self.in_use.contains(lower)
    }

    /// Add every expression reachable from an in-use expression.
    ///
    /// Iterative walk with a visited set; reference cycles terminate.
    pub fn expand_in_use(&mut self) {
        let mut stack: Vec<String> = self.in_use.iter().cloned().collect();
        while let Some(name) = stack.pop() {
            for next in self.references_of(&name).to_vec() {
                if self.in_use.insert(next.clone()) {
                    stack.push(next);
                }
            }
        }
    }

    pub fn add_invalid_name(&mut self, lower: impl Into<String>) {
        self.invalid_names.insert(lower.into());
    }

    pub fn invalid_names(&self) -> impl Iterator<Item = &str> {
        self.invalid_names.iter().map(String::as_str)
    }

    pub fn add_security_expression(&mut self, lower: &str, command: String) {
        self.security
            .entry(lower.to_string())
            .or_insert(SecurityExpression {
                command,
                reported: false,
            });
    }

    pub fn is_security_expression(&self, lower: &str) -> bool {
        self.security.contains_key(lower)
    }

    /// The command defining a security expression, the first time it is
    /// asked for. Later calls return `None`.
    pub fn take_unreported_security(&mut self, lower: &str) -> Option<String> {
        let entry = self.security.get_mut(lower)?;
        if entry.reported {
            return None;
        }
        entry.reported = true;
        Some(entry.command.clone())
    }
}
