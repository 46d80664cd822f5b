use super::names::advanced_name;
use super::registry::ExpressionRegistry;
use super::scan::{identifiers, operands};
use super::translator::{ExprTranslator, Translation};

/// Outcome of rewriting one expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Advanced text plus the lowercased classic names it references.
    Rewritten {
        text: String,
        references: Vec<String>,
    },
    /// A translation failure or a reference with no advanced counterpart.
    Unresolved,
    /// The text itself uses client security qualifiers.
    SecurityExpression,
    /// The text references named expressions that use client security
    /// qualifiers.
    SecurityReference(Vec<String>),
}

#[derive(Debug)]
struct Substitution {
    start: usize,
    end: usize,
    classic: String,
    advanced: String,
}

/// Translates expression text and replaces named expression references with
/// their advanced names.
pub struct Rewriter<'a> {
    registry: &'a ExpressionRegistry,
    translator: &'a dyn ExprTranslator,
}

impl<'a> Rewriter<'a> {
    pub fn new(registry: &'a ExpressionRegistry, translator: &'a dyn ExprTranslator) -> Self {
        Self {
            registry,
            translator,
        }
    }

    /// Advanced text, or `None` when the expression cannot be converted.
    pub fn rewrite(&self, expr: &str, ignore_security: bool) -> Option<String> {
        match self.rewrite_detailed(expr, ignore_security) {
            RewriteOutcome::Rewritten { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn rewrite_detailed(&self, expr: &str, ignore_security: bool) -> RewriteOutcome {
        let security = self.security_references(expr);
        if !security.is_empty() {
            return RewriteOutcome::SecurityReference(security);
        }

        let translated = match self.translator.translate_classic(expr, ignore_security) {
            Translation::Converted(text) => text,
            Translation::Untranslatable => return RewriteOutcome::Unresolved,
            Translation::SecurityExpression => return RewriteOutcome::SecurityExpression,
        };

        let Some(mut subs) = self.substitutions(&translated) else {
            return RewriteOutcome::Unresolved;
        };
        subs.sort_by_key(|s| s.start);
        subs.dedup_by_key(|s| s.start);
        let mut kept: Vec<Substitution> = Vec::with_capacity(subs.len());
        for sub in subs {
            if kept.last().is_some_and(|prev| sub.start < prev.end) {
                continue;
            }
            kept.push(sub);
        }

        let mut text = translated;
        let mut references = Vec::new();
        for sub in kept.iter().rev() {
            text.replace_range(sub.start..sub.end, &sub.advanced);
        }
        for sub in kept {
            if !references.contains(&sub.classic) {
                references.push(sub.classic);
            }
        }
        RewriteOutcome::Rewritten { text, references }
    }

    /// Clean up advanced text (short prefixes, embedded classic text).
    pub fn rewrite_advanced(&self, expr: &str) -> Option<String> {
        self.translator.translate_advanced(expr)
    }

    /// Lowercased names of security expressions referenced by `expr`.
    pub fn security_references(&self, expr: &str) -> Vec<String> {
        let mut found = Vec::new();
        for ident in identifiers(expr) {
            let lower = ident.text.to_lowercase();
            if self.registry.is_security_expression(&lower) && !found.contains(&lower) {
                found.push(lower);
            }
        }
        found
    }

    /// Every reference to replace, or `None` if one cannot be resolved.
    fn substitutions(&self, text: &str) -> Option<Vec<Substitution>> {
        let mut subs = Vec::new();

        for ident in identifiers(text) {
            let lower = ident.text.to_lowercase();
            let advanced = match self.registry.builtin_advanced(&lower) {
                Some(builtin) => {
                    if !self.registry.is_policy_entity(&builtin.to_lowercase()) {
                        continue;
                    }
                    builtin.to_string()
                }
                None => {
                    let advanced = advanced_name(ident.text);
                    if self.registry.is_policy_entity(&advanced.to_lowercase()) {
                        advanced
                    } else if self.registry.is_classic_entity(&lower) {
                        return None;
                    } else {
                        continue;
                    }
                }
            };
            subs.push(Substitution {
                start: ident.start,
                end: ident.end(),
                classic: lower,
                advanced,
            });
        }

        let invalid: Vec<&str> = self.registry.invalid_names().collect();
        if !invalid.is_empty() {
            for operand in operands(text) {
                let lower = operand.text.to_lowercase();
                if invalid.contains(&lower.as_str()) {
                    subs.push(Substitution {
                        start: operand.start,
                        end: operand.start + operand.text.len(),
                        classic: lower,
                        advanced: advanced_name(operand.text),
                    });
                }
            }
        }

        Some(subs)
    }
}
