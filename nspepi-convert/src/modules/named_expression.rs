use ns_config_core::{ArgRef, CommandTree};

use super::{FeatureModule, Handled, ModuleId};
use crate::context::ConversionContext;
use crate::diagnostics::codes;
use crate::error::ConvertError;
use crate::expr::{advanced_name, is_valid_expression_name};

const DEFINITION: ArgRef = ArgRef::Positional(1);

/// `add policy expression`.
///
/// Classic named expressions stay as they are (classic policies still
/// reference them). When an advanced expression references one, an advanced
/// copy named `nspepi_adv_<name>` is written right after it. Whether a copy
/// is needed is decided in the collect pass: policies record the names they
/// reference and the in-use set is closed over the reference graph before
/// the convert pass starts.
pub struct NamedExpression;

impl FeatureModule for NamedExpression {
    fn id(&self) -> ModuleId {
        ModuleId::NamedExpression
    }

    fn commands(&self) -> &'static [&'static str] {
        &["add policy expression"]
    }

    fn collect(
        &mut self,
        ctx: &mut ConversionContext,
        tree: &CommandTree,
    ) -> Result<(), ConvertError> {
        let (Some(name), Some(definition)) = (tree.positional_value(0), tree.positional_value(1))
        else {
            return Ok(());
        };
        let lower = name.to_lowercase();
        if !is_valid_expression_name(&lower) {
            ctx.expressions.add_invalid_name(lower.clone());
        }

        let mut probe = tree.clone();
        let references = ctx.convert_expression(&mut probe, &DEFINITION, true);
        if probe.upgraded {
            ctx.expressions.add_classic_entity(lower.clone());
            ctx.expressions
                .add_policy_entity(advanced_name(name).to_lowercase());
            ctx.expressions.register(&lower, definition, references);
        }
        Ok(())
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        let (Some(name), Some(definition)) = (
            tree.positional_value(0).map(str::to_string),
            tree.positional_value(1).map(str::to_string),
        ) else {
            return Ok(Handled::tree(tree));
        };
        let lower = name.to_lowercase();

        if ctx.expressions.is_builtin_expression(&lower) {
            return Ok(Handled::suppressed());
        }
        ctx.expressions.define(&lower, &definition);

        if tree.keyword_exists("clientSecurityMessage")
            || !ctx.rewriter().security_references(&definition).is_empty()
        {
            ctx.expressions
                .add_security_expression(&lower, tree.to_string());
            ctx.expressions.add_classic_entity(lower);
            return Ok(Handled::tree(tree));
        }

        if ctx.expressions.is_policy_entity(&lower) {
            ctx.diagnostics.error(
                codes::NAME_CONFLICT,
                tree.lineno,
                format!("Name {name} is already in use"),
            );
        }
        if ctx.expressions.is_reserved(&lower) {
            ctx.diagnostics.error(
                codes::INVALID_NAME,
                tree.lineno,
                format!(
                    "Expression name {name} is invalid for advanced expression: names must begin with an ASCII alphabetic character or underscore and must contain only ASCII alphanumerics or underscores and shouldn't be name of another policy entity; words reserved for policy use may not be used; underscores will be substituted for any invalid characters in corresponding advanced name"
                ),
            );
        }

        let mut converted = tree.clone();
        ctx.convert_expression(&mut converted, &DEFINITION, true);
        let mut out = vec![if converted.adv_upgraded {
            converted.clone()
        } else {
            tree.clone()
        }];

        if converted.upgraded {
            if ctx.expressions.is_in_use(&lower) {
                let adv_name = advanced_name(&name);
                let mut copy = converted;
                copy.set_arg(&ArgRef::Positional(0), adv_name.clone());
                copy.remove_keyword("devno");
                ctx.expressions.add_policy_entity(adv_name.to_lowercase());
                out.push(copy);
            }
            ctx.expressions.add_classic_entity(lower);
        } else if converted.has_security_expr {
            ctx.expressions
                .add_security_expression(&lower, tree.to_string());
            ctx.expressions.add_classic_entity(lower);
        } else {
            ctx.expressions.add_policy_entity(lower);
        }

        Ok(Handled::Emit(
            out.into_iter().map(crate::output::Output::Tree).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::pipeline::convert_str;

    #[test]
    fn unreferenced_classic_expression_is_kept_without_copy() {
        let outcome = convert_str("add policy expression e1 \"REQ.HTTP.URL == /a\"\n")
            .expect("convert");
        assert_eq!(outcome.lines, vec!["add policy expression e1 \"REQ.HTTP.URL == /a\""]);
    }

    #[test]
    fn builtin_definitions_are_dropped() {
        let outcome = convert_str("add policy expression ns_true \"REQ.HTTP.URL == /\"\n")
            .expect("convert");
        assert!(outcome.lines.is_empty());
    }

    #[test]
    fn advanced_expression_is_an_entity() {
        let input = "add policy expression adv1 \"HTTP.REQ.URL.EQ(\\\"/a\\\")\"\n\
                     add policy expression adv1 \"HTTP.REQ.IS_VALID\"\n";
        let outcome = convert_str(input).expect("convert");
        assert_eq!(outcome.lines.len(), 2);
        assert_eq!(outcome.diagnostics[0].code, "name_conflict");
    }

    #[test]
    fn reserved_names_are_reported() {
        let outcome = convert_str("add policy expression http \"REQ.HTTP.URL == /a\"\n")
            .expect("convert");
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| d.code == "invalid_name"));
    }

    #[test]
    fn client_security_expressions_are_reported_once() {
        let input = "add policy expression csec \"CLIENT.APPLICATION.PROCESS(a.exe) EXISTS\" -clientSecurityMessage blocked\n\
                     add cs policy p1 -rule \"csec && REQ.HTTP.URL == /a\"\n\
                     add cs policy p2 -rule csec\n";
        let outcome = convert_str(input).expect("convert");
        let security: Vec<_> = outcome
            .diagnostics
            .iter()
            .filter(|d| d.code == "security_expression")
            .collect();
        assert_eq!(security.len(), 1);
        assert!(security[0].message.contains("add policy expression csec"));
    }
}
