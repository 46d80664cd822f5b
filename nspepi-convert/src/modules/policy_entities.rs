use ns_config_core::{ArgRef, CommandTree};

use super::{FeatureModule, Handled, ModuleId};
use crate::context::ConversionContext;
use crate::diagnostics::codes;
use crate::error::ConvertError;

const CALLOUT_EXPRESSIONS: &[&str] = &[
    "hostExpr",
    "urlStemExpr",
    "headers",
    "parameters",
    "bodyExpr",
    "fullReqExpr",
    "resultExpr",
];

/// Named entities that advanced expressions may reference: pattern sets,
/// data sets, string maps, variables, keys and HTTP callouts.
pub struct PolicyEntities;

impl FeatureModule for PolicyEntities {
    fn id(&self) -> ModuleId {
        ModuleId::PolicyEntities
    }

    fn commands(&self) -> &'static [&'static str] {
        &[
            "add policy patset",
            "add policy dataset",
            "add policy stringmap",
            "add policy httpcallout",
            "add ns variable",
            "add ns encryptionkey",
            "add ns hmackey",
        ]
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        let Some(name) = tree.positional_value(0).map(str::to_lowercase) else {
            return Ok(Handled::tree(tree));
        };
        if tree.key() != "add policy httpcallout" {
            ctx.expressions.add_policy_entity(name);
            return Ok(Handled::tree(tree));
        }

        if ctx.expressions.is_classic_entity(&name) {
            ctx.diagnostics.error(
                codes::NAME_CONFLICT,
                tree.lineno,
                format!(
                    "HTTP callout name {} is conflicting with named expression entity name, please resolve the conflict.",
                    tree.positional_value(0).unwrap_or_default()
                ),
            );
        } else {
            ctx.expressions.add_policy_entity(name);
        }
        let slots: Vec<ArgRef> = CALLOUT_EXPRESSIONS
            .iter()
            .map(|k| ArgRef::keyword(*k))
            .collect();
        Ok(Handled::tree(ctx.convert_advanced_slots(tree, &slots)))
    }
}
