use ns_config_core::CommandTree;

use super::{FeatureModule, Handled, ModuleId};
use crate::context::ConversionContext;
use crate::diagnostics::codes;
use crate::error::ConvertError;

const UNSUPPORTED_FEATURES: &[&str] = &["SC", "PQ", "HDOSP"];

/// `enable ns feature`: content filtering is replaced by rewrite and
/// responder.
pub struct NsFeatures;

impl FeatureModule for NsFeatures {
    fn id(&self) -> ModuleId {
        ModuleId::NsFeatures
    }

    fn commands(&self) -> &'static [&'static str] {
        &["enable ns feature"]
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        let features: Vec<String> = tree
            .positionals
            .iter()
            .map(|v| v.text.to_uppercase())
            .collect();

        if features
            .iter()
            .any(|f| UNSUPPORTED_FEATURES.contains(&f.as_str()))
        {
            ctx.diagnostics.error(
                codes::UNSUPPORTED_FEATURE,
                tree.lineno,
                format!("Conversion of SC, PQ and HDOSP features are not supported in command [{tree}]"),
            );
            return Ok(Handled::tree(tree));
        }
        if !features.iter().any(|f| f == "CF") {
            return Ok(Handled::tree(tree));
        }

        let mut converted = CommandTree::with_type(tree.command_type.clone());
        converted.lineno = tree.lineno;
        for value in tree.positionals.iter().filter(|v| !v.text.eq_ignore_ascii_case("CF")) {
            converted.add_positional(value.text.clone());
        }
        for needed in ["REWRITE", "RESPONDER"] {
            if !features.iter().any(|f| f == needed) {
                converted.add_positional(needed);
            }
        }
        converted.keywords = tree.keywords;
        converted.set_upgraded();
        Ok(Handled::tree(converted))
    }
}
