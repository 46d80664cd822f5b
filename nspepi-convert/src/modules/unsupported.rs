use ns_config_core::CommandTree;

use super::{FeatureModule, Handled, ModuleId};
use crate::context::ConversionContext;
use crate::diagnostics::codes;
use crate::error::ConvertError;

/// Features with no advanced equivalent. Their commands are reported and
/// written unchanged.
pub struct Unsupported;

fn feature_name(key: &str) -> &'static str {
    match key {
        "add sc policy" | "set sc parameter" => "SureConnect",
        "add pq policy" => "PriorityQueuing",
        _ => "HDoSP",
    }
}

impl FeatureModule for Unsupported {
    fn id(&self) -> ModuleId {
        ModuleId::Unsupported
    }

    fn commands(&self) -> &'static [&'static str] {
        &[
            "add sc policy",
            "set sc parameter",
            "add pq policy",
            "add dos policy",
        ]
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        ctx.diagnostics.error(
            codes::UNSUPPORTED_FEATURE,
            tree.lineno,
            format!(
                "{} feature command [{tree}] conversion is not supported, please do the conversion manually",
                feature_name(&tree.key())
            ),
        );
        Ok(Handled::tree(tree))
    }
}
