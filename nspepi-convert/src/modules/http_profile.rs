use ns_config_core::{ArgRef, CommandTree};

use super::{FeatureModule, Handled, ModuleId};
use crate::context::ConversionContext;
use crate::error::ConvertError;

/// HTTP profiles: SPDY settings become HTTP/2 and the client IP header
/// expression gets advanced cleanup.
pub struct HttpProfile;

impl FeatureModule for HttpProfile {
    fn id(&self) -> ModuleId {
        ModuleId::HttpProfile
    }

    fn commands(&self) -> &'static [&'static str] {
        &["add ns httpprofile", "set ns httpprofile"]
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        mut tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        if tree.remove_keyword("spdy").is_some() {
            tree.add_keyword("http2", ["ENABLED"]);
        }
        let tree = ctx.convert_advanced_slots(tree, &[ArgRef::keyword("clientIpHdrExpr")]);
        Ok(Handled::tree(tree))
    }
}
