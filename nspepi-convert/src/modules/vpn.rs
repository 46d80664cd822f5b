use ns_config_core::CommandTree;

use super::{FeatureModule, Handled, ModuleId};
use crate::context::{ConversionContext, VserverKind};
use crate::error::ConvertError;

/// Records the protocol of VPN vservers for SSL bind analysis.
pub struct Vpn;

impl FeatureModule for Vpn {
    fn id(&self) -> ModuleId {
        ModuleId::Vpn
    }

    fn commands(&self) -> &'static [&'static str] {
        &["add vpn vserver"]
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        if let (Some(name), Some(protocol)) = (tree.positional_value(0), tree.positional_value(1)) {
            ctx.vservers.record(VserverKind::Vpn, name, protocol);
        }
        Ok(Handled::tree(tree))
    }
}
