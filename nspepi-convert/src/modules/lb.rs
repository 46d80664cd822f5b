use ns_config_core::CommandTree;

use super::{policy_name, BindCategory, BindRequest, FeatureModule, Handled, ModuleId};
use crate::context::{ConversionContext, VserverKind};
use crate::error::ConvertError;

/// Load balancing and GSLB vservers: protocol tracking and the
/// `bind lb vserver` router.
pub struct LoadBalancing;

impl FeatureModule for LoadBalancing {
    fn id(&self) -> ModuleId {
        ModuleId::LoadBalancing
    }

    fn commands(&self) -> &'static [&'static str] {
        &["add lb vserver", "bind lb vserver", "add gslb vserver"]
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        match tree.key().as_str() {
            "add lb vserver" => record_protocol(ctx, VserverKind::Lb, &tree),
            "add gslb vserver" => record_protocol(ctx, VserverKind::Gslb, &tree),
            _ => return Ok(route_bind(ctx, tree)),
        }
        Ok(Handled::tree(tree))
    }
}

fn record_protocol(ctx: &mut ConversionContext, kind: VserverKind, tree: &CommandTree) {
    if let (Some(name), Some(protocol)) = (tree.positional_value(0), tree.positional_value(1)) {
        ctx.vservers.record(kind, name, protocol);
    }
}

fn route_bind(ctx: &ConversionContext, tree: CommandTree) -> Handled {
    let Some(policy) = policy_name(&tree, "policyName") else {
        return Handled::tree(tree);
    };
    match ctx.policies.lookup(&policy) {
        Some(found) => Handled::Delegate(BindRequest {
            category: BindCategory::Lb,
            owner: found.module,
            policy,
            tree,
        }),
        None => Handled::tree(tree),
    }
}
