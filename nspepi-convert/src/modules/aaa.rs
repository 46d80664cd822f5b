use ns_config_core::CommandTree;

use super::{policy_name, BindCategory, BindRequest, FeatureModule, Handled, ModuleId};
use crate::context::{ConversionContext, VserverKind};
use crate::error::ConvertError;

/// Routers for AAA user/group and authentication vserver binds.
pub struct Aaa;

impl FeatureModule for Aaa {
    fn id(&self) -> ModuleId {
        ModuleId::Aaa
    }

    fn commands(&self) -> &'static [&'static str] {
        &[
            "bind aaa user",
            "bind aaa group",
            "bind authentication vserver",
            "add authentication vserver",
        ]
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        let category = match tree.key().as_str() {
            "add authentication vserver" => {
                if let (Some(name), Some(protocol)) =
                    (tree.positional_value(0), tree.positional_value(1))
                {
                    ctx.vservers
                        .record(VserverKind::Authentication, name, protocol);
                }
                return Ok(Handled::tree(tree));
            }
            "bind aaa user" => BindCategory::User,
            "bind aaa group" => BindCategory::Group,
            _ => BindCategory::Authentication,
        };

        let Some(policy) = policy_name(&tree, "policy") else {
            return Ok(Handled::tree(tree));
        };
        let Some(owner) = ctx.policies.lookup(&policy).map(|p| p.module) else {
            return Ok(Handled::tree(tree));
        };
        Ok(Handled::Delegate(BindRequest {
            category,
            owner,
            policy,
            tree,
        }))
    }
}
