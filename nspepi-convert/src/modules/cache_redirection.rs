use ns_config_core::{ArgRef, CommandTree};

use super::{policy_name, BindCategory, BindRequest, FeatureModule, Handled, ModuleId};
use crate::binds::BindSlots;
use crate::context::{ConversionContext, VserverKind};
use crate::error::ConvertError;
use crate::policy::PolicyKind;

/// Classic built-in CR policies and their advanced replacements.
const BUILTIN_POLICIES: &[(&str, &str)] = &[
    ("bypass-non-get", "bypass-non-get-adv"),
    ("bypass-cache-control", "bypass-cache-control-adv"),
    ("bypass-dynamic-url", "bypass-dynamic-url-adv"),
    ("bypass-urltokens", "bypass-urltokens-adv"),
    ("bypass-cookie", "bypass-cookie-adv"),
];

fn builtin_replacement(lower: &str) -> Option<&'static str> {
    BUILTIN_POLICIES
        .iter()
        .find(|(classic, _)| *classic == lower)
        .map(|(_, advanced)| *advanced)
}

fn is_builtin_advanced(lower: &str) -> bool {
    BUILTIN_POLICIES.iter().any(|(_, advanced)| *advanced == lower)
}

const RULE: &str = "rule";

/// Cache redirection: vservers, policies and the `bind cr vserver` router.
pub struct CacheRedirection;

impl FeatureModule for CacheRedirection {
    fn id(&self) -> ModuleId {
        ModuleId::CacheRedirection
    }

    fn commands(&self) -> &'static [&'static str] {
        &["add cr vserver", "add cr policy", "bind cr vserver"]
    }

    fn init(&mut self, ctx: &mut ConversionContext) {
        for (classic, advanced) in BUILTIN_POLICIES {
            ctx.policies
                .store(classic, ModuleId::CacheRedirection, Some(PolicyKind::Classic));
            ctx.policies
                .store(advanced, ModuleId::CacheRedirection, Some(PolicyKind::Advanced));
        }
    }

    fn collect(
        &mut self,
        ctx: &mut ConversionContext,
        tree: &CommandTree,
    ) -> Result<(), ConvertError> {
        if tree.key() == "add cr policy" && !tree.keyword_exists("action") {
            ctx.mark_rule_references(tree, &ArgRef::keyword(RULE));
        }
        Ok(())
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        match tree.key().as_str() {
            "add cr vserver" => Ok(Handled::tree(convert_vserver(ctx, tree))),
            "add cr policy" => Ok(convert_policy(ctx, tree)),
            _ => self.route_bind(ctx, tree),
        }
    }
}

impl CacheRedirection {
    fn route_bind(
        &self,
        ctx: &mut ConversionContext,
        mut tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        let Some(policy) = policy_name(&tree, "policyName") else {
            return Ok(Handled::tree(tree));
        };
        let owner = ctx.policies.get_policy(&policy)?.module;
        if owner != ModuleId::CacheRedirection {
            return Ok(Handled::Delegate(BindRequest {
                category: BindCategory::CacheRedirection,
                owner,
                policy,
                tree,
            }));
        }

        if let Some(advanced) = builtin_replacement(&policy) {
            tree.set_arg(&ArgRef::keyword("policyName"), advanced);
        }
        ctx.convert_entity_bind(
            tree,
            &policy,
            ModuleId::CacheRedirection,
            self.bind_defaults(),
            BindSlots::keywords(),
        )?;
        Ok(Handled::suppressed())
    }
}

fn convert_vserver(ctx: &mut ConversionContext, mut tree: CommandTree) -> CommandTree {
    let protocol = tree
        .keyword_values("td")
        .get(1)
        .map(|v| v.text.clone())
        .or_else(|| tree.positional_value(1).map(str::to_string));
    let Some(name) = tree.positional_value(0).map(str::to_string) else {
        return tree;
    };
    if let Some(protocol) = protocol {
        ctx.vservers.record(VserverKind::Cr, &name, &protocol);
    }
    // precedence has no effect on advanced policies
    if tree.remove_keyword("precedence").is_some() {
        ctx.vservers.set_url_precedence(VserverKind::Cr, &name);
    }
    tree
}

fn convert_policy(ctx: &mut ConversionContext, mut tree: CommandTree) -> Handled {
    let Some(name) = tree.positional_value(0).map(str::to_lowercase) else {
        return Handled::tree(tree);
    };
    if builtin_replacement(&name).is_some() || is_builtin_advanced(&name) {
        return Handled::suppressed();
    }

    ctx.policies.store(&name, ModuleId::CacheRedirection, None);
    if tree.keyword_exists("action") {
        ctx.policies.classify(&name, PolicyKind::Advanced);
        return Handled::tree(ctx.convert_advanced_slots(tree, &[ArgRef::keyword(RULE)]));
    }

    ctx.convert_expression(&mut tree, &ArgRef::keyword(RULE), false);
    if tree.upgraded {
        ctx.policies.classify(&name, PolicyKind::Classic);
        tree.add_keyword("action", ["ORIGIN"]);
    } else {
        ctx.policies.classify(&name, PolicyKind::Advanced);
    }
    Handled::tree(tree)
}
