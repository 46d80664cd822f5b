use ns_config_core::{ArgRef, CommandTree};

use super::{policy_name, BindCategory, BindRequest, FeatureModule, Handled, ModuleId};
use crate::binds::{BindDefaults, BindSlots, Position};
use crate::context::ConversionContext;
use crate::error::ConvertError;
use crate::output::Output;
use crate::policy::PolicyKind;

const BUILTIN_CLASSIC: &str = "SETTMSESSPARAMS_POL";
const BUILTIN_ADVANCED: &str = "SETTMSESSPARAMS_ADV_POL";

const RULE: ArgRef = ArgRef::Positional(1);

/// TM session policies and their global, AAA and authentication vserver
/// binds.
pub struct TmSession;

impl FeatureModule for TmSession {
    fn id(&self) -> ModuleId {
        ModuleId::TmSession
    }

    fn commands(&self) -> &'static [&'static str] {
        &["add tm sessionpolicy", "bind tm global"]
    }

    fn bind_categories(&self) -> &'static [BindCategory] {
        &[
            BindCategory::User,
            BindCategory::Group,
            BindCategory::Authentication,
        ]
    }

    fn bind_defaults(&self) -> BindDefaults {
        BindDefaults {
            goto: Some("NEXT"),
            flow: None,
        }
    }

    fn init(&mut self, ctx: &mut ConversionContext) {
        ctx.policies.skip_global_override(ModuleId::TmSession);
        ctx.policies
            .store(BUILTIN_CLASSIC, ModuleId::TmSession, Some(PolicyKind::Classic));
        ctx.policies
            .store(BUILTIN_ADVANCED, ModuleId::TmSession, Some(PolicyKind::Advanced));
    }

    fn collect(
        &mut self,
        ctx: &mut ConversionContext,
        tree: &CommandTree,
    ) -> Result<(), ConvertError> {
        if tree.key() == "add tm sessionpolicy" {
            ctx.mark_rule_references(tree, &RULE);
        }
        Ok(())
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        mut tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        if tree.key() == "bind tm global" {
            return self.convert_global(ctx, tree);
        }

        let Some(name) = tree.positional_value(0).map(str::to_string) else {
            return Ok(Handled::tree(tree));
        };
        ctx.policies.store(&name, ModuleId::TmSession, None);
        ctx.convert_expression(&mut tree, &RULE, false);
        let kind = if tree.upgraded {
            PolicyKind::Classic
        } else {
            PolicyKind::Advanced
        };
        ctx.policies.classify(&name, kind);
        Ok(Handled::tree(tree))
    }

    fn convert_bind(
        &mut self,
        ctx: &mut ConversionContext,
        request: BindRequest,
    ) -> Result<Vec<Output>, ConvertError> {
        let mut tree = request.tree;
        // every AAA and authentication bind names the policy with -policy
        rename_builtin(&mut tree, "policy", &request.policy);
        ctx.convert_entity_bind(
            tree,
            &request.policy,
            ModuleId::TmSession,
            self.bind_defaults(),
            BindSlots::keywords(),
        )?;
        Ok(Vec::new())
    }
}

impl TmSession {
    fn convert_global(
        &self,
        ctx: &mut ConversionContext,
        mut tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        let Some(policy) = policy_name(&tree, "policyName") else {
            return Ok(Handled::tree(tree));
        };
        // traffic policies bound here are advanced already
        if ctx.policies.lookup(&policy).map(|p| p.module) != Some(ModuleId::TmSession) {
            return Ok(Handled::tree(tree));
        }
        rename_builtin(&mut tree, "policyName", &policy);
        ctx.convert_global_bind(
            tree,
            &policy,
            ModuleId::TmSession,
            self.bind_defaults(),
            BindSlots::keywords(),
            Position::Inplace,
        )?;
        Ok(Handled::suppressed())
    }
}

fn rename_builtin(tree: &mut CommandTree, keyword: &str, policy: &str) {
    if policy.eq_ignore_ascii_case(BUILTIN_CLASSIC) {
        tree.set_arg(&ArgRef::keyword(keyword), BUILTIN_ADVANCED);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::pipeline::convert_str;

    #[test]
    fn builtin_global_bind_is_renamed_with_next_goto() {
        let outcome = convert_str("bind tm global -policyName SETTMSESSPARAMS_POL -priority 65534\n")
            .expect("convert");
        assert_eq!(
            outcome.lines,
            vec!["bind tm global -policyName SETTMSESSPARAMS_ADV_POL -priority 65534 -gotoPriorityExpression NEXT"]
        );
    }

    #[test]
    fn user_binds_are_deferred_without_flow_type() {
        let input = "add tm sessionPolicy tmp1 \"REQ.HTTP.URL == /a\" act1\n\
                     bind aaa user alice -policy tmp1 -priority 10\n";
        let outcome = convert_str(input).expect("convert");
        assert_eq!(
            outcome.lines,
            vec![
                "add tm sessionPolicy tmp1 \"HTTP.REQ.URL.EQ(\\\"/a\\\")\" act1",
                "bind aaa user alice -policy tmp1 -priority 10 -gotoPriorityExpression NEXT",
            ]
        );
    }

    #[test]
    fn traffic_policies_on_tm_global_pass_through() {
        let input = "add tm trafficPolicy tp1 true act1\n\
                     bind tm global -policyName tp1 -priority 10\n";
        let outcome = convert_str(input).expect("convert");
        assert_eq!(outcome.lines[1], "bind tm global -policyName tp1 -priority 10");
    }
}
